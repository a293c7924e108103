//! Types exchanged with the protocol node.
//!
//! Event payloads and group invitations travel as protobuf messages, the rest
//! are plain structs returned by the client calls.
use futures::stream::BoxStream;

use crate::NodeError;

/// Kind tag attached to every metadata event of a group log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    AccountGroupJoined,
    AccountContactRequestOutgoingEnqueued,
    AccountContactRequestIncomingReceived,
    AccountContactRequestIncomingAccepted,
    AccountContactRequestIncomingDiscarded,
    MultiMemberGroupMemberJoined,
}

/// One entry of a group's metadata log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataEvent {
    /// Position in the log, starting at zero.
    pub index: u64,
    pub event_type: EventType,
    /// Protobuf-encoded body, its schema depends on `event_type`.
    pub event: Vec<u8>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct AccountContactRequestReceived {
    #[prost(bytes = "vec", tag = "1")]
    pub contact_pk: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub contact_rendezvous_seed: Vec<u8>,
    #[prost(bytes = "vec", tag = "3")]
    pub contact_metadata: Vec<u8>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct AccountContactRequestAccepted {
    #[prost(bytes = "vec", tag = "1")]
    pub contact_pk: Vec<u8>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct AccountContactRequestDiscarded {
    #[prost(bytes = "vec", tag = "1")]
    pub contact_pk: Vec<u8>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct AccountContactRequestEnqueued {
    #[prost(bytes = "vec", tag = "1")]
    pub contact_pk: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub contact_metadata: Vec<u8>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct MemberJoined {
    #[prost(bytes = "vec", tag = "1")]
    pub member_pk: Vec<u8>,
}

/// Everything a peer needs to join a multi-member group.
#[derive(Clone, PartialEq, prost::Message)]
pub struct GroupInvitation {
    #[prost(bytes = "vec", tag = "1")]
    pub public_key: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub secret: Vec<u8>,
    #[prost(bytes = "vec", tag = "3")]
    pub inviter_pk: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountInfo {
    pub public_key: Vec<u8>,
    pub display_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceConfig {
    pub account_pk: Vec<u8>,
    pub device_pk: Vec<u8>,
    /// Key of the account's home group, which carries the contact-request log.
    pub account_group_pk: Vec<u8>,
}

/// Data a peer needs to send a contact request to an account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShareableContact {
    pub public_key: Vec<u8>,
    pub rendezvous_seed: Vec<u8>,
    pub metadata: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShareableLink {
    pub web_url: String,
    pub contact: ShareableContact,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupType {
    Account,
    Contact,
    MultiMember,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupInfo {
    pub public_key: Vec<u8>,
    pub group_type: GroupType,
}

/// Selects which part of a log a subscription delivers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListRange {
    /// Stop once the backlog has been delivered.
    pub until_now: bool,
    /// Deliver the backlog newest first. Live items always arrive in order.
    pub reverse: bool,
}

impl ListRange {
    pub fn until_now() -> Self {
        Self {
            until_now: true,
            reverse: false,
        }
    }

    pub fn live() -> Self {
        Self::default()
    }
}

/// An application message stored in a group's message log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppMessage {
    pub index: u64,
    pub group_pk: Vec<u8>,
    pub device_pk: Vec<u8>,
    pub payload: Vec<u8>,
}

pub type EventStream = BoxStream<'static, Result<MetadataEvent, NodeError>>;
pub type MessageStream = BoxStream<'static, Result<AppMessage, NodeError>>;
