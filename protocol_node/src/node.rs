//! Client interface to the protocol node.
use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    types::{
        AccountInfo, EventStream, GroupInfo, GroupInvitation, InstanceConfig, ListRange,
        MessageStream, ShareableContact, ShareableLink,
    },
    NodeError,
};

/// Operations the protocol node exposes to its local clients.
///
/// The node owns the replicated logs, the group keys and the encryption.
/// Clients only see raw keys and payloads.
#[async_trait]
pub trait ProtocolNode: Send + Sync + 'static {
    /// Identity of the account the node runs for.
    async fn account_get(&self) -> Result<AccountInfo, NodeError>;

    /// Device and account group keys of this instance.
    async fn instance_get_configuration(&self) -> Result<InstanceConfig, NodeError>;

    /// Link and contact data other accounts use to send us a contact request.
    async fn instance_shareable_link(&self) -> Result<ShareableLink, NodeError>;

    /// Subscribe to the metadata log of a group.
    ///
    /// With `range.until_now` the stream ends after the backlog, otherwise it
    /// keeps delivering new events until dropped.
    async fn group_metadata_list(
        &self,
        group_pk: &[u8],
        range: ListRange,
    ) -> Result<EventStream, NodeError>;

    /// Send a contact request to `contact`, announcing ourselves with `own_metadata`.
    async fn contact_request_send(
        &self,
        contact: ShareableContact,
        own_metadata: Vec<u8>,
    ) -> Result<(), NodeError>;

    async fn contact_request_accept(&self, contact_pk: &[u8]) -> Result<(), NodeError>;

    async fn contact_request_discard(&self, contact_pk: &[u8]) -> Result<(), NodeError>;

    /// 1:1 group shared with an accepted contact.
    async fn group_info_by_contact(&self, contact_pk: &[u8]) -> Result<GroupInfo, NodeError>;

    /// Group this account is a member of, looked up by its key.
    async fn group_info_by_key(&self, group_pk: &[u8]) -> Result<GroupInfo, NodeError>;

    /// Start replicating a group on this device. Idempotent.
    async fn activate_group(&self, group_pk: &[u8]) -> Result<(), NodeError>;

    /// Append a payload to a group's message log.
    ///
    /// # Returns
    /// * the content id the node assigned to the message
    async fn app_message_send(&self, group_pk: &[u8], payload: Vec<u8>)
        -> Result<Vec<u8>, NodeError>;

    async fn group_message_list(
        &self,
        group_pk: &[u8],
        range: ListRange,
    ) -> Result<MessageStream, NodeError>;

    /// Create a multi-member group with this account as its only member.
    async fn multi_member_group_create(&self) -> Result<Vec<u8>, NodeError>;

    async fn multi_member_group_invitation_create(
        &self,
        group_pk: &[u8],
    ) -> Result<GroupInvitation, NodeError>;

    /// Join the group described by `invitation` and return its key.
    async fn multi_member_group_join(
        &self,
        invitation: GroupInvitation,
    ) -> Result<Vec<u8>, NodeError>;
}

/// Dials a client for a protocol node.
#[async_trait]
pub trait NodeConnector: Send + Sync + 'static {
    type Node: ProtocolNode;

    async fn connect(&self) -> Result<Arc<Self::Node>, NodeError>;
}
