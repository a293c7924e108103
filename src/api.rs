//! Request and response shapes of the messenger operations.
//!
//! Keys, identities and invitations are standard base64 text here; message
//! payloads are UTF-8 text.
use serde::{Deserialize, Serialize};

use crate::{codec, contact::ContactRequest, group::Message};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvitationLinkResponse {
    pub link: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactPubkeyResponse {
    pub identity_b64: String,
    pub rendezvous_seed_b64: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactRequestsQuery {
    #[serde(default)]
    pub live_stream: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactRequestView {
    pub identity_b64: String,
    pub display_name: String,
}

impl From<&ContactRequest> for ContactRequestView {
    fn from(request: &ContactRequest) -> Self {
        Self {
            identity_b64: codec::encode(&request.identity),
            display_name: request.display_name.clone(),
        }
    }
}

pub fn contact_request_views(requests: &[ContactRequest]) -> Vec<ContactRequestView> {
    requests.iter().map(ContactRequestView::from).collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendContactRequest {
    pub identity_b64: String,
    pub rendezvous_seed_b64: String,
    /// Name announced to the peer. Defaults to the account's display name.
    #[serde(default)]
    pub display_name: Option<String>,
}

/// Body of accept and discard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactIdentity {
    pub identity_b64: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuccessResponse {
    pub success: bool,
}

impl SuccessResponse {
    pub fn ok() -> Self {
        Self { success: true }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendMessageRequest {
    pub target: String,
    #[serde(default)]
    pub target_is_peer_identity: bool,
    pub payload: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListMessagesRequest {
    pub target: String,
    #[serde(default)]
    pub target_is_peer_identity: bool,
    #[serde(default)]
    pub until_now: bool,
    #[serde(default)]
    pub reverse: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageView {
    pub sender_device_hint: String,
    pub payload: String,
}

impl From<&Message> for MessageView {
    fn from(message: &Message) -> Self {
        Self {
            sender_device_hint: codec::encode(&message.sender_device),
            payload: String::from_utf8_lossy(&message.payload).into_owned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateGroupResponse {
    pub group_key_b64: String,
    pub invitation_b64: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinGroupRequest {
    pub invitation_b64: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinGroupResponse {
    pub success: bool,
    pub group_key_b64: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}
