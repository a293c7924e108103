use prost::Message;
use protocol_node::{
    types::{
        AccountContactRequestAccepted, AccountContactRequestDiscarded,
        AccountContactRequestReceived,
    },
    EventType, MetadataEvent,
};

use crate::error::DecodeError;

/// Contact-request lifecycle change read from the account's metadata log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContactEvent {
    Received {
        identity: Vec<u8>,
        display_name: String,
    },
    Accepted {
        identity: Vec<u8>,
    },
    Discarded {
        identity: Vec<u8>,
    },
}

impl ContactEvent {
    pub fn identity(&self) -> &[u8] {
        match self {
            ContactEvent::Received { identity, .. }
            | ContactEvent::Accepted { identity }
            | ContactEvent::Discarded { identity } => identity,
        }
    }

    /// Classify a metadata event.
    ///
    /// Returns `Ok(None)` for every event kind that is not an incoming
    /// contact-request change.
    pub fn from_metadata(event: &MetadataEvent) -> Result<Option<Self>, DecodeError> {
        let contact_event = match event.event_type {
            EventType::AccountContactRequestIncomingReceived => {
                let body = decode::<AccountContactRequestReceived>(&event.event)?;
                ContactEvent::Received {
                    identity: require_pk(body.contact_pk)?,
                    display_name: String::from_utf8_lossy(&body.contact_metadata).into_owned(),
                }
            }
            EventType::AccountContactRequestIncomingAccepted => {
                let body = decode::<AccountContactRequestAccepted>(&event.event)?;
                ContactEvent::Accepted {
                    identity: require_pk(body.contact_pk)?,
                }
            }
            EventType::AccountContactRequestIncomingDiscarded => {
                let body = decode::<AccountContactRequestDiscarded>(&event.event)?;
                ContactEvent::Discarded {
                    identity: require_pk(body.contact_pk)?,
                }
            }
            _ => return Ok(None),
        };
        Ok(Some(contact_event))
    }
}

fn decode<M: Message + Default>(bytes: &[u8]) -> Result<M, DecodeError> {
    M::decode(bytes).map_err(|source| DecodeError::Protobuf {
        what: "contact request event",
        source,
    })
}

fn require_pk(pk: Vec<u8>) -> Result<Vec<u8>, DecodeError> {
    if pk.is_empty() {
        return Err(DecodeError::EmptyField("contact_pk"));
    }
    Ok(pk)
}
