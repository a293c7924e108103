use futures::{stream::BoxStream, StreamExt};
use log::debug;
use protocol_node::{AppMessage, ListRange, ProtocolNode};

use crate::{error::RelayError, group::resolver::GroupSession};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListOptions {
    pub until_now: bool,
    pub reverse: bool,
}

impl From<ListOptions> for ListRange {
    fn from(options: ListOptions) -> Self {
        ListRange {
            until_now: options.until_now,
            reverse: options.reverse,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub group_key: Vec<u8>,
    pub payload: Vec<u8>,
    pub sender_device: Vec<u8>,
}

impl From<AppMessage> for Message {
    fn from(message: AppMessage) -> Self {
        Message {
            group_key: message.group_pk,
            payload: message.payload,
            sender_device: message.device_pk,
        }
    }
}

pub type MessageStream = BoxStream<'static, Result<Message, RelayError>>;

/// Push one payload into the session's channel. No retry on failure.
pub async fn send<N: ProtocolNode + ?Sized>(
    node: &N,
    session: &GroupSession,
    payload: Vec<u8>,
) -> Result<(), RelayError> {
    if !session.is_active {
        return Err(RelayError::Inactive);
    }
    let cid = node
        .app_message_send(&session.group_key, payload)
        .await
        .map_err(RelayError::Push)?;
    debug!("Pushed message, cid {} bytes", cid.len());
    Ok(())
}

/// Open the session's message history.
///
/// With `until_now` the stream ends after the backlog. `reverse` only
/// reorders the backlog; live messages always arrive in log order.
pub async fn list<N: ProtocolNode + ?Sized>(
    node: &N,
    session: &GroupSession,
    options: ListOptions,
) -> Result<MessageStream, RelayError> {
    let messages = node
        .group_message_list(&session.group_key, options.into())
        .await
        .map_err(RelayError::Subscribe)?;
    Ok(messages
        .map(|item| item.map(Message::from).map_err(RelayError::Stream))
        .boxed())
}
