use futures::{Stream, StreamExt};
use log::{debug, trace};
use protocol_node::{MetadataEvent, NodeError};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::{
    codec,
    contact::{
        event::ContactEvent,
        projector::{ContactRequest, ContactRequestSet},
    },
    error::ProjectionError,
    stream::{pump, StreamEnd},
};

/// Project `events` and publish the pending set after every change.
///
/// Events that do not touch the set publish nothing. The first undecodable
/// event stops the projection with an error; a failing source does too.
pub async fn publish<S>(
    events: S,
    sink: &mpsc::Sender<Vec<ContactRequest>>,
    cancel: &CancellationToken,
) -> Result<StreamEnd, ProjectionError>
where
    S: Stream<Item = Result<MetadataEvent, NodeError>> + Unpin,
{
    let mut set = ContactRequestSet::new();
    let events = events.map(|item| item.map_err(ProjectionError::from));
    pump(events, sink, cancel, |event| {
        let Some(contact_event) = ContactEvent::from_metadata(&event)? else {
            trace!("skipping metadata event {} ({:?})", event.index, event.event_type);
            return Ok(None);
        };
        let changed = set.apply(&contact_event);
        debug!(
            "Projected event {} for {} ({} pending, changed: {changed})",
            event.index,
            codec::encode(contact_event.identity()),
            set.len()
        );
        Ok(changed.then(|| set.snapshot()))
    })
    .await
}

/// Fold a finite event stream into the pending set it leaves behind.
pub async fn snapshot<S>(mut events: S) -> Result<ContactRequestSet, ProjectionError>
where
    S: Stream<Item = Result<MetadataEvent, NodeError>> + Unpin,
{
    let mut set = ContactRequestSet::new();
    while let Some(event) = events.next().await {
        if let Some(contact_event) = ContactEvent::from_metadata(&event?)? {
            set.apply(&contact_event);
        }
    }
    Ok(set)
}
