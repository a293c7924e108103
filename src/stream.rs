//! Cancellable forwarding from a node stream to a bounded subscriber channel.
use std::future::Future;

use futures::{Stream, StreamExt};
use log::debug;
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::error::MessengerError;

/// Why a forwarding loop stopped without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    /// The node delivered everything it had and closed the stream.
    SourceEnded,
    /// The receiving side of the subscriber channel was dropped.
    SubscriberGone,
    Cancelled,
}

/// Move items from `source` to `sink` until one side stops.
///
/// `step` turns each source item into an optional update; `None` publishes
/// nothing. Sending waits for channel capacity, so a slow subscriber stalls
/// the loop instead of losing updates. `cancel` is checked while waiting on
/// the source and while waiting on the sink.
pub async fn pump<S, T, U, E, F>(
    mut source: S,
    sink: &mpsc::Sender<U>,
    cancel: &CancellationToken,
    mut step: F,
) -> Result<StreamEnd, E>
where
    S: Stream<Item = Result<T, E>> + Unpin,
    F: FnMut(T) -> Result<Option<U>, E>,
{
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(StreamEnd::Cancelled),
            _ = sink.closed() => return Ok(StreamEnd::SubscriberGone),
            next = source.next() => next,
        };
        let Some(item) = next else {
            return Ok(StreamEnd::SourceEnded);
        };
        let Some(update) = step(item?)? else {
            continue;
        };
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(StreamEnd::Cancelled),
            sent = sink.send(update) => {
                if sent.is_err() {
                    return Ok(StreamEnd::SubscriberGone);
                }
            }
        }
    }
}

/// Receiving end of a streaming operation.
///
/// Dropping the subscription cancels the producer task.
pub struct Subscription<T> {
    op: &'static str,
    updates: mpsc::Receiver<T>,
    done: Option<JoinHandle<Result<StreamEnd, MessengerError>>>,
    cancel: CancellationToken,
}

impl<T: Send + 'static> Subscription<T> {
    pub(crate) fn spawn<F, Fut>(
        op: &'static str,
        buffer: usize,
        cancel: CancellationToken,
        producer: F,
    ) -> Self
    where
        F: FnOnce(mpsc::Sender<T>, CancellationToken) -> Fut,
        Fut: Future<Output = Result<StreamEnd, MessengerError>> + Send + 'static,
    {
        let (tx, updates) = mpsc::channel(buffer.max(1));
        let done = tokio::spawn(producer(tx, cancel.clone()));
        Self {
            op,
            updates,
            done: Some(done),
            cancel,
        }
    }

    /// Next update, or `None` once the producer has stopped.
    pub async fn next(&mut self) -> Option<T> {
        self.updates.recv().await
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Wait for the producer and report how it ended.
    ///
    /// Updates not yet received are discarded.
    pub async fn finish(mut self) -> Result<StreamEnd, MessengerError> {
        let Some(done) = self.done.take() else {
            return Ok(StreamEnd::Cancelled);
        };
        self.updates.close();
        match done.await {
            Ok(result) => result,
            Err(source) => Err(MessengerError::Task {
                op: self.op,
                source,
            }),
        }
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        if self.done.is_some() {
            debug!("{}: subscription dropped, cancelling producer", self.op);
        }
        self.cancel.cancel();
    }
}
