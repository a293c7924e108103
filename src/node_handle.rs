//! Reusable client slot for the protocol node.
use std::sync::Arc;

use log::{info, warn};
use protocol_node::{NodeConnector, NodeError};
use tokio::sync::RwLock;

/// Holds at most one node client and dials it on first use.
///
/// Callers borrow an `Arc` for the duration of one operation. When an
/// operation finds the node unreachable it hands its client back to
/// [`NodeHandle::invalidate`] and the next caller dials again.
pub struct NodeHandle<C: NodeConnector> {
    connector: C,
    client: RwLock<Option<Arc<C::Node>>>, // dialed lazily
}

impl<C: NodeConnector> NodeHandle<C> {
    pub fn new(connector: C) -> Self {
        Self {
            connector,
            client: RwLock::new(None),
        }
    }

    pub async fn acquire(&self) -> Result<Arc<C::Node>, NodeError> {
        if let Some(client) = self.client.read().await.as_ref() {
            return Ok(client.clone());
        }

        let mut slot = self.client.write().await;
        // Another caller may have dialed while we waited for the lock.
        if let Some(client) = slot.as_ref() {
            return Ok(client.clone());
        }
        let client = self.connector.connect().await?;
        info!("Connected to protocol node");
        *slot = Some(client.clone());
        Ok(client)
    }

    /// Drop `failed` if it is still the current client.
    pub async fn invalidate(&self, failed: &Arc<C::Node>) {
        let mut slot = self.client.write().await;
        if slot.as_ref().is_some_and(|current| Arc::ptr_eq(current, failed)) {
            warn!("Protocol node unreachable, dropping client");
            *slot = None;
        }
    }

    pub async fn is_connected(&self) -> bool {
        self.client.read().await.is_some()
    }
}
