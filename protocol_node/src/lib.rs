//! Boundary to the protocol node that owns the replicated logs.
//!
//! [`ProtocolNode`] is the client interface the messenger service consumes,
//! [`NodeConnector`] dials such a client, and [`memory`] provides an
//! in-process implementation of both.
mod error;
pub mod memory;
mod node;
pub mod types;

pub use error::NodeError;
pub use memory::{MemoryNetwork, MemoryNode};
pub use node::{NodeConnector, ProtocolNode};
pub use types::{
    AccountInfo, AppMessage, EventStream, EventType, GroupInfo, GroupInvitation, GroupType,
    InstanceConfig, ListRange, MessageStream, MetadataEvent, ShareableContact, ShareableLink,
};
