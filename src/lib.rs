//! Messenger service on top of a protocol node.
//!
//! The node owns identities, replicated logs and groups. This crate projects
//! the account's contact-request log into the set of pending requests,
//! resolves targets to channels, relays messages and drives the multi-member
//! group lifecycle, all behind [`MessengerService`] and its HTTP/WebSocket
//! surface in [`server`].
pub mod api;
pub mod codec;
pub mod config;
pub mod contact;
pub mod error;
pub mod group;
pub mod node_handle;
pub mod server;
pub mod service;
pub mod stream;

pub use contact::{ContactEvent, ContactRequest, ContactRequestSet};
pub use error::{
    DecodeError, LifecycleError, MessengerError, ProjectionError, RelayError, ResolutionError,
};
pub use group::{GroupSession, GroupState, ListOptions, Message, Target};
pub use node_handle::NodeHandle;
pub use service::{MessengerService, ServiceOptions};
pub use stream::{StreamEnd, Subscription};
