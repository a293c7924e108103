//! Pending contact requests derived from the account's metadata log.
pub mod event;
pub mod projector;
pub mod publisher;

pub use event::ContactEvent;
pub use projector::{reduce, ContactRequest, ContactRequestSet};
pub use publisher::{publish, snapshot};
