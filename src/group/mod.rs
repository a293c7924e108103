pub mod lifecycle;
pub mod relay;
pub mod resolver;

pub use lifecycle::{create_group, join_group, CreatedGroup, GroupState};
pub use relay::{ListOptions, Message, MessageStream};
pub use resolver::{activate, resolve, GroupSession, Target};
