use protocol_node::NodeError;

/// A request field or node payload could not be decoded.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Invalid base64 in {field}: {source}")]
    Base64 {
        field: &'static str,
        #[source]
        source: base64::DecodeError,
    },
    #[error("Malformed {what}: {source}")]
    Protobuf {
        what: &'static str,
        #[source]
        source: prost::DecodeError,
    },
    #[error("{0} must not be empty")]
    EmptyField(&'static str),
    #[error("Malformed JSON request: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum ResolutionError {
    #[error("No channel for peer: {0}")]
    UnknownPeer(#[source] NodeError),
    #[error("Unknown group: {0}")]
    UnknownGroup(#[source] NodeError),
    #[error("Unable to activate channel: {0}")]
    Activation(#[source] NodeError),
}

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("Channel is not active")]
    Inactive,
    #[error("Unable to push message: {0}")]
    Push(#[source] NodeError),
    #[error("Unable to subscribe to messages: {0}")]
    Subscribe(#[source] NodeError),
    #[error("Message stream failed: {0}")]
    Stream(#[source] NodeError),
}

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("Unable to create group: {0}")]
    Create(#[source] NodeError),
    #[error("Unable to activate created group: {0}")]
    ActivateCreated(#[source] NodeError),
    #[error("Unable to create invitation: {0}")]
    Invite(#[source] NodeError),
    #[error("Unable to join group: {0}")]
    Join(#[source] NodeError),
    #[error("Unable to activate joined group: {0}")]
    ActivateJoined(#[source] NodeError),
}

/// Error returned by every messenger operation.
///
/// Each variant carries the name of the operation that failed.
#[derive(Debug, thiserror::Error)]
pub enum MessengerError {
    #[error("{op}: cannot reach protocol node: {source}")]
    Connection {
        op: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("{op}: {source}")]
    Decode {
        op: &'static str,
        #[source]
        source: DecodeError,
    },
    #[error("{op}: {source}")]
    Resolution {
        op: &'static str,
        #[source]
        source: ResolutionError,
    },
    #[error("{op}: {source}")]
    Relay {
        op: &'static str,
        #[source]
        source: RelayError,
    },
    #[error("{op}: {source}")]
    Lifecycle {
        op: &'static str,
        #[source]
        source: LifecycleError,
    },
    #[error("{op}: node request failed: {source}")]
    Node {
        op: &'static str,
        #[source]
        source: NodeError,
    },
    #[error("{op}: stream task failed: {source}")]
    Task {
        op: &'static str,
        #[source]
        source: tokio::task::JoinError,
    },
}

fn node_error_of_resolution(e: &ResolutionError) -> &NodeError {
    match e {
        ResolutionError::UnknownPeer(n)
        | ResolutionError::UnknownGroup(n)
        | ResolutionError::Activation(n) => n,
    }
}

fn node_error_of_relay(e: &RelayError) -> Option<&NodeError> {
    match e {
        RelayError::Inactive => None,
        RelayError::Push(n) | RelayError::Subscribe(n) | RelayError::Stream(n) => Some(n),
    }
}

fn node_error_of_lifecycle(e: &LifecycleError) -> &NodeError {
    match e {
        LifecycleError::Create(n)
        | LifecycleError::ActivateCreated(n)
        | LifecycleError::Invite(n)
        | LifecycleError::Join(n)
        | LifecycleError::ActivateJoined(n) => n,
    }
}

impl MessengerError {
    /// Unreachable nodes always surface as `Connection`, whatever step hit them.
    pub fn node(op: &'static str, source: NodeError) -> Self {
        if source.is_unreachable() {
            MessengerError::Connection {
                op,
                source: Box::new(source),
            }
        } else {
            MessengerError::Node { op, source }
        }
    }

    pub fn decode(op: &'static str, source: DecodeError) -> Self {
        MessengerError::Decode { op, source }
    }

    pub fn resolution(op: &'static str, source: ResolutionError) -> Self {
        if node_error_of_resolution(&source).is_unreachable() {
            MessengerError::Connection {
                op,
                source: Box::new(source),
            }
        } else {
            MessengerError::Resolution { op, source }
        }
    }

    pub fn relay(op: &'static str, source: RelayError) -> Self {
        if node_error_of_relay(&source).is_some_and(NodeError::is_unreachable) {
            MessengerError::Connection {
                op,
                source: Box::new(source),
            }
        } else {
            MessengerError::Relay { op, source }
        }
    }

    pub fn lifecycle(op: &'static str, source: LifecycleError) -> Self {
        if node_error_of_lifecycle(&source).is_unreachable() {
            MessengerError::Connection {
                op,
                source: Box::new(source),
            }
        } else {
            MessengerError::Lifecycle { op, source }
        }
    }

    pub fn projection(op: &'static str, source: ProjectionError) -> Self {
        match source {
            ProjectionError::Decode(e) => MessengerError::decode(op, e),
            ProjectionError::Source(e) => MessengerError::node(op, e),
        }
    }

    pub fn is_connection(&self) -> bool {
        matches!(self, MessengerError::Connection { .. })
    }
}

/// A contact-request projection stopped before its source ended.
#[derive(Debug, thiserror::Error)]
pub enum ProjectionError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("Event stream failed: {0}")]
    Source(#[from] NodeError),
}
