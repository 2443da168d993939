use std::fmt;

use stream_core::TargetId;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct TransportError {
    pub kind: FailureKind,
    pub message: String,
}

impl TransportError {
    pub(crate) fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    InvalidUrl,
    HttpStatus(u16),
    Timeout,
    /// A single record grew past the decoder's bound without a newline.
    RecordTooLarge { limit: usize },
    /// The fallback response body was not JSON.
    InvalidBody,
    Network,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::InvalidUrl => write!(f, "invalid url"),
            FailureKind::HttpStatus(code) => write!(f, "http status {code}"),
            FailureKind::Timeout => write!(f, "timeout"),
            FailureKind::RecordTooLarge { limit } => {
                write!(f, "record exceeds {limit} bytes")
            }
            FailureKind::InvalidBody => write!(f, "invalid response body"),
            FailureKind::Network => write!(f, "network error"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("a stream is already active for {target}")]
    AlreadyActive { target: TargetId },
}

/// Lifecycle of one stream session as seen by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Active,
    Cancelled,
    Completed,
    Failed,
}

/// One item delivered to the consumer of a session, in arrival order.
///
/// Every variant except a non-terminal `Event` ends the session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent<E> {
    Event(E),
    /// Transport ended without a terminal event; `graceful` when the end
    /// sentinel was received.
    Closed { graceful: bool },
    Failed(TransportError),
    TimedOut,
    Cancelled,
}
