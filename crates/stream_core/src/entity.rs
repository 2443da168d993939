use std::fmt;

use serde::{Deserialize, Serialize};

use crate::Vocabulary;

pub type EntityId = u64;

/// Logical stream target: a conversation id, a filename or an audit job id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TargetId(String);

impl TargetId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TargetId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for TargetId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where a terminal error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorOrigin {
    /// Network failure, non-2xx status or a stream that closed early.
    Transport,
    /// The stream stalled past its configured timeout.
    Timeout,
    /// The backend sent an explicit `error` frame.
    Application,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub origin: ErrorOrigin,
    pub message: String,
}

impl ErrorInfo {
    pub fn new(origin: ErrorOrigin, message: impl Into<String>) -> Self {
        Self {
            origin,
            message: message.into(),
        }
    }
}

/// How a sealed entity ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    Done,
    Error(ErrorInfo),
    /// Refused by policy; not a failure.
    Blocked { reason: String },
    /// Stopped by the user; not a failure.
    Cancelled,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Done => write!(f, "done"),
            Outcome::Error(info) => write!(f, "error ({:?}): {}", info.origin, info.message),
            Outcome::Blocked { reason } => write!(f, "blocked: {reason}"),
            Outcome::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lifecycle {
    Created,
    Streaming,
    Sealed(Outcome),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApplyError {
    #[error("entity {0} is sealed")]
    Sealed(EntityId),
    #[error("entity {0} has not started streaming")]
    NotStarted(EntityId),
    #[error("entity {0} not found")]
    Unknown(EntityId),
}

/// A consumer-visible record built from one session's events.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity<V: Vocabulary> {
    id: EntityId,
    target: TargetId,
    record: V::Record,
    lifecycle: Lifecycle,
}

impl<V: Vocabulary> Entity<V> {
    pub fn new(id: EntityId, target: TargetId) -> Self {
        Self {
            id,
            target,
            record: V::Record::default(),
            lifecycle: Lifecycle::Created,
        }
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn target(&self) -> &TargetId {
        &self.target
    }

    pub fn record(&self) -> &V::Record {
        &self.record
    }

    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    pub fn outcome(&self) -> Option<&Outcome> {
        match &self.lifecycle {
            Lifecycle::Sealed(outcome) => Some(outcome),
            _ => None,
        }
    }

    pub fn is_streaming(&self) -> bool {
        self.lifecycle == Lifecycle::Streaming
    }

    pub fn is_sealed(&self) -> bool {
        matches!(self.lifecycle, Lifecycle::Sealed(_))
    }

    /// `Created -> Streaming`. Returns false when the entity already left `Created`.
    pub fn begin(&mut self) -> bool {
        if self.lifecycle == Lifecycle::Created {
            self.lifecycle = Lifecycle::Streaming;
            true
        } else {
            false
        }
    }

    /// Merges one event; a terminal event seals the entity afterwards.
    pub fn apply(&mut self, event: &V::Event) -> Result<(), ApplyError> {
        match self.lifecycle {
            Lifecycle::Created => return Err(ApplyError::NotStarted(self.id)),
            Lifecycle::Sealed(_) => return Err(ApplyError::Sealed(self.id)),
            Lifecycle::Streaming => {}
        }
        V::apply(&mut self.record, event);
        if let Some(outcome) = V::terminal(event) {
            self.lifecycle = Lifecycle::Sealed(outcome);
        }
        Ok(())
    }

    /// Seals with the given outcome, keeping any partial record.
    pub fn seal(&mut self, outcome: Outcome) -> Result<(), ApplyError> {
        if self.is_sealed() {
            return Err(ApplyError::Sealed(self.id));
        }
        self.lifecycle = Lifecycle::Sealed(outcome);
        Ok(())
    }

    /// Seals as cancelled. Returns false (and changes nothing) when already sealed.
    pub fn cancel(&mut self) -> bool {
        self.seal(Outcome::Cancelled).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Chat, ChatEvent};

    fn content(text: &str) -> ChatEvent {
        ChatEvent::Content {
            text: text.to_string(),
        }
    }

    #[test]
    fn apply_requires_streaming() {
        let mut entity = Entity::<Chat>::new(1, "c1".into());
        assert_eq!(entity.apply(&content("x")), Err(ApplyError::NotStarted(1)));
        assert!(entity.begin());
        assert!(!entity.begin());
        assert!(entity.apply(&content("x")).is_ok());
    }

    #[test]
    fn sealed_entity_refuses_mutation_and_keeps_content() {
        let mut entity = Entity::<Chat>::new(1, "c1".into());
        entity.begin();
        entity.apply(&content("partial")).unwrap();
        entity
            .seal(Outcome::Error(ErrorInfo::new(ErrorOrigin::Transport, "reset")))
            .unwrap();

        assert_eq!(entity.apply(&content("more")), Err(ApplyError::Sealed(1)));
        assert!(!entity.cancel());
        assert_eq!(entity.record().content, "partial");
        assert!(!entity.is_streaming());
    }

    #[test]
    fn cancel_from_created_seals_empty() {
        let mut entity = Entity::<Chat>::new(3, "c1".into());
        assert!(entity.cancel());
        assert_eq!(entity.outcome(), Some(&Outcome::Cancelled));
        assert!(entity.record().content.is_empty());
    }
}
