use crate::{Entity, EntityId, ErrorOrigin, Lifecycle, Outcome, TargetId, Vocabulary};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityState {
    Created,
    Streaming,
    Done,
    Error,
    Blocked,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityView {
    pub id: EntityId,
    pub target: TargetId,
    pub state: EntityState,
    pub summary: String,
    pub outcome: Option<Outcome>,
    /// Stop is offered only while streaming.
    pub can_stop: bool,
    /// Retry is offered only for sealed errors.
    pub can_retry: bool,
}

impl EntityView {
    pub(crate) fn from_entity<V: Vocabulary>(entity: &Entity<V>) -> Self {
        let state = match entity.lifecycle() {
            Lifecycle::Created => EntityState::Created,
            Lifecycle::Streaming => EntityState::Streaming,
            Lifecycle::Sealed(Outcome::Done) => EntityState::Done,
            Lifecycle::Sealed(Outcome::Error(_)) => EntityState::Error,
            Lifecycle::Sealed(Outcome::Blocked { .. }) => EntityState::Blocked,
            Lifecycle::Sealed(Outcome::Cancelled) => EntityState::Cancelled,
        };
        Self {
            id: entity.id(),
            target: entity.target().clone(),
            state,
            summary: V::summarize(entity.record()),
            outcome: entity.outcome().cloned(),
            can_stop: state == EntityState::Streaming,
            can_retry: state == EntityState::Error,
        }
    }

    /// Status line shown next to the content; cancellation is not reported as a failure.
    pub fn status_text(&self) -> String {
        match &self.outcome {
            None => "streaming".to_string(),
            Some(Outcome::Done) => "done".to_string(),
            Some(Outcome::Cancelled) => "stopped".to_string(),
            Some(Outcome::Blocked { reason }) => format!("blocked: {reason}"),
            Some(Outcome::Error(info)) => match info.origin {
                ErrorOrigin::Timeout => format!("timed out: {}", info.message),
                ErrorOrigin::Transport => format!("connection error: {}", info.message),
                ErrorOrigin::Application => format!("error: {}", info.message),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StreamViewModel {
    pub entities: Vec<EntityView>,
    pub streaming: usize,
    pub last_rejection: Option<TargetId>,
    pub dirty: bool,
}
