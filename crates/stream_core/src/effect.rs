use crate::{EntityId, TargetId};

/// Side effects requested by [`crate::update`]; the caller's effect runner executes them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Open a stream for `target` whose events belong to `entity_id`.
    OpenStream { entity_id: EntityId, target: TargetId },
    /// Abort the transport of the session feeding `entity_id`.
    AbortStream { entity_id: EntityId, target: TargetId },
}

/// What to do when a start is requested for a target that already streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StartMode {
    /// Refuse the new start; the caller must cancel first.
    #[default]
    Reject,
    /// Cancel the running session, then start the new one.
    Replace,
}
