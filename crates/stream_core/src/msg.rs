use crate::{EntityId, StartMode, TargetId, Vocabulary};

#[derive(Debug, Clone, PartialEq)]
pub enum Msg<V: Vocabulary> {
    /// User asked to start streaming for a target.
    StartRequested { target: TargetId, mode: StartMode },
    /// User pressed stop.
    CancelRequested { target: TargetId },
    /// User asked to retry a failed entity.
    RetryRequested { entity_id: EntityId },
    /// One dispatched event, in arrival order.
    Event { entity_id: EntityId, event: V::Event },
    /// The transport ended without a terminal event; `graceful` when the end
    /// sentinel was seen.
    TransportClosed { entity_id: EntityId, graceful: bool },
    /// Network failure or non-2xx response.
    TransportFailed { entity_id: EntityId, message: String },
    /// No bytes arrived within the configured stall timeout.
    TimedOut { entity_id: EntityId },
    /// The session was cancelled outside of `CancelRequested` (e.g. replaced).
    SessionCancelled { entity_id: EntityId },
    /// A non-streaming response, converted to its full event sequence.
    CompleteResponse {
        target: TargetId,
        events: Vec<V::Event>,
    },
    /// The non-streaming request itself failed.
    CompleteFailed { target: TargetId, message: String },
    /// UI/render tick to coalesce rendering.
    Tick,
    /// Fallback for placeholder wiring.
    NoOp,
}
