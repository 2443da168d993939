//! Stream core: vocabularies, the accumulation state machine and view-model helpers.
//!
//! Everything here is pure. Transport, decoding and session control live in
//! `stream_engine`.
mod audit;
mod chat;
mod effect;
mod entity;
mod file_processing;
mod frame;
mod history;
mod msg;
mod state;
mod update;
mod view_model;
mod vocab;

pub use audit::{Audit, AuditEvent, AuditJob, AuditPhase, AuditSummary, PhaseCounters};
pub use chat::{Chat, ChatEvent, ChatMessage, ChatMetadata};
pub use effect::{Effect, StartMode};
pub use entity::{
    ApplyError, Entity, EntityId, ErrorInfo, ErrorOrigin, Lifecycle, Outcome, TargetId,
};
pub use file_processing::{
    FileEvent, FileProcessing, ProcessingRecord, ProcessingSummary, SchemaChange,
};
pub use frame::{StreamFrame, FALLBACK_KIND};
pub use history::{History, DEFAULT_HISTORY_CAPACITY};
pub use msg::Msg;
pub use state::StreamState;
pub use update::update;
pub use view_model::{EntityState, EntityView, StreamViewModel};
pub use vocab::Vocabulary;
