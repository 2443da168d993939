use std::fmt::Debug;

use serde_json::Value;

use crate::{Outcome, StreamFrame};

/// A closed set of event kinds for one kind of stream, plus the merge function
/// that folds those events into the consumer-visible record.
///
/// The frame decoder, dispatcher and session controller are generic over this
/// trait; each call site (chat, file processing, audit) supplies one
/// implementation.
pub trait Vocabulary: Debug + Clone + PartialEq + Send + Sync + 'static {
    /// Typed event produced from one frame.
    type Event: Debug + Clone + PartialEq + Send + 'static;
    /// Accumulated record, starts empty at session start.
    type Record: Debug + Clone + PartialEq + Default + Send + 'static;

    /// Short name used in logs.
    const NAME: &'static str;

    /// Maps a frame to an event; unknown kinds return `None` and are dropped.
    fn classify(frame: &StreamFrame) -> Option<Self::Event>;

    /// The sealed outcome an event implies, or `None` for non-terminal events.
    fn terminal(event: &Self::Event) -> Option<Outcome>;

    /// Merges one event into the record.
    ///
    /// Text deltas concatenate, progress fields are replaced and auxiliary
    /// data is attached. Terminal events may carry summary data too.
    fn apply(record: &mut Self::Record, event: &Self::Event);

    /// Converts a non-streaming JSON response into the equivalent event
    /// sequence, ending in a terminal event.
    fn from_complete_response(body: &Value) -> Vec<Self::Event>;

    /// One-line description of the record for views and logs.
    fn summarize(record: &Self::Record) -> String;
}
