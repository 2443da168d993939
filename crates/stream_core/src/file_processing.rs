//! File-processing vocabulary: `progress`, `schema_change`, `complete`, `error`, `blocked`.
//!
//! Records that arrive as plain text are kept as notes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use engine_logging::engine_warn;

use crate::{ErrorInfo, ErrorOrigin, Outcome, StreamFrame, Vocabulary};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FileProcessing;

/// Advisory schema diff between the uploaded file and the previous version.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SchemaChange {
    #[serde(default)]
    pub added_columns: Vec<String>,
    #[serde(default)]
    pub removed_columns: Vec<String>,
    #[serde(default)]
    pub type_changes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProcessingSummary {
    #[serde(default)]
    pub rows: u64,
    #[serde(default)]
    pub columns: u64,
    #[serde(default)]
    pub version: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FileEvent {
    Progress { percentage: f32, step: String },
    SchemaChange(SchemaChange),
    Complete(ProcessingSummary),
    Error { message: String },
    Blocked { reason: String },
    /// Text that was not a readable event.
    Note { text: String },
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProcessingRecord {
    pub percentage: f32,
    pub step: String,
    pub schema_changes: Vec<SchemaChange>,
    pub summary: Option<ProcessingSummary>,
    pub notes: Vec<String>,
}

#[derive(Deserialize)]
struct ProgressBody {
    #[serde(default, alias = "progress")]
    percentage: f32,
    #[serde(default, alias = "message")]
    step: String,
}

#[derive(Deserialize)]
struct ReasonBody {
    #[serde(default, alias = "message", alias = "error", alias = "detail")]
    reason: Option<String>,
}

impl FileProcessing {
    fn reason(frame: &StreamFrame, default: &str) -> Option<String> {
        frame
            .parse::<ReasonBody>()
            .map(|body| body.reason.unwrap_or_else(|| default.to_string()))
    }
}

impl Vocabulary for FileProcessing {
    type Event = FileEvent;
    type Record = ProcessingRecord;

    const NAME: &'static str = "file_processing";

    fn classify(frame: &StreamFrame) -> Option<FileEvent> {
        match frame.kind.as_str() {
            "progress" => frame.parse::<ProgressBody>().map(|body| FileEvent::Progress {
                percentage: body.percentage.clamp(0.0, 100.0),
                step: body.step,
            }),
            "schema_change" => frame.parse().map(FileEvent::SchemaChange),
            "complete" => frame.parse().map(FileEvent::Complete),
            "error" => Self::reason(frame, "processing failed")
                .map(|message| FileEvent::Error { message }),
            "blocked" => Self::reason(frame, "rejected by policy")
                .map(|reason| FileEvent::Blocked { reason }),
            _ => frame.fallback_content().map(|text| FileEvent::Note { text }),
        }
    }

    fn terminal(event: &FileEvent) -> Option<Outcome> {
        match event {
            FileEvent::Complete(_) => Some(Outcome::Done),
            FileEvent::Error { message } => Some(Outcome::Error(ErrorInfo::new(
                ErrorOrigin::Application,
                message.clone(),
            ))),
            FileEvent::Blocked { reason } => Some(Outcome::Blocked {
                reason: reason.clone(),
            }),
            FileEvent::Progress { .. } | FileEvent::SchemaChange(_) | FileEvent::Note { .. } => None,
        }
    }

    fn apply(record: &mut ProcessingRecord, event: &FileEvent) {
        match event {
            FileEvent::Progress { percentage, step } => {
                record.percentage = *percentage;
                record.step.clone_from(step);
            }
            FileEvent::SchemaChange(change) => record.schema_changes.push(change.clone()),
            FileEvent::Complete(summary) => {
                record.percentage = 100.0;
                record.summary = Some(summary.clone());
            }
            FileEvent::Note { text } => record.notes.push(text.clone()),
            FileEvent::Error { .. } | FileEvent::Blocked { .. } => {}
        }
    }

    fn from_complete_response(body: &Value) -> Vec<FileEvent> {
        let frame = StreamFrame::new("complete", body.clone());
        if let Some(reason) = body.get("blocked").and_then(Value::as_str) {
            return vec![FileEvent::Blocked {
                reason: reason.to_string(),
            }];
        }
        if let Some(message) = body
            .get("error")
            .or_else(|| body.get("detail"))
            .and_then(Value::as_str)
        {
            return vec![FileEvent::Error {
                message: message.to_string(),
            }];
        }
        let mut events = Vec::with_capacity(2);
        if let Some(change) = body.get("schema_change") {
            match serde_json::from_value::<SchemaChange>(change.clone()) {
                Ok(change) => events.push(FileEvent::SchemaChange(change)),
                Err(_) => engine_warn!("Ignoring unreadable schema_change"),
            }
        }
        match frame.parse::<ProcessingSummary>() {
            Some(summary) => events.push(FileEvent::Complete(summary)),
            None => events.push(FileEvent::Error {
                message: "unreadable processing summary".to_string(),
            }),
        }
        events
    }

    fn summarize(record: &ProcessingRecord) -> String {
        match &record.summary {
            Some(summary) => format!("{} rows, {} columns", summary.rows, summary.columns),
            None if record.step.is_empty() => record.notes.last().cloned().unwrap_or_default(),
            None => format!("{:.0}% {}", record.percentage, record.step),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn progress_accepts_alias_and_clamps() {
        let frame = StreamFrame::new(
            "progress",
            json!({"type": "progress", "progress": 140, "message": "parsing"}),
        );
        assert_eq!(
            FileProcessing::classify(&frame),
            Some(FileEvent::Progress {
                percentage: 100.0,
                step: "parsing".to_string()
            })
        );
    }

    #[test]
    fn blocked_is_distinct_from_error() {
        let blocked = FileProcessing::classify(&StreamFrame::new(
            "blocked",
            json!({"type": "blocked", "reason": "contains PHI"}),
        ))
        .unwrap();
        assert_eq!(
            FileProcessing::terminal(&blocked),
            Some(Outcome::Blocked {
                reason: "contains PHI".to_string()
            })
        );
    }

    #[test]
    fn progress_is_replaced_schema_changes_accumulate() {
        let mut record = ProcessingRecord::default();
        FileProcessing::apply(
            &mut record,
            &FileEvent::Progress {
                percentage: 20.0,
                step: "reading".to_string(),
            },
        );
        FileProcessing::apply(
            &mut record,
            &FileEvent::Progress {
                percentage: 60.0,
                step: "validating".to_string(),
            },
        );
        FileProcessing::apply(
            &mut record,
            &FileEvent::SchemaChange(SchemaChange {
                added_columns: vec!["AGE".to_string()],
                ..SchemaChange::default()
            }),
        );
        assert_eq!(record.percentage, 60.0);
        assert_eq!(record.step, "validating");
        assert_eq!(record.schema_changes.len(), 1);
    }

    #[test]
    fn plain_text_records_become_notes() {
        let note = FileProcessing::classify(&StreamFrame::fallback_text("<html>busy</html>"));
        assert_eq!(
            note,
            Some(FileEvent::Note {
                text: "<html>busy</html>".to_string()
            })
        );

        let mut record = ProcessingRecord::default();
        FileProcessing::apply(&mut record, &note.unwrap());
        assert_eq!(record.notes, vec!["<html>busy</html>"]);
        assert_eq!(FileProcessing::summarize(&record), "<html>busy</html>");
        assert_eq!(
            FileProcessing::terminal(&FileEvent::Note {
                text: String::new()
            }),
            None
        );
    }

    #[test]
    fn unknown_kinds_are_not_notes() {
        let frame = StreamFrame::new("heartbeat", json!({"type": "heartbeat"}));
        assert_eq!(FileProcessing::classify(&frame), None);
    }

    #[test]
    fn complete_response_yields_summary() {
        let events = FileProcessing::from_complete_response(&json!({
            "rows": 10, "columns": 2, "version": 4,
            "schema_change": { "removed_columns": ["SEX"] }
        }));
        assert_eq!(events.len(), 2);
        assert_eq!(
            events[1],
            FileEvent::Complete(ProcessingSummary {
                rows: 10,
                columns: 2,
                version: Some(4)
            })
        );
    }
}
