//! Bulk-audit vocabulary.
//!
//! Progress runs in two phases, a CDISC rule check followed by LLM analysis,
//! and each phase reports its own counters.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{ErrorInfo, ErrorOrigin, Outcome, StreamFrame, Vocabulary};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Audit;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditPhase {
    #[serde(alias = "cdisc")]
    CdiscCheck,
    #[serde(alias = "llm")]
    LlmAnalysis,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PhaseCounters {
    #[serde(default, alias = "current")]
    pub processed: u64,
    #[serde(default)]
    pub total: u64,
    #[serde(default, alias = "issues")]
    pub findings: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AuditSummary {
    #[serde(default)]
    pub datasets: u64,
    #[serde(default)]
    pub total_findings: u64,
    #[serde(default)]
    pub errors: u64,
    #[serde(default)]
    pub warnings: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AuditEvent {
    Progress {
        phase: AuditPhase,
        counters: PhaseCounters,
    },
    Complete(AuditSummary),
    Error {
        message: String,
    },
    Blocked {
        reason: String,
    },
    /// Text that was not a readable event.
    Note {
        text: String,
    },
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct AuditJob {
    pub phase: Option<AuditPhase>,
    pub cdisc: PhaseCounters,
    pub llm: PhaseCounters,
    pub summary: Option<AuditSummary>,
    pub notes: Vec<String>,
}

#[derive(Deserialize)]
struct ProgressBody {
    phase: AuditPhase,
    #[serde(flatten)]
    counters: PhaseCounters,
}

#[derive(Deserialize)]
struct MessageBody {
    #[serde(default, alias = "reason", alias = "error", alias = "detail")]
    message: Option<String>,
}

impl Vocabulary for Audit {
    type Event = AuditEvent;
    type Record = AuditJob;

    const NAME: &'static str = "audit";

    fn classify(frame: &StreamFrame) -> Option<AuditEvent> {
        match frame.kind.as_str() {
            "progress" => frame
                .parse::<ProgressBody>()
                .map(|body| AuditEvent::Progress {
                    phase: body.phase,
                    counters: body.counters,
                }),
            "complete" => frame.parse().map(AuditEvent::Complete),
            "error" => frame.parse::<MessageBody>().map(|body| AuditEvent::Error {
                message: body.message.unwrap_or_else(|| "audit failed".to_string()),
            }),
            "blocked" => frame.parse::<MessageBody>().map(|body| AuditEvent::Blocked {
                reason: body
                    .message
                    .unwrap_or_else(|| "rejected by policy".to_string()),
            }),
            _ => frame.fallback_content().map(|text| AuditEvent::Note { text }),
        }
    }

    fn terminal(event: &AuditEvent) -> Option<Outcome> {
        match event {
            AuditEvent::Complete(_) => Some(Outcome::Done),
            AuditEvent::Error { message } => Some(Outcome::Error(ErrorInfo::new(
                ErrorOrigin::Application,
                message.clone(),
            ))),
            AuditEvent::Blocked { reason } => Some(Outcome::Blocked {
                reason: reason.clone(),
            }),
            AuditEvent::Progress { .. } | AuditEvent::Note { .. } => None,
        }
    }

    fn apply(record: &mut AuditJob, event: &AuditEvent) {
        match event {
            AuditEvent::Progress { phase, counters } => {
                record.phase = Some(*phase);
                match phase {
                    AuditPhase::CdiscCheck => record.cdisc = *counters,
                    AuditPhase::LlmAnalysis => record.llm = *counters,
                }
            }
            AuditEvent::Complete(summary) => record.summary = Some(summary.clone()),
            AuditEvent::Note { text } => record.notes.push(text.clone()),
            AuditEvent::Error { .. } | AuditEvent::Blocked { .. } => {}
        }
    }

    fn from_complete_response(body: &Value) -> Vec<AuditEvent> {
        if let Some(message) = body.get("error").and_then(Value::as_str) {
            return vec![AuditEvent::Error {
                message: message.to_string(),
            }];
        }
        match serde_json::from_value::<AuditSummary>(body.clone()) {
            Ok(summary) => vec![AuditEvent::Complete(summary)],
            Err(err) => vec![AuditEvent::Error {
                message: format!("unreadable audit summary: {err}"),
            }],
        }
    }

    fn summarize(record: &AuditJob) -> String {
        if let Some(summary) = &record.summary {
            return format!(
                "{} datasets, {} findings",
                summary.datasets, summary.total_findings
            );
        }
        match record.phase {
            Some(AuditPhase::CdiscCheck) => {
                format!("CDISC check {}/{}", record.cdisc.processed, record.cdisc.total)
            }
            Some(AuditPhase::LlmAnalysis) => {
                format!("LLM analysis {}/{}", record.llm.processed, record.llm.total)
            }
            None => record
                .notes
                .last()
                .cloned()
                .unwrap_or_else(|| "queued".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn progress(payload: Value) -> AuditEvent {
        Audit::classify(&StreamFrame::new("progress", payload)).unwrap()
    }

    #[test]
    fn phases_keep_separate_counters() {
        let mut job = AuditJob::default();
        Audit::apply(
            &mut job,
            &progress(json!({"type": "progress", "phase": "cdisc_check", "processed": 4, "total": 4, "findings": 2})),
        );
        Audit::apply(
            &mut job,
            &progress(json!({"type": "progress", "phase": "llm_analysis", "current": 1, "total": 4})),
        );

        assert_eq!(job.phase, Some(AuditPhase::LlmAnalysis));
        assert_eq!(
            job.cdisc,
            PhaseCounters {
                processed: 4,
                total: 4,
                findings: 2
            }
        );
        assert_eq!(job.llm.processed, 1);
        assert_eq!(Audit::summarize(&job), "LLM analysis 1/4");
    }

    #[test]
    fn plain_text_is_kept_as_a_note() {
        let mut job = AuditJob::default();
        let note = Audit::classify(&StreamFrame::fallback_text("gateway timeout")).unwrap();
        assert_eq!(Audit::terminal(&note), None);
        Audit::apply(&mut job, &note);
        assert_eq!(job.notes, vec!["gateway timeout"]);
        assert_eq!(Audit::summarize(&job), "gateway timeout");
    }

    #[test]
    fn progress_without_phase_is_dropped() {
        let frame = StreamFrame::new("progress", json!({"type": "progress", "processed": 1}));
        assert_eq!(Audit::classify(&frame), None);
    }
}
