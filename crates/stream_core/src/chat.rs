//! Assistant chat vocabulary: `content`, `metadata`, `done`, `error`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{ErrorInfo, ErrorOrigin, Outcome, StreamFrame, Vocabulary};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Chat;

/// Side-channel facts about a response. Unknown fields are kept in `extra`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ChatMetadata {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub sql: Option<String>,
    #[serde(default, alias = "execution_time_ms")]
    pub elapsed_ms: Option<u64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChatMetadata {
    /// Later values win field by field; absent fields keep what was there.
    fn merge(&mut self, other: &ChatMetadata) {
        if other.model.is_some() {
            self.model.clone_from(&other.model);
        }
        if other.sql.is_some() {
            self.sql.clone_from(&other.sql);
        }
        if other.elapsed_ms.is_some() {
            self.elapsed_ms = other.elapsed_ms;
        }
        for (key, value) in &other.extra {
            self.extra.insert(key.clone(), value.clone());
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    Content {
        text: String,
    },
    Metadata(ChatMetadata),
    Done {
        conversation_id: Option<String>,
        message_id: Option<String>,
    },
    Error {
        message: String,
    },
}

/// An assistant message under construction.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChatMessage {
    pub content: String,
    pub metadata: Option<ChatMetadata>,
    pub conversation_id: Option<String>,
    pub message_id: Option<String>,
}

#[derive(Deserialize)]
struct ContentBody {
    #[serde(default)]
    content: String,
}

#[derive(Deserialize)]
struct MetadataBody {
    #[serde(default)]
    metadata: Option<ChatMetadata>,
    #[serde(flatten)]
    inline: ChatMetadata,
}

#[derive(Deserialize)]
struct DoneBody {
    #[serde(default)]
    conversation_id: Option<String>,
    #[serde(default)]
    message_id: Option<String>,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default, alias = "error", alias = "detail")]
    message: Option<String>,
}

#[derive(Deserialize)]
struct CompleteBody {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    metadata: Option<ChatMetadata>,
    #[serde(default)]
    conversation_id: Option<String>,
    #[serde(default)]
    message_id: Option<String>,
    #[serde(default, alias = "detail")]
    error: Option<String>,
}

impl Vocabulary for Chat {
    type Event = ChatEvent;
    type Record = ChatMessage;

    const NAME: &'static str = "chat";

    fn classify(frame: &StreamFrame) -> Option<ChatEvent> {
        match frame.kind.as_str() {
            "content" => frame
                .parse::<ContentBody>()
                .map(|body| ChatEvent::Content { text: body.content }),
            "metadata" => frame.parse::<MetadataBody>().map(|body| {
                let mut metadata = body.inline;
                // The "type" tag lands in the flattened map; it is not metadata.
                metadata.extra.remove("type");
                metadata.extra.remove("metadata");
                if let Some(nested) = body.metadata {
                    metadata.merge(&nested);
                }
                ChatEvent::Metadata(metadata)
            }),
            "done" => frame.parse::<DoneBody>().map(|body| ChatEvent::Done {
                conversation_id: body.conversation_id,
                message_id: body.message_id,
            }),
            "error" => frame.parse::<ErrorBody>().map(|body| ChatEvent::Error {
                message: body.message.unwrap_or_else(|| "unknown error".to_string()),
            }),
            _ => None,
        }
    }

    fn terminal(event: &ChatEvent) -> Option<Outcome> {
        match event {
            ChatEvent::Done { .. } => Some(Outcome::Done),
            ChatEvent::Error { message } => Some(Outcome::Error(ErrorInfo::new(
                ErrorOrigin::Application,
                message.clone(),
            ))),
            ChatEvent::Content { .. } | ChatEvent::Metadata(_) => None,
        }
    }

    fn apply(record: &mut ChatMessage, event: &ChatEvent) {
        match event {
            ChatEvent::Content { text } => record.content.push_str(text),
            ChatEvent::Metadata(metadata) => match record.metadata.as_mut() {
                Some(existing) => existing.merge(metadata),
                None => record.metadata = Some(metadata.clone()),
            },
            ChatEvent::Done {
                conversation_id,
                message_id,
            } => {
                record.conversation_id.clone_from(conversation_id);
                record.message_id.clone_from(message_id);
            }
            ChatEvent::Error { .. } => {}
        }
    }

    fn from_complete_response(body: &Value) -> Vec<ChatEvent> {
        let parsed: CompleteBody = match serde_json::from_value(body.clone()) {
            Ok(parsed) => parsed,
            Err(err) => {
                return vec![ChatEvent::Error {
                    message: format!("unreadable response: {err}"),
                }]
            }
        };
        if let Some(message) = parsed.error {
            return vec![ChatEvent::Error { message }];
        }

        let mut events = Vec::with_capacity(3);
        if let Some(metadata) = parsed.metadata {
            events.push(ChatEvent::Metadata(metadata));
        }
        if let Some(text) = parsed.content {
            events.push(ChatEvent::Content { text });
        }
        events.push(ChatEvent::Done {
            conversation_id: parsed.conversation_id,
            message_id: parsed.message_id,
        });
        events
    }

    fn summarize(record: &ChatMessage) -> String {
        record.content.clone()
    }
}
