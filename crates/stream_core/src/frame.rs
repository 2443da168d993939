use serde::de::DeserializeOwned;
use serde_json::Value;

use engine_logging::engine_warn;

/// Kind assigned to records whose body could not be read as a tagged JSON object.
pub const FALLBACK_KIND: &str = "content";

/// One decoded, kind-tagged record from a streamed body.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamFrame {
    pub kind: String,
    pub payload: Value,
}

impl StreamFrame {
    pub fn new(kind: impl Into<String>, payload: Value) -> Self {
        Self {
            kind: kind.into(),
            payload,
        }
    }

    /// Wraps a raw record body as a plain text content frame.
    pub fn fallback_text(raw: &str) -> Self {
        Self {
            kind: FALLBACK_KIND.to_string(),
            payload: serde_json::json!({ "type": FALLBACK_KIND, "content": raw }),
        }
    }

    /// Literal text of a fallback frame, for vocabularies without text deltas.
    pub fn fallback_content(&self) -> Option<String> {
        if self.kind != FALLBACK_KIND {
            return None;
        }
        self.payload
            .get("content")
            .and_then(Value::as_str)
            .map(str::to_owned)
    }

    /// Reads the payload into a typed body; a shape mismatch is logged and yields `None`.
    pub fn parse<T: DeserializeOwned>(&self) -> Option<T> {
        match serde_json::from_value(self.payload.clone()) {
            Ok(body) => Some(body),
            Err(err) => {
                engine_warn!("Dropping '{}' frame with unexpected shape: {}", self.kind, err);
                None
            }
        }
    }
}
