//! Requests for the three streaming endpoints and the chat fallback.

use serde_json::json;

use crate::transport::{AuthPlacement, StreamRequest};

/// Query parameter carrying the token on the file-processing stream.
pub const FILE_STREAM_TOKEN_PARAM: &str = "token";

pub fn chat_stream(message: &str, conversation_id: Option<&str>) -> StreamRequest {
    StreamRequest::post(
        ["api", "v1", "chat", "stream"],
        json!({ "message": message, "conversation_id": conversation_id }),
    )
}

/// Non-streaming equivalent of [`chat_stream`].
pub fn chat_complete(message: &str, conversation_id: Option<&str>) -> StreamRequest {
    StreamRequest::post(
        ["api", "v1", "chat"],
        json!({ "message": message, "conversation_id": conversation_id }),
    )
}

pub fn file_processing_stream(filename: &str) -> StreamRequest {
    StreamRequest::get(["api", "v1", "files", filename, "process", "stream"])
        .with_auth(AuthPlacement::QueryParam(FILE_STREAM_TOKEN_PARAM.to_string()))
}

pub fn audit_stream(job_id: &str) -> StreamRequest {
    StreamRequest::post(["api", "v1", "audit", job_id, "stream"], json!({}))
}
