use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use reqwest::header::ACCEPT;
use serde_json::Value;

use engine_logging::engine_debug;

use crate::{FailureKind, TransportError};

/// Body of a streaming response, chunk by chunk.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, TransportError>> + Send>>;

const ERROR_BODY_PREVIEW: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

/// Where the bearer credential travels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthPlacement {
    /// `Authorization: Bearer <token>`.
    Header,
    /// `?<name>=<token>`, for clients that cannot set headers on a streaming request.
    QueryParam(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct StreamRequest {
    pub method: HttpMethod,
    /// Path segments appended to the base URL; each one is percent-encoded.
    pub segments: Vec<String>,
    pub body: Option<Value>,
    pub auth: AuthPlacement,
}

impl StreamRequest {
    pub fn get<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            method: HttpMethod::Get,
            segments: segments.into_iter().map(Into::into).collect(),
            body: None,
            auth: AuthPlacement::Header,
        }
    }

    pub fn post<I, S>(segments: I, body: Value) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            method: HttpMethod::Post,
            segments: segments.into_iter().map(Into::into).collect(),
            body: Some(body),
            auth: AuthPlacement::Header,
        }
    }

    pub fn with_auth(mut self, auth: AuthPlacement) -> Self {
        self.auth = auth;
        self
    }
}

/// Supplies the bearer credential for each request; refresh is the implementor's concern.
pub trait CredentialSource: Send + Sync {
    fn bearer_token(&self) -> Option<String>;
}

#[derive(Debug, Clone, Default)]
pub struct StaticCredentials(Option<String>);

impl StaticCredentials {
    pub fn new(token: Option<String>) -> Self {
        Self(token)
    }
}

impl CredentialSource for StaticCredentials {
    fn bearer_token(&self) -> Option<String> {
        self.0.clone()
    }
}

#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Issues the request and returns its body as a chunk stream once a 2xx
    /// status has been received.
    async fn open_stream(&self, request: &StreamRequest) -> Result<ByteStream, TransportError>;

    /// Issues the request and reads the whole body as JSON.
    async fn request_json(&self, request: &StreamRequest) -> Result<Value, TransportError>;
}

#[derive(Debug, Clone)]
pub struct TransportSettings {
    pub connect_timeout: Duration,
    /// Whole-request bound for non-streaming calls. Streams are bounded by the
    /// session's stall timeout instead.
    pub request_timeout: Duration,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(120),
        }
    }
}

pub struct ReqwestTransport {
    base_url: reqwest::Url,
    client: reqwest::Client,
    credentials: Arc<dyn CredentialSource>,
    settings: TransportSettings,
}

impl ReqwestTransport {
    pub fn new(
        base_url: &str,
        credentials: Arc<dyn CredentialSource>,
        settings: TransportSettings,
    ) -> Result<Self, TransportError> {
        let mut base_url = reqwest::Url::parse(base_url)
            .map_err(|err| TransportError::new(FailureKind::InvalidUrl, err.to_string()))?;
        if base_url.cannot_be_a_base() {
            return Err(TransportError::new(
                FailureKind::InvalidUrl,
                format!("{base_url} cannot be a base url"),
            ));
        }
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .build()
            .map_err(|err| TransportError::new(FailureKind::Network, err.to_string()))?;

        Ok(Self {
            base_url,
            client,
            credentials,
            settings,
        })
    }

    fn resolve(&self, request: &StreamRequest) -> Result<reqwest::Url, TransportError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| TransportError::new(FailureKind::InvalidUrl, "url cannot be a base"))?
            .pop_if_empty()
            .extend(&request.segments);
        if let AuthPlacement::QueryParam(name) = &request.auth {
            if let Some(token) = self.credentials.bearer_token() {
                url.query_pairs_mut().append_pair(name, &token);
            }
        }
        Ok(url)
    }

    fn build(&self, request: &StreamRequest) -> Result<reqwest::RequestBuilder, TransportError> {
        let url = self.resolve(request)?;
        engine_debug!("{:?} {}", request.method, url.path());
        let method = match request.method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
        };
        let mut builder = self.client.request(method, url);
        if request.auth == AuthPlacement::Header {
            if let Some(token) = self.credentials.bearer_token() {
                builder = builder.bearer_auth(token);
            }
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        Ok(builder)
    }
}

#[async_trait::async_trait]
impl Transport for ReqwestTransport {
    async fn open_stream(&self, request: &StreamRequest) -> Result<ByteStream, TransportError> {
        let response = self
            .build(request)?
            .header(ACCEPT, "text/event-stream")
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let response = check_status(response).await?;

        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(map_reqwest_error));
        Ok(Box::pin(body))
    }

    async fn request_json(&self, request: &StreamRequest) -> Result<Value, TransportError> {
        let response = self
            .build(request)?
            .header(ACCEPT, "application/json")
            .timeout(self.settings.request_timeout)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let response = check_status(response).await?;

        let bytes = response.bytes().await.map_err(map_reqwest_error)?;
        serde_json::from_slice(&bytes)
            .map_err(|err| TransportError::new(FailureKind::InvalidBody, err.to_string()))
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, TransportError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = if body.trim().is_empty() {
        status.to_string()
    } else {
        format!("{status}: {}", preview(body.trim()))
    };
    Err(TransportError::new(
        FailureKind::HttpStatus(status.as_u16()),
        message,
    ))
}

fn preview(text: &str) -> &str {
    if text.len() <= ERROR_BODY_PREVIEW {
        return text;
    }
    let mut end = ERROR_BODY_PREVIEW;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

fn map_reqwest_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        return TransportError::new(FailureKind::Timeout, err.to_string());
    }
    TransportError::new(FailureKind::Network, err.to_string())
}
