//! Stream engine: byte decoding, event dispatch, transport and session control.
mod bridge;
mod decode;
mod dispatch;
pub mod requests;
mod session;
mod transport;
mod types;

pub use bridge::forward_session;
pub use decode::{Decoded, DecodeError, FrameDecoder, Framing, DEFAULT_MAX_RECORD_BYTES};
pub use dispatch::Dispatcher;
pub use session::{SessionController, SessionHandle, SessionSettings};
pub use transport::{
    AuthPlacement, ByteStream, CredentialSource, HttpMethod, ReqwestTransport, StaticCredentials,
    StreamRequest, Transport, TransportSettings,
};
pub use types::{FailureKind, SessionError, SessionEvent, SessionState, TransportError};
