use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Error currency for the whole crate.
///
/// Mirrors the flat single-enum shape used throughout: one `thiserror`
/// derive, `#[source]`/`#[from]` wiring to preserve causality, and
/// `Display` messages safe to log directly.
#[derive(Debug, Error)]
pub enum AgentError {
    /// A well-formed JSON-RPC error response from the peer.
    #[error("rpc error {code}: {message}")]
    Rpc {
        code: i64,
        message: String,
        data: Option<serde_json::Value>,
    },

    /// The caller's or the client's default deadline elapsed before a response arrived.
    #[error("request timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    /// The caller cancelled the in-flight call.
    #[error("request cancelled")]
    Cancelled,

    /// The transport is closed, or a write/read failed at the stream level.
    #[error("transport error: {0}")]
    Transport(String),

    /// Local param marshaling failed, or a server request's params could not be decoded.
    #[error("invalid params: {0}")]
    InvalidParams(String),

    /// A typed caller expected a value but the peer returned a null result.
    #[error("expected a result, got null")]
    EmptyResult,

    /// A server-originated request handler returned an error or panicked.
    #[error("internal handler error")]
    InternalHandler,

    /// Registering a pending entry for an id that is already in flight.
    #[error("duplicate request id")]
    DuplicateId,

    /// The agent binary could not be spawned.
    #[error("failed to spawn `{binary}`: {source}")]
    Spawn {
        binary: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Waiting for the child process to exit failed at the OS level.
    #[error("failed to wait for child process: {source}")]
    Wait {
        #[source]
        source: std::io::Error,
    },

    /// The one-shot `initialize` handshake failed.
    #[error("initialization handshake failed: {0}")]
    Handshake(String),
}

impl AgentError {
    pub fn rpc(code: i64, message: impl Into<String>, data: Option<serde_json::Value>) -> Self {
        AgentError::Rpc {
            code,
            message: message.into(),
            data,
        }
    }

    /// `true` for the error kinds a caller should typically retry, as opposed to abort on.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AgentError::Timeout { .. } | AgentError::Transport(_))
    }
}
