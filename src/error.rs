//! Error types for the RethinkDB thin client.

use serde_json::Value;
use std::io;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for driver operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for driver operations.
///
/// Server-reported query faults keep the root term of the failed query and the
/// backtrace the server attached, so callers can see which part of the query
/// tree the server objected to.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error during network communication.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Malformed JSON on the wire.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TCP connect or handshake I/O failed.
    #[error("Could not connect to {host}:{port}. {message}")]
    ConnectFailed {
        host: String,
        port: u16,
        message: String,
    },

    /// The server answered the handshake with something other than `SUCCESS`.
    #[error("Server dropped connection with message: '{status}'")]
    HandshakeRejected { status: String },

    /// Connection closed.
    #[error("Connection closed")]
    ConnectionClosed,

    /// A socket receive exceeded the configured timeout.
    #[error("Read timed out after {timeout:?}")]
    ReadTimeout { timeout: Duration },

    /// A frame arrived for a token with no registered query.
    #[error("Unexpected token {token}")]
    UnexpectedToken { token: u64 },

    /// The response `t` tag is not one this protocol version defines.
    #[error("Unknown response type: {value}")]
    UnknownResponseType { value: i64 },

    /// Local invariant or protocol violation.
    #[error("{message}")]
    Driver { message: String },

    /// The server could not compile the query.
    #[error("Compile error: {message}")]
    Compile {
        message: String,
        term: Value,
        backtrace: Option<Value>,
    },

    /// The server reports the client broke the protocol.
    #[error("Client error: {message}")]
    Client {
        message: String,
        term: Value,
        backtrace: Option<Value>,
    },

    /// The query failed while running on the server.
    #[error("Runtime error: {message}")]
    Runtime {
        message: String,
        term: Value,
        backtrace: Option<Value>,
    },
}

impl Error {
    /// Create a driver error.
    pub fn driver(message: impl Into<String>) -> Self {
        Self::Driver {
            message: message.into(),
        }
    }

    /// True for the locally-raised kinds, as opposed to server-reported ones.
    pub fn is_driver(&self) -> bool {
        !matches!(
            self,
            Error::Compile { .. } | Error::Client { .. } | Error::Runtime { .. }
        )
    }

    /// Backtrace attached by the server, if this is a server-reported error.
    pub fn backtrace(&self) -> Option<&Value> {
        match self {
            Error::Compile { backtrace, .. }
            | Error::Client { backtrace, .. }
            | Error::Runtime { backtrace, .. } => backtrace.as_ref(),
            _ => None,
        }
    }
}
