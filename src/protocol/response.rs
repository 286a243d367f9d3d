//! Server response payloads.

use crate::error::Result;
use crate::protocol::constants::*;
use serde::Deserialize;
use serde_json::Value;

/// Response kind, tagged on the wire by the integer `t` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseType {
    /// A single value in `r[0]`.
    SuccessAtom,
    /// A complete sequence; no more batches follow.
    SuccessSequence,
    /// One batch of a longer sequence; a CONTINUE fetches the next.
    SuccessPartial,
    /// All outstanding noreply queries have finished.
    WaitComplete,
    /// One batch of an unbounded feed.
    SuccessFeed,
    ClientError,
    CompileError,
    RuntimeError,
}

impl ResponseType {
    /// Map a wire tag to a response kind.
    pub fn from_wire(value: i64) -> Option<Self> {
        match value {
            RESPONSE_SUCCESS_ATOM => Some(Self::SuccessAtom),
            RESPONSE_SUCCESS_SEQUENCE => Some(Self::SuccessSequence),
            RESPONSE_SUCCESS_PARTIAL => Some(Self::SuccessPartial),
            RESPONSE_WAIT_COMPLETE => Some(Self::WaitComplete),
            RESPONSE_SUCCESS_FEED => Some(Self::SuccessFeed),
            RESPONSE_CLIENT_ERROR => Some(Self::ClientError),
            RESPONSE_COMPILE_ERROR => Some(Self::CompileError),
            RESPONSE_RUNTIME_ERROR => Some(Self::RuntimeError),
            _ => None,
        }
    }

    /// The wire tag for this kind.
    pub fn wire(self) -> i64 {
        match self {
            Self::SuccessAtom => RESPONSE_SUCCESS_ATOM,
            Self::SuccessSequence => RESPONSE_SUCCESS_SEQUENCE,
            Self::SuccessPartial => RESPONSE_SUCCESS_PARTIAL,
            Self::WaitComplete => RESPONSE_WAIT_COMPLETE,
            Self::SuccessFeed => RESPONSE_SUCCESS_FEED,
            Self::ClientError => RESPONSE_CLIENT_ERROR,
            Self::CompileError => RESPONSE_COMPILE_ERROR,
            Self::RuntimeError => RESPONSE_RUNTIME_ERROR,
        }
    }

    /// Whether more batches may follow for the same token.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::SuccessPartial | Self::SuccessFeed)
    }

    /// Whether the server reported a query fault.
    pub fn is_error(self) -> bool {
        matches!(
            self,
            Self::ClientError | Self::CompileError | Self::RuntimeError
        )
    }
}

/// A decoded response frame payload: `{t, r, b?, p?, n?}`.
#[derive(Debug, Clone, Deserialize)]
pub struct Response {
    /// Response kind tag.
    pub t: i64,
    /// Result payload; one batch of rows, or `[message]` for errors.
    #[serde(default)]
    pub r: Vec<Value>,
    /// Backtrace into the query term tree, on error responses.
    #[serde(default)]
    pub b: Option<Value>,
    /// Profiling data, when the query ran with profiling.
    #[serde(default)]
    pub p: Option<Value>,
    /// Response notes.
    #[serde(default)]
    pub n: Option<Value>,
}

impl Response {
    /// Decode a response from frame payload bytes.
    pub fn parse(payload: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(payload)?)
    }

    /// The response kind, or `None` for tags this protocol version does not
    /// define. Unknown tags are surfaced to the puller, not dropped here.
    pub fn kind(&self) -> Option<ResponseType> {
        ResponseType::from_wire(self.t)
    }
}
