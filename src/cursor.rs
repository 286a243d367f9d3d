//! Per-query cursor state.
//!
//! A query's responses are multiplexed back to it by token. The connection's
//! registry owns one [`CursorState`] per live token; the public [`Cursor`] is
//! the handle callers pass back to the connection to pull rows. Batches queue
//! in arrival order and rows are yielded in the order they appear in each
//! batch's `r` array.

use crate::error::Error;
use crate::protocol::pseudo::RunOpts;
use crate::protocol::response::{Response, ResponseType};
use serde_json::Value;
use std::collections::VecDeque;

/// Handle to a started query.
///
/// Rows are pulled through the connection that started the query, e.g.
/// `conn.next_row(&mut cursor)`. The handle itself only names the token.
#[derive(Debug)]
pub struct Cursor {
    token: u64,
}

impl Cursor {
    pub(crate) fn new(token: u64) -> Self {
        Self { token }
    }

    /// The token this query runs under.
    pub fn token(&self) -> u64 {
        self.token
    }
}

/// What the state machine wants next, as seen by the connection.
#[derive(Debug)]
pub(crate) enum CursorPoll {
    /// A row is ready (raw, pre-conversion).
    Row(Value),
    /// The completion signal of a NOREPLY_WAIT arrived.
    WaitDone,
    /// The head of the queue is an error response. It stays at the head, so
    /// every subsequent poll reports it again.
    Error(Error),
    /// Terminal response seen and every queued row consumed.
    Exhausted,
    /// Queue empty, more batches available; a CONTINUE should be sent. The
    /// outstanding flag is set by this transition.
    NeedContinue,
    /// Queue empty and a START or CONTINUE is already in flight.
    Pending,
}

/// Registry-owned state for one token.
#[derive(Debug)]
pub(crate) struct CursorState {
    /// Root term of the query, kept for error construction.
    term: Value,
    opts: RunOpts,
    /// Unconsumed response batches, arrival order.
    batches: VecDeque<Response>,
    /// Position in the head batch's `r` array.
    response_index: usize,
    /// `t` of the first response observed for this token.
    first_type: Option<i64>,
    /// Terminal response received; nothing more will be enqueued.
    end: bool,
    /// A START or CONTINUE is outstanding. At most one per token.
    outstanding: bool,
    /// STOP was sent; one more response may arrive and is discarded.
    closing: bool,
}

impl CursorState {
    /// Fresh state for a just-sent START (or NOREPLY_WAIT); the request
    /// itself counts as outstanding.
    pub(crate) fn new(term: Value, opts: RunOpts) -> Self {
        Self {
            term,
            opts,
            batches: VecDeque::new(),
            response_index: 0,
            first_type: None,
            end: false,
            outstanding: true,
            closing: false,
        }
    }

    pub(crate) fn opts(&self) -> &RunOpts {
        &self.opts
    }

    pub(crate) fn ended(&self) -> bool {
        self.end
    }

    pub(crate) fn is_closing(&self) -> bool {
        self.closing
    }

    pub(crate) fn mark_closing(&mut self) {
        self.closing = true;
    }

    pub(crate) fn has_first_response(&self) -> bool {
        self.first_type.is_some()
    }

    /// True once the first response identified this query as a feed.
    pub(crate) fn is_feed(&self) -> bool {
        self.first_type == Some(ResponseType::SuccessFeed.wire())
    }

    /// Nothing queued and nothing more coming.
    pub(crate) fn is_drained(&self) -> bool {
        self.end && self.batches.is_empty()
    }

    /// Record an arrived response for this token.
    ///
    /// A batch is retained if it carries rows, or if it is the WAIT_COMPLETE
    /// completion signal; an empty batch of any other non-terminal kind is
    /// dropped (the server will send more). Any kind other than
    /// SUCCESS_PARTIAL/SUCCESS_FEED ends the query. The outstanding flag
    /// always clears: the round trip is over.
    pub(crate) fn add_response(&mut self, resp: Response) {
        if self.first_type.is_none() {
            self.first_type = Some(resp.t);
        }
        // An unrecognized tag can't be continued; treat it as terminal.
        let terminal = resp.kind().map_or(true, ResponseType::is_terminal);
        if !resp.r.is_empty() || resp.kind() == Some(ResponseType::WaitComplete) {
            self.batches.push_back(resp);
        }
        if terminal {
            self.end = true;
        }
        self.outstanding = false;
    }

    /// Advance the state machine one step.
    pub(crate) fn poll(&mut self) -> CursorPoll {
        let head_kind = match self.batches.front() {
            Some(head) => (head.kind(), head.t),
            None => {
                if self.end || self.closing {
                    return CursorPoll::Exhausted;
                }
                if self.outstanding {
                    return CursorPoll::Pending;
                }
                self.outstanding = true;
                return CursorPoll::NeedContinue;
            }
        };

        match head_kind.0 {
            Some(kind) if kind.is_error() => CursorPoll::Error(self.head_error(kind)),
            Some(ResponseType::WaitComplete) => {
                self.batches.pop_front();
                self.response_index = 0;
                CursorPoll::WaitDone
            }
            Some(_) => {
                let row = match self.batches.front_mut() {
                    Some(head) => {
                        let row = head.r[self.response_index].take();
                        self.response_index += 1;
                        if self.response_index >= head.r.len() {
                            self.batches.pop_front();
                            self.response_index = 0;
                        }
                        row
                    }
                    None => return CursorPoll::Exhausted,
                };
                CursorPoll::Row(row)
            }
            None => CursorPoll::Error(Error::UnknownResponseType { value: head_kind.1 }),
        }
    }

    /// Build the typed error for the error response at the queue head.
    fn head_error(&self, kind: ResponseType) -> Error {
        let head = match self.batches.front() {
            Some(head) => head,
            None => return Error::driver("cursor error response vanished"),
        };
        let message = match head.r.first() {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => String::new(),
        };
        let term = self.term.clone();
        let backtrace = head.b.clone();
        match kind {
            ResponseType::CompileError => Error::Compile {
                message,
                term,
                backtrace,
            },
            ResponseType::ClientError => Error::Client {
                message,
                term,
                backtrace,
            },
            _ => Error::Runtime {
                message,
                term,
                backtrace,
            },
        }
    }
}
