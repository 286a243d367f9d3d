//! High-level connection API.
//!
//! One `Connection` owns one TCP socket. Queries are serialized onto it
//! tagged with per-connection tokens; arriving frames are routed back to the
//! registered cursor state for their token. All I/O is sequential: exactly
//! one receive is in flight at a time, so registry and cursor mutation needs
//! no locking.

use crate::cursor::{Cursor, CursorPoll, CursorState};
use crate::error::{Error, Result};
use crate::protocol::constants::{DEFAULT_HOST, DEFAULT_PORT, DEFAULT_TIMEOUT_SECS};
use crate::protocol::frame::FrameStream;
use crate::protocol::handshake;
use crate::protocol::pseudo::{self, Datum, RunOpts};
use crate::protocol::query::{self, QueryType, Term};
use crate::protocol::response::Response;
use futures::Stream;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::{debug, trace};

/// Connection configuration.
///
/// # Example
///
/// ```no_run
/// use rethink_thin_rs::ConnectOptions;
/// use std::time::Duration;
///
/// let opts = ConnectOptions::new()
///     .host("db.example.com")
///     .db("marathon")
///     .auth_key("hunter2")
///     .timeout(Duration::from_secs(5));
/// ```
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    /// TCP host.
    pub host: String,
    /// TCP port.
    pub port: u16,
    /// Default database injected into START queries.
    pub db: Option<String>,
    /// Pre-shared handshake auth key.
    pub auth_key: String,
    /// Socket timeout, applied to the TCP connect and to every receive.
    pub timeout: Duration,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            db: None,
            auth_key: String::new(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl ConnectOptions {
    /// Options with all defaults (`localhost:28015`, no auth key, 20 s).
    pub fn new() -> Self {
        Self::default()
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn db(mut self, db: impl Into<String>) -> Self {
        self.db = Some(db.into());
        self
    }

    pub fn auth_key(mut self, auth_key: impl Into<String>) -> Self {
        self.auth_key = auth_key.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// A bare string is a hostname with everything else defaulted.
impl From<&str> for ConnectOptions {
    fn from(host: &str) -> Self {
        Self::default().host(host)
    }
}

impl From<String> for ConnectOptions {
    fn from(host: String) -> Self {
        Self::default().host(host)
    }
}

/// Options for [`Connection::close`] and [`Connection::reconnect`].
#[derive(Debug, Clone, Copy)]
pub struct CloseOptions {
    /// Wait for outstanding noreply queries to finish before closing.
    pub noreply_wait: bool,
}

impl Default for CloseOptions {
    fn default() -> Self {
        Self { noreply_wait: true }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnState {
    Open,
    Closing,
    Closed,
}

/// A connection to the server.
#[derive(Debug)]
pub struct Connection {
    /// None once the socket has been released.
    stream: Option<FrameStream<TcpStream>>,
    opts: ConnectOptions,
    /// Database injected into START queries; mutable via [`use_db`].
    ///
    /// [`use_db`]: Connection::use_db
    default_db: Option<String>,
    /// Next query token. Strictly increasing, never reused.
    next_token: u64,
    /// Live queries by token.
    pending: HashMap<u64, CursorState>,
    state: ConnState,
}

impl Connection {
    /// Open a socket, perform the handshake, and return an open connection.
    pub async fn connect(opts: impl Into<ConnectOptions>) -> Result<Self> {
        let opts = opts.into();
        let addr = format!("{}:{}", opts.host, opts.port);
        let tcp = match tokio::time::timeout(opts.timeout, TcpStream::connect(&addr)).await {
            Ok(Ok(tcp)) => tcp,
            Ok(Err(e)) => {
                return Err(Error::ConnectFailed {
                    host: opts.host,
                    port: opts.port,
                    message: e.to_string(),
                })
            }
            Err(_) => {
                return Err(Error::ConnectFailed {
                    host: opts.host,
                    port: opts.port,
                    message: format!("connection attempt timed out after {:?}", opts.timeout),
                })
            }
        };
        tcp.set_nodelay(true)?;

        let mut stream = FrameStream::new(tcp, opts.timeout);
        match handshake::perform(&mut stream, &opts.auth_key).await {
            Ok(()) => {}
            // The server spoke; report its status text as-is.
            Err(e @ Error::HandshakeRejected { .. }) => return Err(e),
            Err(e) => {
                return Err(Error::ConnectFailed {
                    host: opts.host,
                    port: opts.port,
                    message: e.to_string(),
                })
            }
        }

        debug!(host = %opts.host, port = opts.port, "connection open");
        let default_db = opts.db.clone();
        Ok(Self {
            stream: Some(stream),
            opts,
            default_db,
            next_token: 1,
            pending: HashMap::new(),
            state: ConnState::Open,
        })
    }

    /// Whether the connection accepts new queries.
    pub fn is_open(&self) -> bool {
        self.state == ConnState::Open
    }

    /// The configured host.
    pub fn host(&self) -> &str {
        &self.opts.host
    }

    /// The configured port.
    pub fn port(&self) -> u16 {
        self.opts.port
    }

    /// Change the default database for subsequent `start` calls.
    pub fn use_db(&mut self, db: impl Into<String>) {
        self.default_db = Some(db.into());
    }

    fn alloc_token(&mut self) -> u64 {
        let token = self.next_token;
        self.next_token += 1;
        token
    }

    fn stream_mut(&mut self) -> Result<&mut FrameStream<TcpStream>> {
        self.stream.as_mut().ok_or(Error::ConnectionClosed)
    }

    /// Mark the connection dead on hard I/O failure; timeouts and per-query
    /// errors pass through untouched.
    fn fail(&mut self, cause: Error) -> Error {
        match cause {
            Error::Io(_) | Error::ConnectionClosed => {
                self.state = ConnState::Closed;
                self.stream = None;
                Error::driver(format!("connection returned: {cause}"))
            }
            other => other,
        }
    }

    fn global_optargs(&self, opts: &RunOpts) -> Map<String, Value> {
        let mut map = Map::new();
        if let Some(db) = opts.db.as_deref().or(self.default_db.as_deref()) {
            map.insert("db".to_string(), query::db_term(db));
        }
        if opts.noreply {
            map.insert("noreply".to_string(), Value::Bool(true));
        }
        map
    }

    /// Start a query.
    ///
    /// Allocates the next token, registers a cursor for it, and writes a
    /// START frame. With `opts.noreply` no response is ever expected and the
    /// returned cursor is already exhausted.
    pub async fn start<T: Term + ?Sized>(&mut self, term: &T, opts: RunOpts) -> Result<Cursor> {
        if self.state != ConnState::Open {
            return Err(Error::ConnectionClosed);
        }
        let token = self.alloc_token();
        let built = term.build();
        let payload = query::start_payload(&built, &self.global_optargs(&opts))?;
        trace!(token, noreply = opts.noreply, "START");
        let noreply = opts.noreply;
        if !noreply {
            self.pending.insert(token, CursorState::new(built, opts));
        }
        if let Err(e) = self.stream_mut()?.write_frame(token, &payload).await {
            self.pending.remove(&token);
            return Err(self.fail(e));
        }
        Ok(Cursor::new(token))
    }

    /// Pull the next row from a cursor.
    ///
    /// Returns `Ok(None)` once the query has no more rows. When the local
    /// queue runs dry on a continuable query, issues a CONTINUE (at most one
    /// in flight per token) and blocks on arriving frames. Server-reported
    /// errors are terminal and sticky: every subsequent call reports the same
    /// error.
    pub async fn next_row(&mut self, cursor: &mut Cursor) -> Result<Option<Datum>> {
        let token = cursor.token();
        loop {
            let Some(state) = self.pending.get_mut(&token) else {
                return Ok(None);
            };
            match state.poll() {
                CursorPoll::Row(row) => {
                    let opts = state.opts().clone();
                    if state.is_drained() {
                        self.pending.remove(&token);
                    }
                    return Ok(Some(pseudo::convert(row, &opts)?));
                }
                CursorPoll::WaitDone => {
                    self.pending.remove(&token);
                    return Ok(None);
                }
                CursorPoll::Exhausted => {
                    // A closing cursor's entry stays registered to swallow
                    // the response STOP elicits.
                    if !state.is_closing() || state.ended() {
                        self.pending.remove(&token);
                    }
                    return Ok(None);
                }
                CursorPoll::Error(e) => return Err(e),
                CursorPoll::NeedContinue => self.continue_query(token).await?,
                CursorPoll::Pending => self.pump_one().await?,
            }
        }
    }

    /// Drain a cursor into a vector.
    ///
    /// Fails on feeds: a feed never terminates, so collecting it would never
    /// return.
    pub async fn to_array(&mut self, cursor: &mut Cursor) -> Result<Vec<Datum>> {
        let token = cursor.token();
        loop {
            let ready = match self.pending.get(&token) {
                Some(state) => state.has_first_response(),
                None => true,
            };
            if ready {
                break;
            }
            self.pump_one().await?;
        }
        if self.pending.get(&token).is_some_and(CursorState::is_feed) {
            return Err(Error::driver("`to_array` is not available for feeds."));
        }
        let mut rows = Vec::new();
        while let Some(row) = self.next_row(cursor).await? {
            rows.push(row);
        }
        Ok(rows)
    }

    /// Invoke `f` for every remaining row of a cursor.
    pub async fn for_each<F>(&mut self, cursor: &mut Cursor, mut f: F) -> Result<()>
    where
        F: FnMut(Datum),
    {
        while let Some(row) = self.next_row(cursor).await? {
            f(row);
        }
        Ok(())
    }

    /// A `Stream` over a cursor's remaining rows.
    ///
    /// An error is yielded once, then the stream fuses.
    pub fn rows<'a>(
        &'a mut self,
        cursor: &'a mut Cursor,
    ) -> impl Stream<Item = Result<Datum>> + 'a {
        futures::stream::unfold((self, cursor, false), |(conn, cursor, done)| async move {
            if done {
                return None;
            }
            match conn.next_row(cursor).await {
                Ok(Some(row)) => Some((Ok(row), (conn, cursor, false))),
                Ok(None) => None,
                Err(e) => Some((Err(e), (conn, cursor, true))),
            }
        })
    }

    /// Close a cursor, telling the server to stop producing for its token.
    ///
    /// Best effort: the server may have one more batch in flight, which the
    /// dispatcher discards on arrival.
    pub async fn close_cursor(&mut self, cursor: &mut Cursor) -> Result<()> {
        let token = cursor.token();
        let Some(state) = self.pending.get_mut(&token) else {
            return Ok(());
        };
        if state.ended() {
            self.pending.remove(&token);
            return Ok(());
        }
        state.mark_closing();
        self.end_query(token).await
    }

    /// Write a CONTINUE frame for a token.
    async fn continue_query(&mut self, token: u64) -> Result<()> {
        trace!(token, "CONTINUE");
        let payload = query::control_payload(QueryType::Continue);
        if let Err(e) = self.stream_mut()?.write_frame(token, &payload).await {
            return Err(self.fail(e));
        }
        Ok(())
    }

    /// Write a STOP frame for a token.
    async fn end_query(&mut self, token: u64) -> Result<()> {
        trace!(token, "STOP");
        let payload = query::control_payload(QueryType::Stop);
        if let Err(e) = self.stream_mut()?.write_frame(token, &payload).await {
            return Err(self.fail(e));
        }
        Ok(())
    }

    /// Wait for every outstanding noreply query to finish on the server.
    pub async fn noreply_wait(&mut self) -> Result<()> {
        if self.state != ConnState::Open {
            return Err(Error::ConnectionClosed);
        }
        self.noreply_wait_inner().await
    }

    async fn noreply_wait_inner(&mut self) -> Result<()> {
        let token = self.alloc_token();
        self.pending
            .insert(token, CursorState::new(Value::Null, RunOpts::default()));
        trace!(token, "NOREPLY_WAIT");
        let payload = query::control_payload(QueryType::NoreplyWait);
        if let Err(e) = self.stream_mut()?.write_frame(token, &payload).await {
            self.pending.remove(&token);
            return Err(self.fail(e));
        }
        // Resolves when the WAIT_COMPLETE signal (or an error) comes back.
        let mut cursor = Cursor::new(token);
        self.next_row(&mut cursor).await?;
        Ok(())
    }

    /// Close the connection.
    ///
    /// With `noreply_wait` set (the default), first waits for outstanding
    /// noreply queries. The socket is released here on every exit path;
    /// closing an already-closed connection is a no-op.
    pub async fn close(&mut self, opts: CloseOptions) -> Result<()> {
        let mut result = Ok(());
        if self.stream.is_some() && self.state == ConnState::Open && opts.noreply_wait {
            self.state = ConnState::Closing;
            result = self.noreply_wait_inner().await;
        }
        debug!("connection closed");
        self.pending.clear();
        self.state = ConnState::Closed;
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.shutdown().await;
        }
        result
    }

    /// Close, then reconnect with the same host, port, auth key, and timeout.
    /// The current default database carries over.
    pub async fn reconnect(&mut self, opts: CloseOptions) -> Result<()> {
        self.close(opts).await?;
        let mut fresh = Self::connect(self.opts.clone()).await?;
        fresh.default_db = self.default_db.clone();
        *self = fresh;
        Ok(())
    }

    /// Hard abort: drop the socket and abandon every registered query.
    pub fn cancel(&mut self) {
        debug!("connection cancelled");
        self.pending.clear();
        self.stream = None;
        self.state = ConnState::Closed;
    }

    /// Read one frame and route it to its token's cursor state.
    async fn pump_one(&mut self) -> Result<()> {
        let (token, payload) = match self.stream_mut()?.read_frame().await {
            Ok(frame) => frame,
            Err(e) => return Err(self.fail(e)),
        };
        let resp = Response::parse(&payload)?;
        trace!(token, t = resp.t, rows = resp.r.len(), "frame");
        match self.pending.get_mut(&token) {
            Some(state) if state.is_closing() => {
                // Tail batch of a cursor closed early; discard it.
                self.pending.remove(&token);
            }
            Some(state) => state.add_response(resp),
            None => return Err(Error::UnexpectedToken { token }),
        }
        Ok(())
    }
}
