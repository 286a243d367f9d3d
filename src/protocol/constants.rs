//! Wire protocol constants.
//!
//! Magic numbers and tag values for the token-multiplexed JSON-over-TCP query
//! protocol (protocol version V0_3, JSON wire format).

// Handshake magics
pub const VERSION_V0_3: u32 = 0x5f75_e83e;
pub const WIRE_FORMAT_JSON: u32 = 0x7e69_70c7;

/// ASCII status the server sends (NUL-terminated) when the handshake succeeds.
pub const HANDSHAKE_SUCCESS: &str = "SUCCESS";

// Frame layout: u64 token || u32 length || JSON payload
pub const FRAME_HEADER_SIZE: usize = 12;

// Query type tags (first element of the query array)
pub const QUERY_START: i64 = 1;
pub const QUERY_CONTINUE: i64 = 2;
pub const QUERY_STOP: i64 = 3;
pub const QUERY_NOREPLY_WAIT: i64 = 4;

// Response type tags (the `t` field)
pub const RESPONSE_SUCCESS_ATOM: i64 = 1;
pub const RESPONSE_SUCCESS_SEQUENCE: i64 = 2;
pub const RESPONSE_SUCCESS_PARTIAL: i64 = 3;
pub const RESPONSE_WAIT_COMPLETE: i64 = 4;
pub const RESPONSE_SUCCESS_FEED: i64 = 5;
pub const RESPONSE_CLIENT_ERROR: i64 = 16;
pub const RESPONSE_COMPILE_ERROR: i64 = 17;
pub const RESPONSE_RUNTIME_ERROR: i64 = 18;

/// Term tag for `DB`, used when injecting the default database optarg.
pub const TERM_DB: i64 = 14;

// Pseudo-type tags (the `$reql_type$` field)
pub const PSEUDO_TYPE_KEY: &str = "$reql_type$";
pub const PSEUDO_TIME: &str = "TIME";
pub const PSEUDO_GROUPED_DATA: &str = "GROUPED_DATA";
pub const PSEUDO_BINARY: &str = "BINARY";

// Connection defaults
pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 28015;
pub const DEFAULT_TIMEOUT_SECS: u64 = 20;
