//! Outbound query payloads.
//!
//! A query is a JSON array `[type_tag, term?, global_optargs?]`; the optarg
//! object is omitted when empty. CONTINUE/STOP/NOREPLY_WAIT are bare
//! one-element arrays.

use crate::error::Result;
use crate::protocol::constants::*;
use serde_json::{json, Map, Value};

/// Query type, the first element of the query array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryType {
    Start,
    Continue,
    Stop,
    NoreplyWait,
}

impl QueryType {
    /// The wire tag for this query type.
    pub fn wire(self) -> i64 {
        match self {
            Self::Start => QUERY_START,
            Self::Continue => QUERY_CONTINUE,
            Self::Stop => QUERY_STOP,
            Self::NoreplyWait => QUERY_NOREPLY_WAIT,
        }
    }
}

/// A buildable query term tree.
///
/// Term construction is out of scope for the driver core; anything that can
/// render itself into the protocol's JSON term encoding can be started on a
/// connection. `serde_json::Value` implements it as the raw escape hatch.
pub trait Term {
    /// Render this term into its wire JSON encoding.
    fn build(&self) -> Value;
}

impl Term for Value {
    fn build(&self) -> Value {
        self.clone()
    }
}

/// The `DB` term wrapping a database name, for the `db` global optarg.
pub fn db_term(name: &str) -> Value {
    json!([TERM_DB, [name]])
}

/// Encode a START query for `term` with the given global optargs.
pub fn start_payload(term: &Value, optargs: &Map<String, Value>) -> Result<Vec<u8>> {
    let query = if optargs.is_empty() {
        json!([QUERY_START, term])
    } else {
        json!([QUERY_START, term, optargs])
    };
    Ok(serde_json::to_vec(&query)?)
}

/// Encode a termless query (CONTINUE, STOP, NOREPLY_WAIT).
pub fn control_payload(query_type: QueryType) -> Vec<u8> {
    format!("[{}]", query_type.wire()).into_bytes()
}
