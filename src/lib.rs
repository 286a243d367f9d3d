//! RethinkDB thin client for Rust.
//!
//! A pure Rust driver core for the token-multiplexed JSON-over-TCP query
//! protocol: one long-lived connection multiplexing any number of streaming
//! cursors, with pseudo-type translation into native values.
//!
//! # Example
//!
//! ```no_run
//! use rethink_thin_rs::{connect, ConnectOptions, RunOpts, Result};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let mut conn = connect(ConnectOptions::new().db("marathon")).await?;
//!
//!     // Terms come from an external builder; raw JSON works for anything.
//!     let term = json!([67, [true, false]]);
//!     let mut cursor = conn.start(&term, RunOpts::default()).await?;
//!     while let Some(row) = conn.next_row(&mut cursor).await? {
//!         println!("{row:?}");
//!     }
//!
//!     conn.close(Default::default()).await?;
//!     Ok(())
//! }
//! ```

pub mod connection;
pub mod cursor;
pub mod error;
pub mod protocol;

use std::any::Any;

// Re-export main types
pub use connection::{CloseOptions, ConnectOptions, Connection};
pub use cursor::Cursor;
pub use error::{Error, Result};
pub use protocol::pseudo::{Datum, Format, GroupedItem, RunOpts};
pub use protocol::query::Term;
pub use protocol::response::{Response, ResponseType};

/// Connect to a server.
///
/// Accepts full [`ConnectOptions`], or a bare hostname with everything else
/// defaulted.
pub async fn connect(opts: impl Into<ConnectOptions>) -> Result<Connection> {
    Connection::connect(opts).await
}

/// Whether a value is a [`Connection`].
pub fn is_connection(value: &dyn Any) -> bool {
    value.is::<Connection>()
}
