//! Wire protocol implementation.

pub mod codec;
pub mod constants;
pub mod frame;
pub mod handshake;
pub mod pseudo;
pub mod query;
pub mod response;

pub use frame::FrameStream;
pub use pseudo::{Datum, Format, GroupedItem, RunOpts};
pub use query::{QueryType, Term};
pub use response::{Response, ResponseType};
