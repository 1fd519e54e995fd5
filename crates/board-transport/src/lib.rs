//! Board stream transport
//!
//! Reads a long-lived newline-delimited JSON response body and hands each
//! event to a handler. The transport layer handles:
//! - Reassembling lines split across chunk boundaries
//! - Skipping keep-alive blank lines and malformed lines
//! - Idle timeout on a silent connection
//! - Cancellation that guarantees no handler call after `close()` returns
//!
//! The reader is decoupled from event semantics via the `EventHandler` trait.

pub mod ndjson;
pub mod reader;

pub use ndjson::LineBuffer;
pub use reader::{Control, EventHandler, ReaderConfig, StreamEnd, StreamHandle, StreamReader};
