//! Delivery of compiled operations to the search backend.
//!
//! Reader workers hand their operations to a single [`BulkSender`], which buffers them and
//! issues one NDJSON bulk request whenever the buffer grows past the size threshold or the
//! oldest buffered operation waited for the configured time.

mod base;
pub mod elasticsearch;
pub mod memory;
mod sender;

pub use base::*;
pub use sender::*;
