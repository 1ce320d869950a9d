//! Common types used throughout the indexer.
//!
//! Change events and batches produced by tailers, the metadata rows read by the resolver and
//! the bulk operations produced by the compiler.

mod document;
mod event;
mod metadata;

pub use document::*;
pub use event::*;
pub use metadata::*;
