//! Tailing of table change streams.
//!
//! A [`Tailer`] owns the [`crate::source::EventSource`] of one table and dispatches what it
//! polls to a [`TableEventHandler`]. [`PoolDispatcher`] forwards batches to the reader
//! pool, [`SkewedStringsCollector`] reacts to individual skewed-value events.

mod base;
mod dispatch;
mod skewed;
#[allow(clippy::module_inception)]
mod tailer;

pub use base::*;
pub use dispatch::*;
pub use skewed::*;
pub use tailer::*;
