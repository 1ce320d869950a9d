//! Concurrency primitives coordinating tailers, reader workers and the bulk sender.
//!
//! The [`shutdown`] module broadcasts the pipeline-wide stop request. Tailers observe it
//! between poll cycles so that an in-flight batch is always completed. The [`barrier`]
//! module implements the per-batch acknowledgement a tailer awaits before it polls again,
//! which keeps per-table commit order and bounds the amount of queued work.

pub mod barrier;
pub mod shutdown;
