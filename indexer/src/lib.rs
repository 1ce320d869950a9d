pub mod bulk;
pub mod cache;
pub mod compiler;
pub mod concurrency;
pub mod conversions;
pub mod error;
mod macros;
pub mod metrics;
pub mod pipeline;
pub mod resolver;
pub mod source;
pub mod stats;
pub mod store;
pub mod tailer;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod types;
pub mod workers;
