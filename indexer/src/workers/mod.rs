//! The reader pool turning dispatched batches into delivered documents.

pub mod pool;
pub mod reader;
