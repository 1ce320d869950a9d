//! Tracing initialisation shared by the replicator binary and the test suites.

pub mod tracing;
