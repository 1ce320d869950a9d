//! Shared configuration types for the indexer pipeline and the replicator binary.

pub mod shared;
