use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// A required string option was left empty.
    #[error("`{0}` must be provided and cannot be empty")]
    MissingValue(&'static str),
    /// The reader pool cannot be empty.
    #[error("`num_readers` cannot be zero")]
    NumReadersZero,
    /// Caches need room for at least one entry.
    #[error("`cache_capacity` cannot be zero")]
    CacheCapacityZero,
    /// A field holds a value outside of its accepted range.
    #[error("Invalid value for `{field}`: {constraint}")]
    InvalidFieldValue { field: String, constraint: String },
}
