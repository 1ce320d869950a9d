//! Conversions of raw stored values into typed document values.

mod value;

pub use value::*;
