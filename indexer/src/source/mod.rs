//! Row-level change streams of the tailed tables.

mod base;
pub mod memory;

pub use base::*;
