//! Read access to the metadata family and to the auxiliary tables used by collectors.

mod base;
pub mod memory;

pub use base::*;
