mod base;
mod batch;
mod bulk;
mod pipeline;
mod search;
mod source;

pub use base::*;
pub use batch::*;
pub use bulk::*;
pub use pipeline::*;
pub use search::*;
pub use source::*;
