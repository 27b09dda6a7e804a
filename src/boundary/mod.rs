//! Boundary data crossing between host and module.
//!
//! Only scalars, function pointers and [`BoundaryString`] handles cross. The
//! string buffers live on the shared C heap (see [`heap`]).

pub mod heap;
mod string;

pub use heap::{track, LedgerReport};
pub use string::{BoundaryRef, BoundaryString};
