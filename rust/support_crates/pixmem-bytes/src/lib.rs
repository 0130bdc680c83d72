//! Byte-level helpers shared by the pixmem allocators: alignment arithmetic and
//! bounded, overlap-safe copy and reset primitives.

pub mod align;
pub mod ops;

pub use ops::{copy, reset};
