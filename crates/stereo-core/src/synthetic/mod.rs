//! Deterministic synthetic data.
//!
//! Everything here is seeded or closed-form so tests reproduce bit-for-bit
//! across platforms.

pub mod chessboard;
pub mod noise;
pub mod planar;

pub use chessboard::*;
pub use noise::*;
pub use planar::*;
