//! Chessboard detection for calibration images.
//!
//! The detector is a pure function of the image and the target geometry:
//!
//! 1. chessboard localisation with `calib-targets` on `chess-corners`
//!    X-junction responses,
//! 2. canonical row-major ordering of the grid-labelled corners ([`grid`]),
//! 3. homography consistency gate,
//! 4. iterative gradient-based sub-pixel refinement ([`subpix`]).
//!
//! The result is all-or-nothing: either every interior corner in canonical
//! row-major order, or [`CornerObservation::NotFound`].

pub mod detector;
pub mod grid;
pub mod image_f32;
pub mod subpix;

pub use detector::{ChessboardDetector, CornerObservation, DetectorParams};
pub use subpix::SubPixParams;
