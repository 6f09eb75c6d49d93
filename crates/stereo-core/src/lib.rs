//! Core math and geometry primitives for `stereo-rs`.
//!
//! This crate contains:
//! - linear algebra type aliases (`Real`, `Vec2`, `Pt3`, ...),
//! - the pinhole camera with Brown-Conrady distortion,
//! - the planar calibration target and observation types,
//! - the persisted stereo parameter bundle,
//! - deterministic synthetic data used by tests across the workspace.
//!
//! Camera pipeline:
//! `pixel = K ∘ distortion ∘ projection(dir)`

/// Linear algebra type aliases and helpers.
pub mod math;
/// Camera models and distortion utilities.
pub mod models;
/// Synthetic targets, poses, noise and rendered chessboard images.
pub mod synthetic;
/// Planar calibration target geometry.
pub mod target;
/// Observation and parameter types shared by all stages.
pub mod types;

pub use math::*;
pub use models::*;
pub use synthetic::*;
pub use target::*;
pub use types::*;
