//! Semi-global block matching on rectified grey images.
//!
//! Stages: [`cost`] builds the block-matching cost volume, [`aggregate`]
//! runs the path recurrences, [`select`] picks disparities with uniqueness,
//! sub-pixel and left-right checks, and [`crate::speckle`] removes small
//! disconnected blobs.

pub mod aggregate;
pub mod cost;
pub mod select;

use image::GrayImage;
use log::debug;
use serde::{Deserialize, Serialize};
use stereo_core::ImageSize;

use crate::disparity::DisparityField;
use crate::speckle::filter_speckles;
use crate::DenseError;

/// Number of aggregation directions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SgmPaths {
    Four,
    #[default]
    Eight,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SgmParams {
    pub min_disparity: i32,
    /// Search range; a positive multiple of 16.
    pub num_disparities: u32,
    /// Odd matching block side.
    pub block_size: u32,
    /// Small-change penalty; defaults to `8 · channels · block_size²`.
    pub p1: Option<u32>,
    /// Large-change penalty; defaults to `32 · channels · block_size²`.
    pub p2: Option<u32>,
    /// Channel count used by the default penalties.
    pub channels: u32,
    /// Allowed left-right disagreement in pixels; negative disables the check.
    pub disp12_max_diff: i32,
    pub pre_filter_cap: u32,
    /// Required margin of the best cost over the runner-up, in percent.
    pub uniqueness_ratio: u32,
    /// Largest blob size treated as speckle; 0 disables filtering.
    pub speckle_window_size: u32,
    pub speckle_range: u32,
    pub paths: SgmPaths,
}

impl Default for SgmParams {
    fn default() -> Self {
        Self {
            min_disparity: 0,
            num_disparities: 64,
            block_size: 5,
            p1: None,
            p2: None,
            channels: 3,
            disp12_max_diff: 1,
            pre_filter_cap: 63,
            uniqueness_ratio: 10,
            speckle_window_size: 100,
            speckle_range: 2,
            paths: SgmPaths::Eight,
        }
    }
}

impl SgmParams {
    pub fn penalties(&self) -> (u32, u32) {
        let area = self.channels.max(1) * self.block_size * self.block_size;
        let p1 = self.p1.unwrap_or(8 * area);
        let p2 = self.p2.unwrap_or(32 * area);
        (p1, p2.max(p1 + 1))
    }

    pub fn validate(&self) -> Result<(), DenseError> {
        let invalid = |msg: String| Err(DenseError::InvalidParams(msg));
        if self.num_disparities == 0 || self.num_disparities % 16 != 0 {
            return invalid(format!(
                "num_disparities must be a positive multiple of 16, got {}",
                self.num_disparities
            ));
        }
        if self.block_size == 0 || self.block_size % 2 == 0 {
            return invalid(format!("block_size must be odd, got {}", self.block_size));
        }
        if self.pre_filter_cap == 0 || self.pre_filter_cap > 63 {
            return invalid(format!(
                "pre_filter_cap must be in 1..=63, got {}",
                self.pre_filter_cap
            ));
        }
        if self.uniqueness_ratio >= 100 {
            return invalid(format!(
                "uniqueness_ratio must be below 100, got {}",
                self.uniqueness_ratio
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct SgmMatcher {
    params: SgmParams,
}

impl SgmMatcher {
    pub fn new(params: SgmParams) -> Result<Self, DenseError> {
        params.validate()?;
        Ok(Self { params })
    }

    pub fn params(&self) -> &SgmParams {
        &self.params
    }

    /// Disparity of the left image against the right one.
    pub fn compute(&self, left: &GrayImage, right: &GrayImage) -> Result<DisparityField, DenseError> {
        let ls = ImageSize::new(left.width(), left.height());
        let rs = ImageSize::new(right.width(), right.height());
        if ls != rs {
            return Err(DenseError::SizeMismatch { left: ls, right: rs });
        }
        if ls.width == 0 || ls.height == 0 {
            return Err(DenseError::EmptyImage(ls));
        }
        let p = &self.params;
        let (p1, p2) = p.penalties();
        debug!(
            "SGM {}x{}: disparities {}..{}, P1 {p1}, P2 {p2}, {:?} paths",
            ls.width,
            ls.height,
            p.min_disparity,
            p.min_disparity + p.num_disparities as i32,
            p.paths
        );

        let volume = cost::block_cost_volume(left, right, p);
        let aggregated = aggregate::aggregate(&volume, p1, p2, p.paths);
        let mut field = select::select_disparities(&aggregated, p);
        if p.speckle_window_size > 0 {
            let removed = filter_speckles(&mut field, p.speckle_window_size as usize, p.speckle_range as f32);
            debug!("speckle filter removed {removed} pixels");
        }
        Ok(field)
    }
}
