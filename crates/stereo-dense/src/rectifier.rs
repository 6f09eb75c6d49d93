//! Rectification with cached transforms and lookup tables.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use image::{ImageBuffer, Pixel};
use log::debug;
use stereo_core::{ImageSize, Mat4, StereoParameters};

use crate::rectify::{stereo_rectify, RectificationTransforms, RectifyOptions};
use crate::remap::{init_rectify_map, remap, RemapTable};
use crate::DenseError;

/// Transforms and both lookup tables for one `(image size, alpha)`.
#[derive(Debug, Clone)]
pub struct RectifierMaps {
    pub transforms: RectificationTransforms,
    pub left: RemapTable,
    pub right: RemapTable,
}

pub struct RectifiedPair<P: Pixel> {
    pub left: ImageBuffer<P, Vec<u8>>,
    pub right: ImageBuffer<P, Vec<u8>>,
    pub q: Mat4,
    pub maps: Arc<RectifierMaps>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct CacheKey {
    size: ImageSize,
    alpha_bits: Option<u64>,
}

impl CacheKey {
    fn new(size: ImageSize, opts: &RectifyOptions) -> Self {
        Self {
            size,
            alpha_bits: opts.alpha.map(f64::to_bits),
        }
    }
}

/// Rectifier bound to one calibration. Frames with an already seen size and
/// alpha reuse the computed tables.
pub struct StereoRectifier {
    params: Arc<StereoParameters>,
    cache: Mutex<HashMap<CacheKey, Arc<RectifierMaps>>>,
}

impl StereoRectifier {
    pub fn new(params: Arc<StereoParameters>) -> Self {
        Self {
            params,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn params(&self) -> &StereoParameters {
        &self.params
    }

    pub fn cached_entries(&self) -> usize {
        self.cache.lock().map(|c| c.len()).unwrap_or(0)
    }

    pub fn maps(&self, size: ImageSize, opts: &RectifyOptions) -> Result<Arc<RectifierMaps>, DenseError> {
        let key = CacheKey::new(size, opts);
        let mut cache = self.cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(hit) = cache.get(&key) {
            return Ok(Arc::clone(hit));
        }

        debug!("computing rectification maps for {size} (alpha {:?})", opts.alpha);
        let transforms = stereo_rectify(&self.params, size, opts)?;
        let left = init_rectify_map(&self.params.left, &transforms.r1, &transforms.p1, size)?;
        let right = init_rectify_map(&self.params.right, &transforms.r2, &transforms.p2, size)?;
        let maps = Arc::new(RectifierMaps {
            transforms,
            left,
            right,
        });
        cache.insert(key, Arc::clone(&maps));
        Ok(maps)
    }

    /// Rectify a frame pair; both frames must share one size.
    pub fn rectify_pair<P>(
        &self,
        left: &ImageBuffer<P, Vec<u8>>,
        right: &ImageBuffer<P, Vec<u8>>,
        opts: &RectifyOptions,
    ) -> Result<RectifiedPair<P>, DenseError>
    where
        P: Pixel<Subpixel = u8> + Send + Sync,
    {
        let ls = ImageSize::new(left.width(), left.height());
        let rs = ImageSize::new(right.width(), right.height());
        if ls != rs {
            return Err(DenseError::SizeMismatch { left: ls, right: rs });
        }
        let maps = self.maps(ls, opts)?;
        Ok(RectifiedPair {
            left: remap(left, &maps.left),
            right: remap(right, &maps.right),
            q: maps.transforms.q,
            maps,
        })
    }
}
