//! Owned single-channel f32 image in row-major layout.

use image::GrayImage;
use rayon::prelude::*;

#[derive(Clone, Debug)]
pub struct ImageF32 {
    pub w: usize,
    pub h: usize,
    pub data: Vec<f32>,
}

impl ImageF32 {
    pub fn new(w: usize, h: usize) -> Self {
        Self {
            w,
            h,
            data: vec![0.0; w * h],
        }
    }

    pub fn from_gray(img: &GrayImage) -> Self {
        Self {
            w: img.width() as usize,
            h: img.height() as usize,
            data: img.as_raw().iter().map(|&v| v as f32).collect(),
        }
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> f32 {
        self.data[y * self.w + x]
    }

    /// Pixel with coordinates clamped to the image.
    #[inline]
    pub fn get_clamped(&self, x: isize, y: isize) -> f32 {
        let x = x.clamp(0, self.w as isize - 1) as usize;
        let y = y.clamp(0, self.h as isize - 1) as usize;
        self.get(x, y)
    }
}

fn gaussian_taps(sigma: f32) -> Vec<f32> {
    let radius = (3.0 * sigma).ceil().max(1.0) as isize;
    let mut taps: Vec<f32> = (-radius..=radius)
        .map(|i| (-(i * i) as f32 / (2.0 * sigma * sigma)).exp())
        .collect();
    let sum: f32 = taps.iter().sum();
    taps.iter_mut().for_each(|t| *t /= sum);
    taps
}

/// Separable Gaussian blur with clamped borders; `sigma <= 0` copies.
pub fn gaussian_blur(src: &ImageF32, sigma: f32) -> ImageF32 {
    if sigma <= 0.0 {
        return src.clone();
    }
    let taps = gaussian_taps(sigma);
    let r = (taps.len() / 2) as isize;
    let (w, h) = (src.w, src.h);

    let mut tmp = ImageF32::new(w, h);
    tmp.data
        .par_chunks_mut(w.max(1))
        .enumerate()
        .for_each(|(y, row)| {
            for (x, out) in row.iter_mut().enumerate() {
                *out = taps
                    .iter()
                    .enumerate()
                    .map(|(k, t)| t * src.get_clamped(x as isize + k as isize - r, y as isize))
                    .sum();
            }
        });

    let mut dst = ImageF32::new(w, h);
    dst.data
        .par_chunks_mut(w.max(1))
        .enumerate()
        .for_each(|(y, row)| {
            for (x, out) in row.iter_mut().enumerate() {
                *out = taps
                    .iter()
                    .enumerate()
                    .map(|(k, t)| t * tmp.get_clamped(x as isize, y as isize + k as isize - r))
                    .sum();
            }
        });
    dst
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blur_preserves_constant_images() {
        let mut img = ImageF32::new(9, 7);
        img.data.fill(42.0);
        let out = gaussian_blur(&img, 1.5);
        assert!(out.data.iter().all(|v| (v - 42.0).abs() < 1e-4));
    }
}
