//! Matching cost volume.
//!
//! The per-pixel cost is the Birchfield-Tomasi dissimilarity of the clipped
//! horizontal Sobel response plus a quarter of the same measure on raw
//! intensities. Block costs sum the pixel cost over a square window.

use image::GrayImage;
use rayon::prelude::*;

use super::SgmParams;

/// Upper bound of the per-pixel cost.
pub const PIXEL_COST_MAX: u32 = (4 * 63 + 2 * 255 / 4 + 1) / 2;

/// Dense `width × height × num_disparities` cost volume, disparity fastest.
#[derive(Debug, Clone)]
pub struct CostVolume {
    pub width: usize,
    pub height: usize,
    pub min_disparity: i32,
    pub num_disparities: usize,
    pub data: Vec<u16>,
}

impl CostVolume {
    pub fn pixel(&self, x: usize, y: usize) -> &[u16] {
        let i = (y * self.width + x) * self.num_disparities;
        &self.data[i..i + self.num_disparities]
    }

    /// Saturated cost assigned to impossible candidates.
    pub fn max_cost(&self) -> u16 {
        u16::MAX / 2
    }
}

/// Horizontal Sobel response clipped to `[-cap, cap]`.
pub fn prefilter_sobel(img: &GrayImage, cap: i32) -> Vec<i32> {
    let (w, h) = (img.width() as usize, img.height() as usize);
    let raw = img.as_raw();
    let at = |x: isize, y: isize| -> i32 {
        let x = x.clamp(0, w as isize - 1) as usize;
        let y = y.clamp(0, h as isize - 1) as usize;
        raw[y * w + x] as i32
    };
    let mut out = vec![0i32; w * h];
    out.par_chunks_mut(w).enumerate().for_each(|(y, row)| {
        let y = y as isize;
        for (x, v) in row.iter_mut().enumerate() {
            let x = x as isize;
            let d = 2 * (at(x + 1, y) - at(x - 1, y)) + (at(x + 1, y - 1) - at(x - 1, y - 1))
                + (at(x + 1, y + 1) - at(x - 1, y + 1));
            *v = d.clamp(-cap, cap);
        }
    });
    out
}

/// Doubled values and the doubled min/max over the half-pixel interval.
struct Interval {
    centre: Vec<i32>,
    lo: Vec<i32>,
    hi: Vec<i32>,
}

fn intervals(row: &[i32]) -> Interval {
    let n = row.len();
    let mut out = Interval {
        centre: Vec::with_capacity(n),
        lo: Vec::with_capacity(n),
        hi: Vec::with_capacity(n),
    };
    for x in 0..n {
        let c = 2 * row[x];
        let left = row[x] + row[x.saturating_sub(1)];
        let right = row[x] + row[(x + 1).min(n - 1)];
        out.centre.push(c);
        out.lo.push(c.min(left).min(right));
        out.hi.push(c.max(left).max(right));
    }
    out
}

#[inline]
fn birchfield_tomasi(l: &Interval, xl: usize, r: &Interval, xr: usize) -> i32 {
    let d1 = 0.max(l.centre[xl] - r.hi[xr]).max(r.lo[xr] - l.centre[xl]);
    let d2 = 0.max(r.centre[xr] - l.hi[xl]).max(l.lo[xl] - r.centre[xr]);
    d1.min(d2)
}

fn pixel_cost_volume(left: &GrayImage, right: &GrayImage, p: &SgmParams) -> CostVolume {
    let (w, h) = (left.width() as usize, left.height() as usize);
    let nd = p.num_disparities as usize;
    let cap = p.pre_filter_cap as i32;
    let sl = prefilter_sobel(left, cap);
    let sr = prefilter_sobel(right, cap);
    let (il, ir) = (left.as_raw(), right.as_raw());

    let mut data = vec![PIXEL_COST_MAX as u16; w * h * nd];
    data.par_chunks_mut(w * nd).enumerate().for_each(|(y, row)| {
        let span = y * w..(y + 1) * w;
        let grad_l = intervals(&sl[span.clone()]);
        let grad_r = intervals(&sr[span.clone()]);
        let to_i32 = |s: &[u8]| s.iter().map(|&v| v as i32).collect::<Vec<_>>();
        let int_l = intervals(&to_i32(&il[span.clone()]));
        let int_r = intervals(&to_i32(&ir[span]));
        for x in 0..w {
            let costs = &mut row[x * nd..(x + 1) * nd];
            for (k, c) in costs.iter_mut().enumerate() {
                let xr = x as i64 - (p.min_disparity as i64 + k as i64);
                if xr < 0 || xr >= w as i64 {
                    continue;
                }
                let xr = xr as usize;
                let grad = birchfield_tomasi(&grad_l, x, &grad_r, xr);
                let int = birchfield_tomasi(&int_l, x, &int_r, xr);
                *c = ((grad + int / 4 + 1) / 2) as u16;
            }
        }
    });
    CostVolume {
        width: w,
        height: h,
        min_disparity: p.min_disparity,
        num_disparities: nd,
        data,
    }
}

/// Block matching costs; candidates whose match leaves the right image get
/// [`CostVolume::max_cost`].
pub fn block_cost_volume(left: &GrayImage, right: &GrayImage, p: &SgmParams) -> CostVolume {
    let pixel = pixel_cost_volume(left, right, p);
    let (w, h, nd) = (pixel.width, pixel.height, pixel.num_disparities);
    let r = (p.block_size / 2) as isize;
    let clamp_x = |x: isize| x.clamp(0, w as isize - 1) as usize;
    let clamp_y = |y: isize| y.clamp(0, h as isize - 1) as usize;

    let mut horizontal = vec![0u32; w * h * nd];
    horizontal
        .par_chunks_mut(w * nd)
        .enumerate()
        .for_each(|(y, row)| {
            for x in 0..w {
                let out = &mut row[x * nd..(x + 1) * nd];
                for dx in -r..=r {
                    let src = pixel.pixel(clamp_x(x as isize + dx), y);
                    out.iter_mut().zip(src).for_each(|(o, &c)| *o += c as u32);
                }
            }
        });

    let max = u16::MAX / 2;
    let mut data = vec![0u16; w * h * nd];
    data.par_chunks_mut(w * nd).enumerate().for_each(|(y, row)| {
        let mut acc = vec![0u32; nd];
        for x in 0..w {
            acc.iter_mut().for_each(|a| *a = 0);
            for dy in -r..=r {
                let base = (clamp_y(y as isize + dy) * w + x) * nd;
                acc.iter_mut()
                    .zip(&horizontal[base..base + nd])
                    .for_each(|(a, &c)| *a += c);
            }
            let out = &mut row[x * nd..(x + 1) * nd];
            for (k, (o, a)) in out.iter_mut().zip(&acc).enumerate() {
                let xr = x as i64 - (p.min_disparity as i64 + k as i64);
                *o = if xr < 0 || xr >= w as i64 {
                    max
                } else {
                    (*a).min(max as u32) as u16
                };
            }
        }
    });

    CostVolume {
        width: w,
        height: h,
        min_disparity: p.min_disparity,
        num_disparities: nd,
        data,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn sobel_is_clipped() {
        let img = GrayImage::from_fn(8, 3, |x, _| Luma([if x < 4 { 0 } else { 255 }]));
        let s = prefilter_sobel(&img, 31);
        assert_eq!(s[8 + 3], 31);
        assert_eq!(s[8], 0);
    }

    #[test]
    fn matching_candidate_has_zero_pixel_cost() {
        let left = GrayImage::from_fn(32, 4, |x, y| Luma([((x * 37 + y * 11) % 251) as u8]));
        let right = GrayImage::from_fn(32, 4, |x, y| Luma([(((x + 3) * 37 + y * 11) % 251) as u8]));
        let p = SgmParams {
            num_disparities: 16,
            ..SgmParams::default()
        };
        let vol = pixel_cost_volume(&left, &right, &p);
        assert_eq!(vol.pixel(10, 2)[3], 0);
        assert!(vol.pixel(10, 2)[5] > 0);
    }
}
