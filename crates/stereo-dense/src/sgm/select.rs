//! Winner-take-all selection with uniqueness, sub-pixel and left-right checks.

use rayon::prelude::*;

use super::aggregate::AggregatedCost;
use super::SgmParams;
use crate::disparity::DisparityField;

/// Parabola vertex offset around the minimum at `k`, within ±0.5.
fn subpixel_offset(s: &[u32], k: usize) -> f32 {
    if k == 0 || k + 1 >= s.len() {
        return 0.0;
    }
    let (a, b, c) = (s[k - 1] as i64, s[k] as i64, s[k + 1] as i64);
    let denom = (a + c - 2 * b).max(1);
    ((a - c) as f32 / (2 * denom) as f32).clamp(-0.5, 0.5)
}

fn is_unique(s: &[u32], best: usize, ratio: u32) -> bool {
    let min = s[best] as u64 * 100;
    s.iter().enumerate().all(|(k, &v)| {
        k.abs_diff(best) <= 1 || v as u64 * (100 - ratio as u64) >= min
    })
}

pub fn select_disparities(agg: &AggregatedCost, p: &SgmParams) -> DisparityField {
    let (w, h, nd) = (agg.width, agg.height, agg.num_disparities);
    let mut field = DisparityField::invalid(w as u32, h as u32, p.min_disparity, nd as u32);
    let invalid = field.invalid_value();
    let min_d = p.min_disparity as i64;

    field
        .data
        .par_chunks_mut(w)
        .enumerate()
        .for_each(|(y, row)| {
            let mut right_cost = vec![u32::MAX; w];
            let mut right_disp = vec![i64::MIN; w];
            let mut left_int = vec![i64::MIN; w];

            for x in 0..w {
                let s = agg.pixel(x, y);
                let mut best = 0;
                for k in 1..nd {
                    if s[k] < s[best] {
                        best = k;
                    }
                }
                for (k, &v) in s.iter().enumerate() {
                    let xr = x as i64 - (min_d + k as i64);
                    if (0..w as i64).contains(&xr) && v < right_cost[xr as usize] {
                        right_cost[xr as usize] = v;
                        right_disp[xr as usize] = min_d + k as i64;
                    }
                }
                let xr = x as i64 - (min_d + best as i64);
                if !(0..w as i64).contains(&xr) || !is_unique(s, best, p.uniqueness_ratio) {
                    continue;
                }
                row[x] = (min_d + best as i64) as f32 + subpixel_offset(s, best);
                left_int[x] = min_d + best as i64;
            }

            if p.disp12_max_diff < 0 {
                return;
            }
            for x in 0..w {
                if left_int[x] == i64::MIN {
                    continue;
                }
                let xr = x as i64 - left_int[x];
                if !(0..w as i64).contains(&xr) {
                    continue;
                }
                let other = right_disp[xr as usize];
                if other != i64::MIN && (other - left_int[x]).abs() > p.disp12_max_diff as i64 {
                    row[x] = invalid;
                }
            }
        });
    field
}
