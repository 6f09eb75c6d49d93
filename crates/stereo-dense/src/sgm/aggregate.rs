//! Path-wise cost aggregation.
//!
//! Along each direction `r`:
//!
//! ```text
//! L(p, d) = C(p, d) + min(L(p-r, d), L(p-r, d±1) + P1, min_k L(p-r, k) + P2) - min_k L(p-r, k)
//! ```
//!
//! Horizontal paths are independent per row. Vertical and diagonal paths
//! sweep rows in order and update all pixels of a row in parallel.

use rayon::prelude::*;

use super::cost::CostVolume;
use super::SgmPaths;

/// Sum of the path costs over all directions, disparity fastest.
#[derive(Debug, Clone)]
pub struct AggregatedCost {
    pub width: usize,
    pub height: usize,
    pub min_disparity: i32,
    pub num_disparities: usize,
    pub data: Vec<u32>,
}

impl AggregatedCost {
    pub fn pixel(&self, x: usize, y: usize) -> &[u32] {
        let i = (y * self.width + x) * self.num_disparities;
        &self.data[i..i + self.num_disparities]
    }
}

#[inline]
fn path_step(cost: &[u16], prev: &[u32], p1: u32, p2: u32, out: &mut [u32]) {
    let min_prev = prev.iter().copied().min().unwrap_or(0);
    let n = cost.len();
    for d in 0..n {
        let mut best = prev[d];
        if d > 0 {
            best = best.min(prev[d - 1] + p1);
        }
        if d + 1 < n {
            best = best.min(prev[d + 1] + p1);
        }
        best = best.min(min_prev + p2);
        out[d] = cost[d] as u32 + best - min_prev;
    }
}

fn start_path(cost: &[u16], out: &mut [u32]) {
    out.iter_mut().zip(cost).for_each(|(o, &c)| *o = c as u32);
}

fn accumulate(sum: &mut [u32], path: &[u32]) {
    sum.iter_mut().zip(path).for_each(|(s, &l)| *s += l);
}

fn horizontal_paths(vol: &CostVolume, p1: u32, p2: u32, sum: &mut [u32]) {
    let (w, nd) = (vol.width, vol.num_disparities);
    sum.par_chunks_mut(w * nd).enumerate().for_each(|(y, row)| {
        let mut prev = vec![0u32; nd];
        let mut cur = vec![0u32; nd];
        for reverse in [false, true] {
            for i in 0..w {
                let x = if reverse { w - 1 - i } else { i };
                let c = vol.pixel(x, y);
                if i == 0 {
                    start_path(c, &mut cur);
                } else {
                    path_step(c, &prev, p1, p2, &mut cur);
                }
                accumulate(&mut row[x * nd..(x + 1) * nd], &cur);
                std::mem::swap(&mut prev, &mut cur);
            }
        }
    });
}

/// One vertical or diagonal sweep; `dx` is the horizontal step of the
/// path and `down` its vertical direction.
fn sweep(vol: &CostVolume, dx: isize, down: bool, p1: u32, p2: u32, sum: &mut [u32]) {
    let (w, h, nd) = (vol.width, vol.height, vol.num_disparities);
    let mut prev = vec![0u32; w * nd];
    let mut cur = vec![0u32; w * nd];
    let rows: Vec<usize> = if down {
        (0..h).collect()
    } else {
        (0..h).rev().collect()
    };

    for (i, &y) in rows.iter().enumerate() {
        cur.par_chunks_mut(nd).enumerate().for_each(|(x, out)| {
            let c = vol.pixel(x, y);
            let px = x as isize - dx;
            if i == 0 || px < 0 || px >= w as isize {
                start_path(c, out);
            } else {
                let px = px as usize;
                path_step(c, &prev[px * nd..(px + 1) * nd], p1, p2, out);
            }
        });
        sum[y * w * nd..(y + 1) * w * nd]
            .par_chunks_mut(nd)
            .zip(cur.par_chunks(nd))
            .for_each(|(s, l)| accumulate(s, l));
        std::mem::swap(&mut prev, &mut cur);
    }
}

pub fn aggregate(vol: &CostVolume, p1: u32, p2: u32, paths: SgmPaths) -> AggregatedCost {
    let mut sum = vec![0u32; vol.data.len()];
    horizontal_paths(vol, p1, p2, &mut sum);
    let steps: &[isize] = match paths {
        SgmPaths::Four => &[0],
        SgmPaths::Eight => &[-1, 0, 1],
    };
    for &dx in steps {
        sweep(vol, dx, true, p1, p2, &mut sum);
        sweep(vol, dx, false, p1, p2, &mut sum);
    }
    AggregatedCost {
        width: vol.width,
        height: vol.height,
        min_disparity: vol.min_disparity,
        num_disparities: vol.num_disparities,
        data: sum,
    }
}
