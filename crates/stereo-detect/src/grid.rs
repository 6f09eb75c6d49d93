//! Canonical ordering of grid-labelled corners.
//!
//! The chessboard localiser labels every corner with integer lattice
//! coordinates, but the origin and axis assignment follow whatever corner it
//! happened to start from. This module turns those labels into the fixed
//! row-major order of the calibration target.

use std::collections::HashMap;

use stereo_core::{Pt2, Real, Vec2};

/// Lattice as `grid[a][b]`, first axis along the labelled `i`.
type Lattice = Vec<Vec<Pt2>>;

/// Order `labelled` corners `((i, j), position)` as a `cols × rows` board.
///
/// Returns `None` unless the labels form a fully populated box of exactly
/// `cols × rows` (either orientation) with no duplicates. The first output
/// axis runs along `cols` and points towards image +x, the second completes
/// a right-handed frame in image coordinates.
pub fn order_labelled(
    labelled: &[((i64, i64), Pt2)],
    cols: usize,
    rows: usize,
) -> Option<Vec<Pt2>> {
    if cols < 2 || rows < 2 || labelled.len() != cols * rows {
        return None;
    }
    let lattice = to_lattice(labelled, cols, rows)?;
    Some(canonical_order(lattice, cols, rows))
}

fn to_lattice(labelled: &[((i64, i64), Pt2)], cols: usize, rows: usize) -> Option<Lattice> {
    let min_i = labelled.iter().map(|(k, _)| k.0).min()?;
    let max_i = labelled.iter().map(|(k, _)| k.0).max()?;
    let min_j = labelled.iter().map(|(k, _)| k.1).min()?;
    let max_j = labelled.iter().map(|(k, _)| k.1).max()?;
    let ni = usize::try_from(max_i - min_i + 1).ok()?;
    let nj = usize::try_from(max_j - min_j + 1).ok()?;
    let shape_ok = (ni == cols && nj == rows) || (ni == rows && nj == cols);
    if !shape_ok {
        return None;
    }

    let mut cells: HashMap<(usize, usize), Pt2> = HashMap::with_capacity(labelled.len());
    for &((i, j), p) in labelled {
        let key = ((i - min_i) as usize, (j - min_j) as usize);
        if cells.insert(key, p).is_some() {
            return None;
        }
    }
    if cells.len() != ni * nj {
        return None;
    }
    let mut lattice = vec![vec![Pt2::origin(); nj]; ni];
    for ((a, b), p) in cells {
        lattice[a][b] = p;
    }
    Some(lattice)
}

fn transpose(l: &Lattice) -> Lattice {
    let (ni, nj) = (l.len(), l[0].len());
    (0..nj).map(|b| (0..ni).map(|a| l[a][b]).collect()).collect()
}

/// Mean step along the first (`axis = 0`) or second lattice axis.
fn mean_step(l: &Lattice, axis: usize) -> Vec2 {
    let (ni, nj) = (l.len(), l[0].len());
    let mut sum = Vec2::zeros();
    let mut n = 0usize;
    for a in 0..ni {
        for b in 0..nj {
            let next = if axis == 0 {
                (a + 1 < ni).then(|| l[a + 1][b])
            } else {
                (b + 1 < nj).then(|| l[a][b + 1])
            };
            if let Some(q) = next {
                sum += q - l[a][b];
                n += 1;
            }
        }
    }
    sum / n.max(1) as Real
}

fn canonical_order(mut l: Lattice, cols: usize, rows: usize) -> Vec<Pt2> {
    let ni = l.len();
    let swap = if cols != rows {
        ni != cols
    } else {
        let si = mean_step(&l, 0);
        let sj = mean_step(&l, 1);
        si.y.abs() / si.norm().max(1e-12) > sj.y.abs() / sj.norm().max(1e-12)
    };
    if swap {
        l = transpose(&l);
    }

    let di = mean_step(&l, 0);
    let flip_i = if di.x.abs() >= di.y.abs() {
        di.x < 0.0
    } else {
        di.y < 0.0
    };
    if flip_i {
        l.reverse();
    }

    let di = mean_step(&l, 0);
    let dj = mean_step(&l, 1);
    if di.x * dj.y - di.y * dj.x < 0.0 {
        l.iter_mut().for_each(|col| col.reverse());
    }

    let mut out = Vec::with_capacity(cols * rows);
    for j in 0..rows {
        for col in l.iter().take(cols) {
            out.push(col[j]);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Board corners labelled the way a localiser starting at an arbitrary
    /// corner would: `label(i, j)` gives the reported coordinates.
    fn labelled_board(
        cols: usize,
        rows: usize,
        angle: Real,
        label: impl Fn(i64, i64) -> (i64, i64),
    ) -> (Vec<((i64, i64), Pt2)>, Vec<Pt2>) {
        let (c, s) = (angle.cos(), angle.sin());
        let mut labelled = Vec::new();
        let mut image_order = Vec::new();
        for j in 0..rows {
            for i in 0..cols {
                let (x, y) = (i as Real * 30.0, j as Real * 30.0);
                let p = Pt2::new(200.0 + c * x - s * y, 150.0 + s * x + c * y);
                labelled.push((label(i as i64, j as i64), p));
                image_order.push(p);
            }
        }
        (labelled, image_order)
    }

    #[test]
    fn transposed_and_shifted_labels_are_reordered() {
        let (mut labelled, expected) = labelled_board(5, 4, 0.1, |i, j| (j + 3, -i));
        labelled.reverse();
        labelled.swap(3, 11);
        let got = order_labelled(&labelled, 5, 4).unwrap();
        for (g, e) in got.iter().zip(&expected) {
            assert!((g - e).norm() < 1e-9);
        }
    }

    #[test]
    fn upside_down_board_is_reordered() {
        let (labelled, _) = labelled_board(5, 4, std::f64::consts::PI, |i, j| (i, j));
        let got = order_labelled(&labelled, 5, 4).unwrap();
        let d = got[1] - got[0];
        assert!(d.x > 0.0);
        let dj = got[5] - got[0];
        assert!(d.x * dj.y - d.y * dj.x > 0.0);
    }

    #[test]
    fn incomplete_or_oversized_grids_are_rejected() {
        let (mut labelled, _) = labelled_board(5, 4, 0.0, |i, j| (i, j));
        labelled.remove(7);
        assert!(order_labelled(&labelled, 5, 4).is_none());

        let (labelled, _) = labelled_board(6, 4, 0.0, |i, j| (i, j));
        assert!(order_labelled(&labelled, 5, 4).is_none());
    }

    #[test]
    fn duplicate_labels_are_rejected() {
        let (mut labelled, _) = labelled_board(5, 4, 0.0, |i, j| (i, j));
        // Right count and extent, but one cell reported twice.
        labelled[6].0 = labelled[5].0;
        assert!(order_labelled(&labelled, 5, 4).is_none());
    }
}
