//! Removal of small disconnected disparity blobs.

use crate::disparity::DisparityField;

/// Invalidate 4-connected regions of at most `max_size` pixels, where
/// neighbours belong to one region when their disparities differ by at
/// most `max_diff`. Returns the number of invalidated pixels.
pub fn filter_speckles(field: &mut DisparityField, max_size: usize, max_diff: f32) -> usize {
    let (w, h) = (field.width as usize, field.height as usize);
    let invalid = field.invalid_value();
    let mut visited = vec![false; w * h];
    let mut region = Vec::new();
    let mut stack = Vec::new();
    let mut removed = 0;

    for start in 0..w * h {
        if visited[start] || !field.is_valid(field.data[start]) {
            continue;
        }
        region.clear();
        stack.push(start);
        visited[start] = true;
        while let Some(i) = stack.pop() {
            region.push(i);
            let d = field.data[i];
            let (x, y) = (i % w, i / w);
            let neighbours = [
                (x > 0).then(|| i - 1),
                (x + 1 < w).then(|| i + 1),
                (y > 0).then(|| i - w),
                (y + 1 < h).then(|| i + w),
            ];
            for n in neighbours.into_iter().flatten() {
                if !visited[n] && field.is_valid(field.data[n]) && (field.data[n] - d).abs() <= max_diff {
                    visited[n] = true;
                    stack.push(n);
                }
            }
        }
        if region.len() <= max_size {
            for &i in &region {
                field.data[i] = invalid;
            }
            removed += region.len();
        }
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_islands_are_removed_and_large_regions_kept() {
        let mut f = DisparityField::invalid(10, 10, 0, 16);
        f.data.fill(5.0);
        // 2x2 island with a disparity jump.
        for (x, y) in [(2, 2), (3, 2), (2, 3), (3, 3)] {
            f.data[y * 10 + x] = 12.0;
        }
        let removed = filter_speckles(&mut f, 4, 1.0);
        assert_eq!(removed, 4);
        assert_eq!(f.value(2, 2), None);
        assert_eq!(f.value(0, 0), Some(5.0));
        assert_eq!(f.valid_count(), 96);
    }

    #[test]
    fn gentle_slopes_stay_connected() {
        let mut f = DisparityField::invalid(8, 1, 0, 16);
        f.data = (0..8).map(|x| x as f32 * 0.9).collect();
        assert_eq!(filter_speckles(&mut f, 5, 1.0), 0);
    }
}
