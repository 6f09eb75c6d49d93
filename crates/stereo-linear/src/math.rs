//! Hartley normalization shared by the DLT solvers.

use stereo_core::{Mat3, Pt2};

/// Center points at the origin and scale the mean distance to `√2`.
///
/// Returns the normalized points and `T` such that `p_norm = T * p_homogeneous`,
/// or `None` if the input is empty or all points coincide.
pub fn normalize_points_2d(points: &[Pt2]) -> Option<(Vec<Pt2>, Mat3)> {
    if points.is_empty() {
        return None;
    }

    let n = points.len() as f64;
    let (sx, sy) = points
        .iter()
        .fold((0.0, 0.0), |(ax, ay), p| (ax + p.x, ay + p.y));
    let (cx, cy) = (sx / n, sy / n);

    let mean_dist = points
        .iter()
        .map(|p| ((p.x - cx).powi(2) + (p.y - cy).powi(2)).sqrt())
        .sum::<f64>()
        / n;
    if mean_dist <= f64::EPSILON {
        return None;
    }

    let scale = std::f64::consts::SQRT_2 / mean_dist;
    let t = Mat3::new(scale, 0.0, -scale * cx, 0.0, scale, -scale * cy, 0.0, 0.0, 1.0);
    let norm = points
        .iter()
        .map(|p| Pt2::new((p.x - cx) * scale, (p.y - cy) * scale))
        .collect();
    Some((norm, t))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalized_points_have_unit_conditioning() {
        let pts = vec![
            Pt2::new(100.0, 200.0),
            Pt2::new(150.0, 250.0),
            Pt2::new(120.0, 220.0),
            Pt2::new(90.0, 260.0),
        ];
        let (norm, t) = normalize_points_2d(&pts).unwrap();
        let cx: f64 = norm.iter().map(|p| p.x).sum::<f64>() / 4.0;
        let mean: f64 = norm.iter().map(|p| p.coords.norm()).sum::<f64>() / 4.0;
        assert!(cx.abs() < 1e-12);
        assert!((mean - std::f64::consts::SQRT_2).abs() < 1e-12);
        let mapped = t * stereo_core::to_homogeneous(&pts[1]);
        assert!((mapped.x - norm[1].x).abs() < 1e-12);
    }

    #[test]
    fn coincident_points_cannot_be_normalized() {
        assert!(normalize_points_2d(&[Pt2::new(1.0, 1.0); 3]).is_none());
        assert!(normalize_points_2d(&[]).is_none());
    }
}
