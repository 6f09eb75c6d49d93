//! Keyed pixel noise.
//!
//! Offsets depend only on `(seed, view_key, point_idx)`, never on call order,
//! which keeps shuffled datasets identical to their unshuffled originals.

use crate::{Pt2, Real, Vec2};

/// Uniform per-axis noise in `[-amplitude, +amplitude]` pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct KeyedPixelNoise {
    pub seed: u64,
    pub amplitude: Real,
}

impl KeyedPixelNoise {
    pub fn new(seed: u64, amplitude: Real) -> Self {
        Self { seed, amplitude }
    }

    pub fn offset(&self, view_key: usize, point_idx: usize) -> Vec2 {
        let amp = self.amplitude.abs();
        if amp == 0.0 {
            return Vec2::zeros();
        }
        let key = self.seed
            ^ (view_key as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)
            ^ (point_idx as u64).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        let u = unit_interval(splitmix64(key));
        let v = unit_interval(splitmix64(key.rotate_left(17) ^ 0xD6E8_FEB8_6659_FD93));
        Vec2::new((2.0 * u - 1.0) * amp, (2.0 * v - 1.0) * amp)
    }

    pub fn apply(&self, view_key: usize, points: &[Pt2]) -> Vec<Pt2> {
        points
            .iter()
            .enumerate()
            .map(|(idx, p)| p + self.offset(view_key, idx))
            .collect()
    }
}

fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = x;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

// Top 53 bits mapped to [0, 1).
fn unit_interval(x: u64) -> Real {
    (x >> 11) as Real * (1.0 / (1u64 << 53) as Real)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets_depend_only_on_key() {
        let noise = KeyedPixelNoise::new(7, 0.3);
        assert_eq!(noise.offset(3, 11), noise.offset(3, 11));
        assert_ne!(noise.offset(3, 11), noise.offset(4, 11));
        for v in 0..20 {
            for p in 0..20 {
                let o = noise.offset(v, p);
                assert!(o.x.abs() <= 0.3 && o.y.abs() <= 0.3);
            }
        }
    }

    #[test]
    fn zero_amplitude_is_exact() {
        let noise = KeyedPixelNoise::new(1, 0.0);
        let pts = vec![Pt2::new(1.5, 2.5)];
        assert_eq!(noise.apply(0, &pts), pts);
    }
}
