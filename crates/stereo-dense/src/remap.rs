//! Undistort-rectify lookup tables and bilinear remapping.

use image::{ImageBuffer, Pixel};
use rayon::prelude::*;
use stereo_core::{ImageSize, Mat3, Mat34, PinholeCamera, Real, Vec2, Vec3};

use crate::DenseError;

/// Source coordinates for every destination pixel, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct RemapTable {
    pub width: u32,
    pub height: u32,
    pub map_x: Vec<f32>,
    pub map_y: Vec<f32>,
}

impl RemapTable {
    pub fn size(&self) -> ImageSize {
        ImageSize::new(self.width, self.height)
    }

    /// Source position sampled for destination pixel `(x, y)`.
    pub fn source(&self, x: u32, y: u32) -> (f32, f32) {
        let i = y as usize * self.width as usize + x as usize;
        (self.map_x[i], self.map_y[i])
    }
}

/// Map from rectified pixels (projection `p`, rotation `r`) back into the
/// distorted source image of `camera`.
pub fn init_rectify_map(
    camera: &PinholeCamera,
    r: &Mat3,
    p: &Mat34,
    size: ImageSize,
) -> Result<RemapTable, DenseError> {
    let kr: Mat3 = p.fixed_view::<3, 3>(0, 0).into_owned() * r;
    let inv = kr
        .try_inverse()
        .ok_or_else(|| DenseError::Rectification("singular rectified projection".into()))?;

    let (w, h) = (size.width as usize, size.height as usize);
    let mut map_x = vec![0.0f32; w * h];
    let mut map_y = vec![0.0f32; w * h];
    map_x
        .par_chunks_mut(w.max(1))
        .zip(map_y.par_chunks_mut(w.max(1)))
        .enumerate()
        .for_each(|(y, (row_x, row_y))| {
            for x in 0..w {
                let ray = inv * Vec3::new(x as Real, y as Real, 1.0);
                if ray.z <= 0.0 {
                    row_x[x] = f32::NAN;
                    row_y[x] = f32::NAN;
                    continue;
                }
                let src = camera.normalized_to_pixel(&Vec2::new(ray.x / ray.z, ray.y / ray.z));
                row_x[x] = src.x as f32;
                row_y[x] = src.y as f32;
            }
        });

    Ok(RemapTable {
        width: size.width,
        height: size.height,
        map_x,
        map_y,
    })
}

/// Bilinear remap; samples outside the source read as zero.
pub fn remap<P>(src: &ImageBuffer<P, Vec<u8>>, table: &RemapTable) -> ImageBuffer<P, Vec<u8>>
where
    P: Pixel<Subpixel = u8> + Send + Sync,
{
    let cn = P::CHANNEL_COUNT as usize;
    let (sw, sh) = (src.width() as isize, src.height() as isize);
    let raw: &[u8] = src.as_raw();
    let mut dst: ImageBuffer<P, Vec<u8>> = ImageBuffer::new(table.width, table.height);
    let w = table.width as usize;

    let buf: &mut [u8] = &mut dst;
    buf.par_chunks_mut((w * cn).max(1)).enumerate().for_each(|(y, row)| {
        let mut acc = vec![0.0f32; cn];
        for x in 0..w {
            let i = y * w + x;
            let (sx, sy) = (table.map_x[i], table.map_y[i]);
            if !sx.is_finite() || !sy.is_finite() {
                continue;
            }
            let (x0, y0) = (sx.floor(), sy.floor());
            let (fx, fy) = (sx - x0, sy - y0);
            let (ix, iy) = (x0 as isize, y0 as isize);
            if ix < -1 || iy < -1 || ix >= sw || iy >= sh {
                continue;
            }
            acc.iter_mut().for_each(|a| *a = 0.0);
            let taps = [
                (ix, iy, (1.0 - fx) * (1.0 - fy)),
                (ix + 1, iy, fx * (1.0 - fy)),
                (ix, iy + 1, (1.0 - fx) * fy),
                (ix + 1, iy + 1, fx * fy),
            ];
            for (tx, ty, wgt) in taps {
                if tx < 0 || ty < 0 || tx >= sw || ty >= sh || wgt == 0.0 {
                    continue;
                }
                let base = (ty as usize * sw as usize + tx as usize) * cn;
                for (a, v) in acc.iter_mut().zip(&raw[base..base + cn]) {
                    *a += wgt * *v as f32;
                }
            }
            for (out, a) in row[x * cn..(x + 1) * cn].iter_mut().zip(&acc) {
                *out = a.round().clamp(0.0, 255.0) as u8;
            }
        }
    });
    dst
}
