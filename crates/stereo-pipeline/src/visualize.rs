//! Diagnostic images: corner overlays and rectified pairs.

use std::fs;
use std::path::PathBuf;

use image::{imageops, GrayImage, Rgb, RgbImage};
use imageproc::drawing::{draw_cross_mut, draw_hollow_circle_mut, draw_line_segment_mut};
use log::warn;
use stereo_core::Pt2;

use crate::calibration::{DetectionObserver, PairDetection};

const GUIDE: Rgb<u8> = Rgb([0, 255, 0]);
const CORNER: Rgb<u8> = Rgb([255, 0, 0]);
const ORIGIN: Rgb<u8> = Rgb([0, 0, 255]);
const PATH: Rgb<u8> = Rgb([255, 200, 0]);

/// Both images next to each other with 9 horizontal guide lines.
///
/// Rectified pairs should show corresponding features on the same line.
pub fn side_by_side_with_guides(left: &RgbImage, right: &RgbImage) -> RgbImage {
    let mut out = side_by_side(left, right);
    let (width, height) = out.dimensions();
    for i in 1..10 {
        let y = (height * i / 10) as f32;
        draw_line_segment_mut(&mut out, (0.0, y), (width as f32 - 1.0, y), GUIDE);
    }
    out
}

/// Grey image with the detected corners drawn in reading order.
///
/// The first corner is highlighted so the canonical order can be checked.
pub fn draw_corners(gray: &GrayImage, corners: Option<&[Pt2]>) -> RgbImage {
    let mut out = RgbImage::from_fn(gray.width(), gray.height(), |x, y| {
        let v = gray.get_pixel(x, y)[0];
        Rgb([v, v, v])
    });
    let Some(corners) = corners else {
        return out;
    };
    for pair in corners.windows(2) {
        draw_line_segment_mut(
            &mut out,
            (pair[0].x as f32, pair[0].y as f32),
            (pair[1].x as f32, pair[1].y as f32),
            PATH,
        );
    }
    for (i, c) in corners.iter().enumerate() {
        let (x, y) = (c.x.round() as i32, c.y.round() as i32);
        if i == 0 {
            draw_hollow_circle_mut(&mut out, (x, y), 6, ORIGIN);
        }
        draw_cross_mut(&mut out, CORNER, x, y);
    }
    out
}

/// Writes one overlay PNG per detected pair into a directory.
pub struct CornerOverlayWriter {
    dir: PathBuf,
}

impl CornerOverlayWriter {
    pub fn new(dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn path_for(&self, index: usize) -> PathBuf {
        self.dir.join(format!("pair_{index:03}.png"))
    }
}

impl DetectionObserver for CornerOverlayWriter {
    fn on_pair(&self, left: &GrayImage, right: &GrayImage, detection: &PairDetection) {
        let overlay = side_by_side(
            &draw_corners(left, detection.left.corners()),
            &draw_corners(right, detection.right.corners()),
        );
        let path = self.path_for(detection.index);
        if let Err(err) = overlay.save(&path) {
            warn!("could not write {}: {err}", path.display());
        }
    }
}

fn side_by_side(left: &RgbImage, right: &RgbImage) -> RgbImage {
    let mut out = RgbImage::new(left.width() + right.width(), left.height().max(right.height()));
    imageops::replace(&mut out, left, 0, 0);
    imageops::replace(&mut out, right, i64::from(left.width()), 0);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use stereo_detect::CornerObservation;

    #[test]
    fn guides_cross_both_images() {
        let left = RgbImage::from_pixel(20, 30, Rgb([10, 10, 10]));
        let right = RgbImage::from_pixel(20, 30, Rgb([200, 200, 200]));
        let out = side_by_side_with_guides(&left, &right);
        assert_eq!(out.dimensions(), (40, 30));
        assert_eq!(*out.get_pixel(5, 3), GUIDE);
        assert_eq!(*out.get_pixel(35, 27), GUIDE);
        assert_eq!(*out.get_pixel(5, 4), Rgb([10, 10, 10]));
        assert_eq!(*out.get_pixel(35, 4), Rgb([200, 200, 200]));
    }

    #[test]
    fn missing_corners_leave_image_grey() {
        let gray = GrayImage::from_pixel(8, 8, image::Luma([77]));
        let out = draw_corners(&gray, None);
        assert!(out.pixels().all(|p| *p == Rgb([77, 77, 77])));
        let marked = draw_corners(&gray, Some(&[Pt2::new(4.0, 4.0)]));
        assert_eq!(*marked.get_pixel(4, 4), CORNER);
    }

    #[test]
    fn overlay_writer_names_files_by_pair() {
        let dir = tempfile::tempdir().unwrap();
        let writer = CornerOverlayWriter::new(dir.path().join("overlays")).unwrap();
        let gray = GrayImage::new(16, 12);
        let detection = PairDetection {
            index: 7,
            left_path: "l.png".into(),
            right_path: "r.png".into(),
            left: CornerObservation::NotFound,
            right: CornerObservation::Found(vec![Pt2::new(3.0, 3.0)]),
        };
        writer.on_pair(&gray, &gray, &detection);
        let written = image::open(writer.path_for(7)).unwrap();
        assert_eq!((written.width(), written.height()), (32, 12));
    }
}
