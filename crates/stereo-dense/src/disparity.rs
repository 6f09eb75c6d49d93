use image::{Rgb, RgbImage};
use stereo_core::ImageSize;

/// Dense disparity map in pixels.
///
/// Rejected pixels hold [`DisparityField::invalid_value`], which is
/// `min_disparity - 1` and therefore below every accepted value.
#[derive(Debug, Clone, PartialEq)]
pub struct DisparityField {
    pub width: u32,
    pub height: u32,
    pub min_disparity: i32,
    pub num_disparities: u32,
    pub data: Vec<f32>,
}

impl DisparityField {
    /// Field with every pixel rejected.
    pub fn invalid(width: u32, height: u32, min_disparity: i32, num_disparities: u32) -> Self {
        Self {
            width,
            height,
            min_disparity,
            num_disparities,
            data: vec![(min_disparity - 1) as f32; width as usize * height as usize],
        }
    }

    pub fn size(&self) -> ImageSize {
        ImageSize::new(self.width, self.height)
    }

    pub fn invalid_value(&self) -> f32 {
        (self.min_disparity - 1) as f32
    }

    pub fn is_valid(&self, d: f32) -> bool {
        d.is_finite() && d > self.invalid_value()
    }

    pub fn get(&self, x: u32, y: u32) -> f32 {
        self.data[y as usize * self.width as usize + x as usize]
    }

    /// Accepted disparity at `(x, y)`.
    pub fn value(&self, x: u32, y: u32) -> Option<f32> {
        let d = self.get(x, y);
        self.is_valid(d).then_some(d)
    }

    pub fn valid_count(&self) -> usize {
        self.data.iter().filter(|&&d| self.is_valid(d)).count()
    }

    /// Jet colour map of the accepted values stretched to their min/max;
    /// rejected pixels are black.
    pub fn to_color_image(&self) -> RgbImage {
        let (lo, hi) = self
            .data
            .iter()
            .filter(|&&d| self.is_valid(d))
            .fold((f32::MAX, f32::MIN), |(lo, hi), &d| (lo.min(d), hi.max(d)));
        let span = (hi - lo).max(f32::EPSILON);
        RgbImage::from_fn(self.width, self.height, |x, y| match self.value(x, y) {
            Some(d) => jet((d - lo) / span),
            None => Rgb([0, 0, 0]),
        })
    }
}

fn jet(t: f32) -> Rgb<u8> {
    let t = t.clamp(0.0, 1.0);
    let channel = |offset: f32| {
        let v = (1.5 - (4.0 * t - offset).abs()).clamp(0.0, 1.0);
        (v * 255.0).round() as u8
    };
    Rgb([channel(3.0), channel(2.0), channel(1.0)])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinel_sits_below_the_range() {
        let mut f = DisparityField::invalid(3, 1, 16, 32);
        assert_eq!(f.invalid_value(), 15.0);
        f.data[1] = 15.6;
        assert_eq!(f.value(0, 0), None);
        assert_eq!(f.value(1, 0), Some(15.6));
        assert_eq!(f.valid_count(), 1);
    }

    #[test]
    fn colour_map_spans_blue_to_red() {
        let mut f = DisparityField::invalid(3, 1, 0, 16);
        f.data = vec![2.0, 10.0, -1.0];
        let img = f.to_color_image();
        let low = img.get_pixel(0, 0);
        let high = img.get_pixel(1, 0);
        assert!(low[2] > low[0]);
        assert!(high[0] > high[2]);
        assert_eq!(*img.get_pixel(2, 0), Rgb([0, 0, 0]));
    }
}
