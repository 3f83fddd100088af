//! Data Augmentation Module
//!
//! Random flips, small rotations and contrast changes applied to training
//! images only. Validation and serving images are never augmented.

use image::{DynamicImage, GenericImageView, ImageBuffer, Rgb, RgbImage};
use rand::Rng;
use rand_chacha::ChaCha8Rng;

/// Configuration for data augmentation
#[derive(Clone, Debug)]
pub struct AugmentationConfig {
    /// Probability of a horizontal flip
    pub horizontal_flip_prob: f32,
    /// Probability of a vertical flip
    pub vertical_flip_prob: f32,
    /// Maximum rotation angle in degrees (applies ±rotation_degrees)
    pub rotation_degrees: f32,
    /// Probability of applying rotation
    pub rotation_prob: f32,
    /// Contrast adjustment range (1.0 ± contrast_delta)
    pub contrast_delta: f32,
    /// Probability of applying contrast adjustment
    pub contrast_prob: f32,
}

impl Default for AugmentationConfig {
    fn default() -> Self {
        Self {
            horizontal_flip_prob: 0.5,
            vertical_flip_prob: 0.5,
            rotation_degrees: 20.0,
            rotation_prob: 0.5,
            contrast_delta: 0.2,
            contrast_prob: 0.5,
        }
    }
}

impl AugmentationConfig {
    /// Disable every augmentation
    pub fn none() -> Self {
        Self {
            horizontal_flip_prob: 0.0,
            vertical_flip_prob: 0.0,
            rotation_degrees: 0.0,
            rotation_prob: 0.0,
            contrast_delta: 0.0,
            contrast_prob: 0.0,
        }
    }
}

/// Image augmenter for training
#[derive(Clone, Debug)]
pub struct Augmenter {
    config: AugmentationConfig,
}

impl Augmenter {
    pub fn new(config: AugmentationConfig) -> Self {
        Self { config }
    }

    pub fn with_defaults() -> Self {
        Self::new(AugmentationConfig::default())
    }

    pub fn config(&self) -> &AugmentationConfig {
        &self.config
    }

    /// Apply all configured augmentations randomly to an image
    ///
    /// Dimensions are preserved.
    pub fn augment(&self, img: DynamicImage, rng: &mut ChaCha8Rng) -> DynamicImage {
        let mut result = img;

        if rng.gen::<f32>() < self.config.horizontal_flip_prob {
            result = result.fliph();
        }

        if rng.gen::<f32>() < self.config.vertical_flip_prob {
            result = result.flipv();
        }

        if self.config.rotation_prob > 0.0 && rng.gen::<f32>() < self.config.rotation_prob {
            let angle = rng.gen_range(-self.config.rotation_degrees..=self.config.rotation_degrees);
            result = rotate(&result, angle);
        }

        if self.config.contrast_prob > 0.0 && rng.gen::<f32>() < self.config.contrast_prob {
            let factor =
                1.0 + rng.gen_range(-self.config.contrast_delta..=self.config.contrast_delta);
            result = adjust_contrast(&result, factor);
        }

        result
    }
}

/// Rotate around the image center; uncovered corners become black
pub fn rotate(img: &DynamicImage, angle_degrees: f32) -> DynamicImage {
    if angle_degrees.abs() < 0.1 {
        return img.clone();
    }

    let angle_rad = angle_degrees.to_radians();
    let (width, height) = img.dimensions();
    let rgb = img.to_rgb8();

    let cx = width as f32 / 2.0;
    let cy = height as f32 / 2.0;
    let (sin_a, cos_a) = angle_rad.sin_cos();

    let mut output = ImageBuffer::new(width, height);

    for y in 0..height {
        for x in 0..width {
            let dx = x as f32 - cx;
            let dy = y as f32 - cy;

            let src_x = cx + dx * cos_a + dy * sin_a;
            let src_y = cy - dx * sin_a + dy * cos_a;

            output.put_pixel(x, y, bilinear_sample(&rgb, src_x, src_y));
        }
    }

    DynamicImage::ImageRgb8(output)
}

fn bilinear_sample(img: &RgbImage, x: f32, y: f32) -> Rgb<u8> {
    let (width, height) = img.dimensions();

    if x < 0.0 || y < 0.0 || x > (width - 1) as f32 || y > (height - 1) as f32 {
        return Rgb([0, 0, 0]);
    }

    let x0 = x.floor() as u32;
    let y0 = y.floor() as u32;
    let x1 = (x0 + 1).min(width - 1);
    let y1 = (y0 + 1).min(height - 1);

    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let p00 = img.get_pixel(x0, y0);
    let p10 = img.get_pixel(x1, y0);
    let p01 = img.get_pixel(x0, y1);
    let p11 = img.get_pixel(x1, y1);

    let mut result = [0u8; 3];
    for (c, out) in result.iter_mut().enumerate() {
        let v = p00[c] as f32 * (1.0 - fx) * (1.0 - fy)
            + p10[c] as f32 * fx * (1.0 - fy)
            + p01[c] as f32 * (1.0 - fx) * fy
            + p11[c] as f32 * fx * fy;
        *out = v.round().clamp(0.0, 255.0) as u8;
    }

    Rgb(result)
}

/// Scale every channel around the mean luminance
pub fn adjust_contrast(img: &DynamicImage, factor: f32) -> DynamicImage {
    let rgb = img.to_rgb8();
    let (width, height) = rgb.dimensions();

    let count = (width as f64 * height as f64).max(1.0);
    let sum: f64 = rgb
        .pixels()
        .map(|p| 0.299 * p[0] as f64 + 0.587 * p[1] as f64 + 0.114 * p[2] as f64)
        .sum();
    let mean = (sum / count) as f32;

    let mut output = ImageBuffer::new(width, height);
    for (x, y, pixel) in rgb.enumerate_pixels() {
        let scale = |v: u8| (mean + factor * (v as f32 - mean)).round().clamp(0.0, 255.0) as u8;
        output.put_pixel(x, y, Rgb([scale(pixel[0]), scale(pixel[1]), scale(pixel[2])]));
    }

    DynamicImage::ImageRgb8(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn gradient_image() -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(24, 16, |x, y| {
            Rgb([(x * 10) as u8, (y * 15) as u8, 100])
        }))
    }

    #[test]
    fn test_augment_preserves_dimensions() {
        let augmenter = Augmenter::with_defaults();
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        for _ in 0..10 {
            let out = augmenter.augment(gradient_image(), &mut rng);
            assert_eq!(out.dimensions(), (24, 16));
        }
    }

    #[test]
    fn test_no_augmentation_is_identity() {
        let augmenter = Augmenter::new(AugmentationConfig::none());
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let out = augmenter.augment(gradient_image(), &mut rng);
        assert_eq!(out.to_rgb8(), gradient_image().to_rgb8());
    }

    #[test]
    fn test_tiny_rotation_is_skipped() {
        let img = gradient_image();
        assert_eq!(rotate(&img, 0.05).to_rgb8(), img.to_rgb8());
    }

    #[test]
    fn test_contrast_factor_one_keeps_pixels() {
        let img = gradient_image();
        assert_eq!(adjust_contrast(&img, 1.0).to_rgb8(), img.to_rgb8());
    }

    #[test]
    fn test_zero_contrast_flattens_image() {
        let out = adjust_contrast(&gradient_image(), 0.0).to_rgb8();
        let first = *out.get_pixel(0, 0);
        assert!(out.pixels().all(|p| *p == first));
    }
}
