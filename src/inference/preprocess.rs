//! Image Preprocessing
//!
//! Turns uploaded bytes or decoded images into the `[1, 3, S, S]` tensor the
//! network consumes. Pixel values stay in [0, 255]: the network rescales
//! them itself as its first operation.

use burn::tensor::{backend::Backend, Tensor, TensorData};
use image::{imageops::FilterType, DynamicImage};

use crate::utils::error::{Result, TomatoError};

/// Decode raw bytes in any supported format
pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage> {
    if bytes.is_empty() {
        return Err(TomatoError::InvalidImage("empty upload".to_string()));
    }

    image::load_from_memory(bytes).map_err(|e| TomatoError::InvalidImage(e.to_string()))
}

/// Convert to RGB, resize to `size`x`size` and flatten to CHW `f32`
///
/// Bicubic resampling, no intensity rescaling.
pub fn image_to_chw(image: &DynamicImage, size: usize) -> Vec<f32> {
    let rgb = image
        .resize_exact(size as u32, size as u32, FilterType::CatmullRom)
        .to_rgb8();

    let num_pixels = size * size;
    let mut data = vec![0.0f32; 3 * num_pixels];

    // CHW layout: all R values, then all G values, then all B values
    for (i, pixel) in rgb.pixels().enumerate() {
        data[i] = pixel[0] as f32;
        data[num_pixels + i] = pixel[1] as f32;
        data[2 * num_pixels + i] = pixel[2] as f32;
    }

    data
}

/// Wrap a single CHW image into a batch of one
pub fn to_batch_tensor<B: Backend>(chw: Vec<f32>, size: usize, device: &B::Device) -> Tensor<B, 4> {
    Tensor::<B, 4>::from_floats(TensorData::new(chw, [1, 3, size, size]), device)
}

/// Decode, resize and batch uploaded bytes
pub fn preprocess_bytes<B: Backend>(
    bytes: &[u8],
    size: usize,
    device: &B::Device,
) -> Result<Tensor<B, 4>> {
    let image = decode_image(bytes)?;
    Ok(to_batch_tensor(image_to_chw(&image, size), size, device))
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;
    use image::{GrayImage, ImageFormat, Luma, Rgb, RgbImage, RgbaImage};
    use std::io::Cursor;

    fn encode(image: DynamicImage, format: ImageFormat) -> Vec<u8> {
        let mut bytes = Vec::new();
        image.write_to(&mut Cursor::new(&mut bytes), format).unwrap();
        bytes
    }

    #[test]
    fn test_any_size_becomes_fixed_shape() {
        let device = Default::default();
        for (w, h) in [(10, 10), (640, 480), (255, 300)] {
            let bytes = encode(DynamicImage::new_rgb8(w, h), ImageFormat::Png);
            let tensor = preprocess_bytes::<NdArray>(&bytes, 256, &device).unwrap();
            assert_eq!(tensor.dims(), [1, 3, 256, 256]);
        }
    }

    #[test]
    fn test_grayscale_and_alpha_are_converted_to_rgb() {
        let device = Default::default();

        let gray = DynamicImage::ImageLuma8(GrayImage::from_pixel(20, 20, Luma([128])));
        let tensor = preprocess_bytes::<NdArray>(&encode(gray, ImageFormat::Png), 32, &device).unwrap();
        assert_eq!(tensor.dims(), [1, 3, 32, 32]);

        let rgba = DynamicImage::ImageRgba8(RgbaImage::new(12, 30));
        let tensor = preprocess_bytes::<NdArray>(&encode(rgba, ImageFormat::Png), 32, &device).unwrap();
        assert_eq!(tensor.dims(), [1, 3, 32, 32]);
    }

    #[test]
    fn test_values_are_not_rescaled() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 8, Rgb([200, 100, 50])));
        let chw = image_to_chw(&image, 8);

        assert_eq!(chw.len(), 3 * 8 * 8);
        assert_eq!(chw[0], 200.0);
        assert_eq!(chw[64], 100.0);
        assert_eq!(chw[128], 50.0);
    }

    #[test]
    fn test_jpeg_is_accepted() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(40, 40, Rgb([10, 200, 30])));
        let bytes = encode(image, ImageFormat::Jpeg);
        assert!(decode_image(&bytes).is_ok());
    }

    #[test]
    fn test_garbage_is_invalid_image() {
        for bytes in [&b""[..], b"not an image", &[0xFF, 0xD8, 0xFF, 0x00][..]] {
            assert!(matches!(
                decode_image(bytes),
                Err(TomatoError::InvalidImage(_))
            ));
        }
    }
}
