//! Preview rendering for preprocessed tensors
//!
//! [`display`] uses the quick `x * 0.5 + 0.5` un-normalization, which is
//! only approximate for ImageNet statistics: colors come out shifted. Use
//! [`display_exact`] when true colors matter.

use std::path::Path;

use image::{ImageFormat, RgbImage};
use tracing::info;

use crate::data::{ImageTensor, Normalize, CHANNELS};
use crate::error::{ImageFoldError, Result};

/// Map normalized values back towards `[0, 1]` with `x * 0.5 + 0.5`
pub fn unnormalize_approx(tensor: &ImageTensor) -> ImageTensor {
    tensor.clone().map(|v| v * 0.5 + 0.5)
}

/// Clamp a `[0, 1]` CHW tensor and lay it out as an 8-bit RGB image
pub fn to_rgb_image(tensor: &ImageTensor) -> Result<RgbImage> {
    let pixels: Vec<u8> = tensor
        .to_hwc()
        .into_iter()
        .map(|v| (v.clamp(0.0, 1.0) * 255.0).round() as u8)
        .collect();

    debug_assert_eq!(pixels.len(), tensor.height() * tensor.width() * CHANNELS);
    RgbImage::from_raw(tensor.width() as u32, tensor.height() as u32, pixels).ok_or_else(|| {
        ImageFoldError::Internal {
            message: format!(
                "tensor {:?} does not fit an RGB image",
                tensor.shape()
            ),
        }
    })
}

/// Write an approximately un-normalized preview of `tensor` as a PNG
pub fn display(tensor: &ImageTensor, out_path: &Path) -> Result<()> {
    write_png(&to_rgb_image(&unnormalize_approx(tensor))?, out_path)
}

/// Like [`display`], inverting `normalize` exactly
pub fn display_exact(tensor: &ImageTensor, normalize: &Normalize, out_path: &Path) -> Result<()> {
    write_png(&to_rgb_image(&normalize.invert(tensor.clone()))?, out_path)
}

fn write_png(img: &RgbImage, out_path: &Path) -> Result<()> {
    if let Some(parent) = out_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| ImageFoldError::io(parent, e))?;
    }

    img.save_with_format(out_path, ImageFormat::Png)
        .map_err(|e| match e {
            image::ImageError::IoError(source) => ImageFoldError::io(out_path, source),
            other => ImageFoldError::Internal {
                message: format!("PNG encoding failed: {}", other),
            },
        })?;

    info!(
        "Wrote {}x{} preview to {}",
        img.width(),
        img.height(),
        out_path.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_approx_unnormalize_and_clamp() {
        let t = ImageTensor::from_raw(vec![-1.0, 1.0, 3.0, -2.5, 0.0, 0.0], 1, 2).unwrap();
        let img = to_rgb_image(&unnormalize_approx(&t)).unwrap();

        assert_eq!(img.dimensions(), (2, 1));
        // channel 0 holds [-1, 1] -> [0, 1]; channel 1 holds [3, -2.5] -> clamped
        assert_eq!(img.get_pixel(0, 0).0, [0, 255, 128]);
        assert_eq!(img.get_pixel(1, 0).0, [255, 0, 128]);
    }

    #[test]
    fn test_display_writes_png() {
        let tmp = tempfile::tempdir().unwrap();
        let out = tmp.path().join("previews/first.png");
        let t = ImageTensor::from_raw(vec![0.0; 3 * 4 * 5], 4, 5).unwrap();

        display(&t, &out).unwrap();

        let back = image::open(&out).unwrap();
        assert_eq!((back.width(), back.height()), (5, 4));
    }

    #[test]
    fn test_display_exact_recovers_colors() {
        let tmp = tempfile::tempdir().unwrap();
        let out = tmp.path().join("exact.png");
        let norm = Normalize::imagenet();
        let original = ImageTensor::from_raw(vec![0.2, 0.2, 0.6, 0.6, 1.0, 1.0], 1, 2).unwrap();

        display_exact(&norm.apply(original), &norm, &out).unwrap();

        let img = image::open(&out).unwrap().to_rgb8();
        assert_eq!(img.get_pixel(0, 0).0, [51, 153, 255]);
    }
}
