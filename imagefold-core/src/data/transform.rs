//! Image transforms
//!
//! Geometric transforms work on decoded `RgbImage`s; [`Normalize`] works on
//! the tensor produced from them. Random transforms draw from the `StdRng`
//! they are handed, so a seeded rng reproduces the same augmentation.

use image::imageops::{self, FilterType};
use image::{ImageBuffer, Rgb, RgbImage};
use rand::rngs::StdRng;
use rand::Rng;

use super::tensor::ImageTensor;

/// Per-channel mean of the pretrained backbone's training data
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];

/// Per-channel standard deviation of the pretrained backbone's training data
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Side of the square tensors fed to the model
pub const CROP_SIZE: u32 = 224;

/// Shorter-side length evaluation images are resized to before cropping
pub const RESIZE_SIZE: u32 = 256;

const FILTER: FilterType = FilterType::Triangle;

/// A transform applied to a decoded image before tensor conversion.
pub trait ImageTransform: Send + Sync {
    /// Apply the transform, drawing any randomness from `rng`.
    fn apply(&self, img: RgbImage, rng: &mut StdRng) -> RgbImage;

    /// Short name for logs.
    fn name(&self) -> &'static str;
}

fn uniform(rng: &mut StdRng, lo: f64, hi: f64) -> f64 {
    if hi > lo {
        rng.gen_range(lo..hi)
    } else {
        lo
    }
}

// RandomResizedCrop

/// Crop a random area and aspect ratio, then resize to `size × size`.
///
/// Area is drawn as a fraction of the source in `scale`, aspect ratio
/// log-uniformly in `ratio`. After `attempts` misses it falls back to a
/// center crop clamped to the ratio range.
#[derive(Debug, Clone)]
pub struct RandomResizedCrop {
    pub size: u32,
    pub scale: (f64, f64),
    pub ratio: (f64, f64),
    pub attempts: usize,
}

impl RandomResizedCrop {
    pub fn new(size: u32) -> Self {
        Self {
            size,
            scale: (0.08, 1.0),
            ratio: (3.0 / 4.0, 4.0 / 3.0),
            attempts: 10,
        }
    }

    /// Pick the crop window as `(x, y, w, h)`.
    pub fn window(&self, width: u32, height: u32, rng: &mut StdRng) -> (u32, u32, u32, u32) {
        let area = width as f64 * height as f64;
        let (log_lo, log_hi) = (self.ratio.0.ln(), self.ratio.1.ln());

        for _ in 0..self.attempts {
            let target_area = area * uniform(rng, self.scale.0, self.scale.1);
            let aspect = uniform(rng, log_lo, log_hi).exp();

            let w = (target_area * aspect).sqrt().round() as u32;
            let h = (target_area / aspect).sqrt().round() as u32;

            if w > 0 && h > 0 && w <= width && h <= height {
                let x = rng.gen_range(0..=width - w);
                let y = rng.gen_range(0..=height - h);
                return (x, y, w, h);
            }
        }

        // Fallback to central crop
        let in_ratio = width as f64 / height as f64;
        let (w, h) = if in_ratio < self.ratio.0 {
            (width, ((width as f64 / self.ratio.0).round() as u32).clamp(1, height))
        } else if in_ratio > self.ratio.1 {
            (((height as f64 * self.ratio.1).round() as u32).clamp(1, width), height)
        } else {
            (width, height)
        };
        ((width - w) / 2, (height - h) / 2, w, h)
    }
}

impl ImageTransform for RandomResizedCrop {
    fn apply(&self, img: RgbImage, rng: &mut StdRng) -> RgbImage {
        let (width, height) = img.dimensions();
        if width == 0 || height == 0 {
            return RgbImage::new(self.size, self.size);
        }
        let (x, y, w, h) = self.window(width, height, rng);
        let cropped = imageops::crop_imm(&img, x, y, w, h).to_image();
        imageops::resize(&cropped, self.size, self.size, FILTER)
    }

    fn name(&self) -> &'static str {
        "random_resized_crop"
    }
}

// RandomHorizontalFlip

/// Mirror left-right with probability `p`.
#[derive(Debug, Clone)]
pub struct RandomHorizontalFlip {
    pub p: f64,
}

impl RandomHorizontalFlip {
    pub fn new(p: f64) -> Self {
        Self { p }
    }
}

impl ImageTransform for RandomHorizontalFlip {
    fn apply(&self, img: RgbImage, rng: &mut StdRng) -> RgbImage {
        if rng.gen::<f64>() < self.p {
            imageops::flip_horizontal(&img)
        } else {
            img
        }
    }

    fn name(&self) -> &'static str {
        "random_horizontal_flip"
    }
}

// Resize

/// Resize so the shorter side equals `size`, keeping the aspect ratio.
///
/// The longer side is truncated, not rounded.
#[derive(Debug, Clone)]
pub struct Resize {
    pub size: u32,
}

impl Resize {
    pub fn new(size: u32) -> Self {
        Self { size }
    }

    /// Output `(width, height)` for a source of `width × height`
    pub fn target(&self, width: u32, height: u32) -> (u32, u32) {
        if width <= height {
            let h = (self.size as u64 * height as u64 / width.max(1) as u64) as u32;
            (self.size, h.max(1))
        } else {
            let w = (self.size as u64 * width as u64 / height.max(1) as u64) as u32;
            (w.max(1), self.size)
        }
    }
}

impl ImageTransform for Resize {
    fn apply(&self, img: RgbImage, _rng: &mut StdRng) -> RgbImage {
        let (width, height) = img.dimensions();
        if width == 0 || height == 0 {
            return img;
        }
        let (w, h) = self.target(width, height);
        if (w, h) == (width, height) {
            return img;
        }
        imageops::resize(&img, w, h, FILTER)
    }

    fn name(&self) -> &'static str {
        "resize"
    }
}

// CenterCrop

/// Cut the central `size × size` window. Smaller images are zero-padded
/// around the center first.
#[derive(Debug, Clone)]
pub struct CenterCrop {
    pub size: u32,
}

impl CenterCrop {
    pub fn new(size: u32) -> Self {
        Self { size }
    }
}

impl ImageTransform for CenterCrop {
    fn apply(&self, img: RgbImage, _rng: &mut StdRng) -> RgbImage {
        let (width, height) = img.dimensions();
        let size = self.size;

        let img = if width < size || height < size {
            let (pw, ph) = (width.max(size), height.max(size));
            let (left, top) = ((pw - width) / 2, (ph - height) / 2);
            ImageBuffer::from_fn(pw, ph, |x, y| {
                if x >= left && y >= top && x - left < width && y - top < height {
                    *img.get_pixel(x - left, y - top)
                } else {
                    Rgb([0, 0, 0])
                }
            })
        } else {
            img
        };

        let (width, height) = img.dimensions();
        let x = ((width - size) as f64 / 2.0).round() as u32;
        let y = ((height - size) as f64 / 2.0).round() as u32;
        imageops::crop_imm(&img, x, y, size, size).to_image()
    }

    fn name(&self) -> &'static str {
        "center_crop"
    }
}

// Normalize

/// Per-channel standardization `(x - mean) / std` of a `[0, 1]` tensor.
#[derive(Debug, Clone, PartialEq)]
pub struct Normalize {
    pub mean: [f32; 3],
    pub std: [f32; 3],
}

impl Default for Normalize {
    fn default() -> Self {
        Self::imagenet()
    }
}

impl Normalize {
    pub fn new(mean: [f32; 3], std: [f32; 3]) -> Self {
        Self { mean, std }
    }

    /// Statistics the pretrained backbone was trained with
    pub fn imagenet() -> Self {
        Self::new(IMAGENET_MEAN, IMAGENET_STD)
    }

    pub fn apply(&self, mut tensor: ImageTensor) -> ImageTensor {
        for c in 0..3 {
            let (mean, std) = (self.mean[c], self.std[c]);
            for v in tensor.channel_mut(c) {
                *v = (*v - mean) / std;
            }
        }
        tensor
    }

    /// Exact inverse, back to `[0, 1]` values
    pub fn invert(&self, mut tensor: ImageTensor) -> ImageTensor {
        for c in 0..3 {
            let (mean, std) = (self.mean[c], self.std[c]);
            for v in tensor.channel_mut(c) {
                *v = *v * std + mean;
            }
        }
        tensor
    }

    /// Range a `[0, 1]` input maps to in channel `c`
    pub fn output_range(&self, c: usize) -> (f32, f32) {
        (
            (0.0 - self.mean[c]) / self.std[c],
            (1.0 - self.mean[c]) / self.std[c],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn gradient(width: u32, height: u32) -> RgbImage {
        ImageBuffer::from_fn(width, height, |x, y| Rgb([x as u8, y as u8, 128]))
    }

    #[test]
    fn test_random_resized_crop_output_size() {
        let mut rng = StdRng::seed_from_u64(1);
        let t = RandomResizedCrop::new(224);
        for (w, h) in [(500, 375), (64, 300), (224, 224), (1, 1)] {
            let out = t.apply(gradient(w, h), &mut rng);
            assert_eq!(out.dimensions(), (224, 224));
        }
    }

    #[test]
    fn test_random_resized_crop_window_in_bounds() {
        let mut rng = StdRng::seed_from_u64(7);
        let t = RandomResizedCrop::new(224);
        for _ in 0..200 {
            let (x, y, w, h) = t.window(320, 240, &mut rng);
            assert!(w > 0 && h > 0);
            assert!(x + w <= 320 && y + h <= 240);
        }
    }

    #[test]
    fn test_crop_fallback_clamps_ratio() {
        let mut rng = StdRng::seed_from_u64(0);
        let t = RandomResizedCrop {
            attempts: 0,
            ..RandomResizedCrop::new(224)
        };
        // Very wide image: height kept, width clamped to 4/3 of it
        assert_eq!(t.window(1000, 100, &mut rng), (433, 0, 133, 100));
        // Square image: whole image
        assert_eq!(t.window(50, 50, &mut rng), (0, 0, 50, 50));
    }

    #[test]
    fn test_flip_probability_extremes() {
        let mut rng = StdRng::seed_from_u64(3);
        let img = gradient(4, 2);

        let never = RandomHorizontalFlip::new(0.0).apply(img.clone(), &mut rng);
        assert_eq!(never, img);

        let always = RandomHorizontalFlip::new(1.0).apply(img.clone(), &mut rng);
        assert_eq!(always.get_pixel(0, 0), img.get_pixel(3, 0));
    }

    #[test]
    fn test_resize_shorter_side() {
        let r = Resize::new(256);
        assert_eq!(r.target(500, 375), (341, 256));
        assert_eq!(r.target(375, 500), (256, 341));
        assert_eq!(r.target(256, 256), (256, 256));
    }

    #[test]
    fn test_center_crop_pads_small_images() {
        let mut rng = StdRng::seed_from_u64(0);
        let out = CenterCrop::new(4).apply(gradient(2, 2), &mut rng);
        assert_eq!(out.dimensions(), (4, 4));
        assert_eq!(*out.get_pixel(0, 0), Rgb([0, 0, 0]));
        assert_eq!(*out.get_pixel(1, 1), Rgb([0, 0, 128]));
    }

    #[test]
    fn test_center_crop_takes_middle() {
        let mut rng = StdRng::seed_from_u64(0);
        let out = CenterCrop::new(2).apply(gradient(6, 4), &mut rng);
        assert_eq!(*out.get_pixel(0, 0), Rgb([2, 1, 128]));
    }

    #[test]
    fn test_normalize_invert() {
        let norm = Normalize::imagenet();
        let t = ImageTensor::from_raw(vec![0.0, 1.0, 0.5, 0.5, 1.0, 0.0], 1, 2).unwrap();
        let n = norm.apply(t.clone());
        assert!((n.get(0, 0, 0) - (-0.485 / 0.229)).abs() < 1e-5);

        let back = norm.invert(n);
        for (a, b) in back.data().iter().zip(t.data()) {
            assert!((a - b).abs() < 1e-5);
        }

        let (lo, hi) = norm.output_range(2);
        assert!((lo + 0.406 / 0.225).abs() < 1e-5);
        assert!((hi - 0.594 / 0.225).abs() < 1e-5);
    }
}
