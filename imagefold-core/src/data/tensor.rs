//! Channel-first image tensors

use image::RgbImage;

/// Number of color channels every tensor carries
pub const CHANNELS: usize = 3;

/// An RGB image as `f32` values in `[C, H, W]` layout, row-major
#[derive(Debug, Clone, PartialEq)]
pub struct ImageTensor {
    data: Vec<f32>,
    height: usize,
    width: usize,
}

impl ImageTensor {
    /// Convert 8-bit RGB pixels to `[0, 1]` floats, interleaved `[H, W, C]`
    /// to planar `[C, H, W]`
    pub fn from_rgb(img: &RgbImage) -> Self {
        let (w, h) = img.dimensions();
        let (width, height) = (w as usize, h as usize);
        let npix = width * height;
        let raw = img.as_raw();

        let mut data = vec![0.0f32; CHANNELS * npix];
        for i in 0..npix {
            for c in 0..CHANNELS {
                data[c * npix + i] = raw[i * CHANNELS + c] as f32 / 255.0;
            }
        }

        Self { data, height, width }
    }

    /// Wrap planar data; `None` if the length does not match `3 * h * w`
    pub fn from_raw(data: Vec<f32>, height: usize, width: usize) -> Option<Self> {
        if data.len() != CHANNELS * height * width {
            return None;
        }
        Some(Self { data, height, width })
    }

    /// `[C, H, W]`
    pub fn shape(&self) -> [usize; 3] {
        [CHANNELS, self.height, self.width]
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Planar values
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn into_data(self) -> Vec<f32> {
        self.data
    }

    /// One channel plane
    pub fn channel(&self, c: usize) -> &[f32] {
        let plane = self.height * self.width;
        &self.data[c * plane..(c + 1) * plane]
    }

    pub(crate) fn channel_mut(&mut self, c: usize) -> &mut [f32] {
        let plane = self.height * self.width;
        &mut self.data[c * plane..(c + 1) * plane]
    }

    /// Value at channel `c`, row `y`, column `x`
    pub fn get(&self, c: usize, y: usize, x: usize) -> f32 {
        self.data[(c * self.height + y) * self.width + x]
    }

    /// Apply `f` to every value
    pub fn map(mut self, f: impl Fn(f32) -> f32) -> Self {
        for v in &mut self.data {
            *v = f(*v);
        }
        self
    }

    /// Reorder to interleaved `[H, W, C]`
    pub fn to_hwc(&self) -> Vec<f32> {
        let npix = self.height * self.width;
        let mut out = vec![0.0f32; self.data.len()];
        for i in 0..npix {
            for c in 0..CHANNELS {
                out[i * CHANNELS + c] = self.data[c * npix + i];
            }
        }
        out
    }

    /// Smallest and largest value; `None` for an empty tensor
    pub fn min_max(&self) -> Option<(f32, f32)> {
        self.data.iter().copied().fold(None, |acc, v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
    }
}
