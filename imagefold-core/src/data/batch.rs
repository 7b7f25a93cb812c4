//! Batches of preprocessed images, ready for training

use std::path::PathBuf;

use super::tensor::{ImageTensor, CHANNELS};

/// One preprocessed image with its label
#[derive(Debug, Clone)]
pub struct Sample {
    pub image: ImageTensor,
    /// Class index; `None` for images of a class unknown to the label list
    pub label: Option<usize>,
    pub path: PathBuf,
}

/// A batch of samples stacked into one `[N, C, H, W]` buffer
#[derive(Debug, Clone)]
pub struct Batch {
    /// Position of this batch within its pass
    pub index: usize,
    /// Stacked image values, `[N, C, H, W]` row-major
    pub images: Vec<f32>,
    /// Per-image label, in batch order
    pub labels: Vec<Option<usize>>,
    /// Per-image source file, in batch order
    pub paths: Vec<PathBuf>,
    height: usize,
    width: usize,
}

impl Batch {
    /// Stack samples. All images must share one shape; the pipelines
    /// guarantee `3 × 224 × 224`.
    pub fn from_samples(index: usize, samples: Vec<Sample>) -> Self {
        let (height, width) = samples
            .first()
            .map(|s| (s.image.height(), s.image.width()))
            .unwrap_or((0, 0));

        let mut images = Vec::with_capacity(samples.len() * CHANNELS * height * width);
        let mut labels = Vec::with_capacity(samples.len());
        let mut paths = Vec::with_capacity(samples.len());

        for s in samples {
            debug_assert_eq!(s.image.shape(), [CHANNELS, height, width]);
            images.extend_from_slice(s.image.data());
            labels.push(s.label);
            paths.push(s.path);
        }

        Self {
            index,
            images,
            labels,
            paths,
            height,
            width,
        }
    }

    /// Number of images
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// `[N, C, H, W]`
    pub fn shape(&self) -> [usize; 4] {
        [self.len(), CHANNELS, self.height, self.width]
    }

    /// Values of the i-th image, `[C, H, W]`; `None` if out of range
    pub fn image(&self, i: usize) -> Option<&[f32]> {
        if i >= self.len() {
            return None;
        }
        let stride = CHANNELS * self.height * self.width;
        self.images.get(i * stride..(i + 1) * stride)
    }

    /// Copy of the i-th image as a tensor; `None` if out of range
    pub fn image_tensor(&self, i: usize) -> Option<ImageTensor> {
        ImageTensor::from_raw(self.image(i)?.to_vec(), self.height, self.width)
    }

    /// All labels, or `None` if any image in the batch is unlabelled
    pub fn known_labels(&self) -> Option<Vec<usize>> {
        self.labels.iter().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(value: f32, label: Option<usize>) -> Sample {
        Sample {
            image: ImageTensor::from_raw(vec![value; 3 * 2 * 2], 2, 2).unwrap(),
            label,
            path: PathBuf::from(format!("{value}.png")),
        }
    }

    #[test]
    fn test_stacking() {
        let batch = Batch::from_samples(3, vec![sample(1.0, Some(0)), sample(2.0, Some(1))]);
        assert_eq!(batch.index, 3);
        assert_eq!(batch.shape(), [2, 3, 2, 2]);
        assert!(batch.image(1).unwrap().iter().all(|v| *v == 2.0));
        assert!(batch.image(2).is_none());
        assert_eq!(batch.image_tensor(0).unwrap().shape(), [3, 2, 2]);
        assert!(batch.image_tensor(2).is_none());
        assert_eq!(batch.known_labels(), Some(vec![0, 1]));
    }

    #[test]
    fn test_unlabelled_sample() {
        let batch = Batch::from_samples(0, vec![sample(1.0, Some(0)), sample(2.0, None)]);
        assert_eq!(batch.labels, vec![Some(0), None]);
        assert_eq!(batch.known_labels(), None);
    }
}
