//! Capabilities the pipeline borrows from an inference backend.
//!
//! Engines are driven through `&mut self`: one instance serves one call at a
//! time, and the host serialises access or keeps one instance per thread.

use crate::codec::EncodedTensor;
use crate::error::Result;
use crate::models::{InputSpec, RawDetection};
use image::DynamicImage;

/// Output tensor of an embedding model.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputTensor {
    pub name: String,
    pub shape: Vec<i64>,
    pub data: Vec<f32>,
}

impl OutputTensor {
    /// Length of the last axis, the embedding size.
    pub fn embedding_len(&self) -> usize {
        self.shape
            .last()
            .copied()
            .filter(|d| *d > 0)
            .map(|d| d as usize)
            .unwrap_or(self.data.len())
    }
}

pub trait EmbeddingEngine {
    /// Name, declared shape and element type of the single image input.
    fn input_spec(&self) -> Result<InputSpec>;

    fn run(&mut self, input: &EncodedTensor) -> Result<OutputTensor>;
}

/// Detector that preprocesses, infers and suppresses overlaps on its own.
pub trait DetectionEngine {
    /// Boxes in `image` pixel space, already thresholded at `confidence_threshold`.
    fn detect(
        &mut self,
        image: &DynamicImage,
        confidence_threshold: f32,
    ) -> Result<Vec<RawDetection>>;
}

impl<E: EmbeddingEngine + ?Sized> EmbeddingEngine for Box<E> {
    fn input_spec(&self) -> Result<InputSpec> {
        (**self).input_spec()
    }

    fn run(&mut self, input: &EncodedTensor) -> Result<OutputTensor> {
        (**self).run(input)
    }
}

impl<E: DetectionEngine + ?Sized> DetectionEngine for Box<E> {
    fn detect(
        &mut self,
        image: &DynamicImage,
        confidence_threshold: f32,
    ) -> Result<Vec<RawDetection>> {
        (**self).detect(image, confidence_threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedding_len_reads_last_axis() {
        let out = OutputTensor {
            name: "image_embeds".into(),
            shape: vec![1, 512],
            data: vec![0.0; 512],
        };
        assert_eq!(out.embedding_len(), 512);
    }

    #[test]
    fn embedding_len_falls_back_to_buffer_size() {
        let out = OutputTensor {
            name: "out".into(),
            shape: vec![1, -1],
            data: vec![0.0; 8],
        };
        assert_eq!(out.embedding_len(), 8);
    }
}
