use crate::codec::{EncodedTensor, TensorData};
use crate::engine::{DetectionEngine, EmbeddingEngine, OutputTensor};
use crate::error::{Error, Result};
use crate::models::{ElementType, InputSpec, RawDetection};
use image::imageops::FilterType;
use image::DynamicImage;
use ndarray::Array4;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;

use ort::session::builder::{GraphOptimizationLevel, SessionBuilder};
use ort::session::Session;
use ort::tensor::TensorElementType;
use ort::value::{DynValue, Tensor, ValueType};

pub const DETECTION_INPUT_SIZE: u32 = 640;
const LETTERBOX_FILL: f32 = 114.0 / 255.0;
/// Columns of an end-to-end detector row: x1, y1, x2, y2, score, class.
const END2END_COLS: usize = 6;

fn ensure_environment() -> Result<()> {
    ort::init()
        .with_name("vision-matrix")
        .commit()
        .map_err(|e| Error::Init(format!("Failed to init ORT environment: {e}")))?;
    Ok(())
}

fn session_builder() -> Result<SessionBuilder> {
    Session::builder()
        .map_err(|e| Error::Init(format!("{e}")))?
        .with_optimization_level(GraphOptimizationLevel::Level1)
        .map_err(|e| Error::Init(format!("{e}")))
}

fn guarded<T>(what: &str, f: impl FnOnce() -> Result<T>) -> Result<T> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(res) => res,
        Err(_) => Err(Error::Init(format!("ONNX Runtime panicked while {what}"))),
    }
}

pub fn build_session_from_memory(model_bytes: &[u8]) -> Result<Session> {
    if model_bytes.is_empty() {
        return Err(Error::Init("Model blob is empty".into()));
    }
    ensure_environment()?;
    guarded("building session", || {
        session_builder()?
            .commit_from_memory(model_bytes)
            .map_err(|e| Error::Init(format!("{e}")))
    })
}

pub fn build_session_from_file(model_path: &Path) -> Result<Session> {
    if !model_path.exists() {
        return Err(Error::Init(format!(
            "Model not found: {}",
            model_path.display()
        )));
    }
    ensure_environment()?;
    let session = guarded("building session", || {
        session_builder()?
            .commit_from_file(model_path)
            .map_err(|e| Error::Init(format!("{e}")))
    })?;
    log::info!("Loaded model: {}", model_path.display());
    Ok(session)
}

/// Name, declared dims and element type of the session's first input.
fn first_input(session: &Session) -> Result<(String, Vec<i64>, TensorElementType)> {
    let input = session
        .inputs
        .first()
        .ok_or_else(|| Error::Init("Model declares no inputs".into()))?;
    match &input.input_type {
        ValueType::Tensor { ty, shape, .. } => {
            Ok((input.name.clone(), shape.iter().copied().collect(), *ty))
        }
        other => Err(Error::Init(format!(
            "Model input '{}' is not a tensor: {other:?}",
            input.name
        ))),
    }
}

fn first_output_name(session: &Session) -> Result<String> {
    session
        .outputs
        .first()
        .map(|o| o.name.clone())
        .ok_or_else(|| Error::Init("Model declares no outputs".into()))
}

fn to_value<T>(shape: [usize; 4], data: Vec<T>) -> Result<DynValue>
where
    T: ort::tensor::PrimitiveTensorElementType + std::fmt::Debug + Clone + 'static,
{
    let array = Array4::from_shape_vec(shape, data)
        .map_err(|e| Error::Codec(format!("Invalid input tensor shape: {e}")))?;
    Ok(Tensor::from_array(array)
        .map_err(|e| Error::Inference(format!("{e}")))?
        .into_dyn())
}

/// Image encoder (e.g. a CLIP vision tower) backed by an ONNX session.
pub struct OrtEmbeddingEngine {
    session: Session,
    spec: InputSpec,
    output_name: String,
}

impl OrtEmbeddingEngine {
    pub fn from_memory(model_bytes: &[u8]) -> Result<Self> {
        Self::from_session(build_session_from_memory(model_bytes)?)
    }

    pub fn from_file(model_path: &Path) -> Result<Self> {
        Self::from_session(build_session_from_file(model_path)?)
    }

    fn from_session(session: Session) -> Result<Self> {
        let (name, shape, ty) = first_input(&session)?;
        let element_type = match ty {
            TensorElementType::Uint8 => ElementType::Uint8,
            TensorElementType::Float32 => ElementType::Float32,
            other => {
                return Err(Error::Init(format!(
                    "Unsupported input element type {other:?}"
                )))
            }
        };
        let output_name = first_output_name(&session)?;
        log::debug!(
            "Embedding model input '{name}' {shape:?} {element_type:?}, output '{output_name}'"
        );
        Ok(Self {
            session,
            spec: InputSpec {
                name,
                shape,
                element_type,
            },
            output_name,
        })
    }

    fn run_session(&mut self, input: &EncodedTensor) -> Result<OutputTensor> {
        let shape = input.shape();
        let value = match &input.data {
            TensorData::U8(data) => to_value(shape, data.clone())?,
            TensorData::F32(data) => to_value(shape, data.clone())?,
        };
        let outputs = self
            .session
            .run(ort::inputs![self.spec.name.as_str() => value])
            .map_err(|e| Error::Inference(format!("Failed to run embedding model: {e}")))?;
        let output = outputs
            .get(self.output_name.as_str())
            .ok_or_else(|| Error::Inference(format!("Missing output '{}'", self.output_name)))?;
        let (out_shape, data) = output
            .try_extract_tensor::<f32>()
            .map_err(|e| Error::Inference(format!("{e}")))?;
        Ok(OutputTensor {
            name: self.output_name.clone(),
            shape: out_shape.iter().copied().collect(),
            data: data.to_vec(),
        })
    }
}

impl EmbeddingEngine for OrtEmbeddingEngine {
    fn input_spec(&self) -> Result<InputSpec> {
        Ok(self.spec.clone())
    }

    fn run(&mut self, input: &EncodedTensor) -> Result<OutputTensor> {
        match catch_unwind(AssertUnwindSafe(|| self.run_session(input))) {
            Ok(res) => res,
            Err(_) => Err(Error::Inference("ONNX Runtime panicked during inference".into())),
        }
    }
}

/// Placement of a resized image inside the square model input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    pub scale: f32,
    pub pad_x: u32,
    pub pad_y: u32,
}

impl Letterbox {
    pub fn fit(src_w: u32, src_h: u32, dst_w: u32, dst_h: u32) -> Self {
        let scale = (dst_w as f32 / src_w as f32).min(dst_h as f32 / src_h as f32);
        let (new_w, new_h) = Self::resized_dims(src_w, src_h, dst_w, dst_h, scale);
        Self {
            scale,
            pad_x: (dst_w - new_w) / 2,
            pad_y: (dst_h - new_h) / 2,
        }
    }

    fn resized_dims(src_w: u32, src_h: u32, dst_w: u32, dst_h: u32, scale: f32) -> (u32, u32) {
        let new_w = ((src_w as f32 * scale).round() as u32).clamp(1, dst_w);
        let new_h = ((src_h as f32 * scale).round() as u32).clamp(1, dst_h);
        (new_w, new_h)
    }

    /// Model-input x back to source-image x.
    pub fn unmap_x(&self, x: f32) -> f32 {
        (x - self.pad_x as f32) / self.scale
    }

    pub fn unmap_y(&self, y: f32) -> f32 {
        (y - self.pad_y as f32) / self.scale
    }
}

/// Aspect-preserving resize onto a gray canvas, scaled to `[0, 1]`, NCHW.
pub fn letterbox(image: &DynamicImage, dst_w: u32, dst_h: u32) -> Result<(Array4<f32>, Letterbox)> {
    let (src_w, src_h) = (image.width(), image.height());
    if src_w == 0 || src_h == 0 {
        return Err(Error::Codec(format!(
            "Cannot letterbox an empty {src_w}x{src_h} bitmap"
        )));
    }
    let fit = Letterbox::fit(src_w, src_h, dst_w, dst_h);
    let (new_w, new_h) = Letterbox::resized_dims(src_w, src_h, dst_w, dst_h, fit.scale);
    let rgb = image.resize_exact(new_w, new_h, FilterType::Triangle).to_rgb8();
    let mut canvas =
        Array4::<f32>::from_elem((1, 3, dst_h as usize, dst_w as usize), LETTERBOX_FILL);
    for (x, y, pixel) in rgb.enumerate_pixels() {
        let (cx, cy) = ((x + fit.pad_x) as usize, (y + fit.pad_y) as usize);
        for c in 0..3 {
            canvas[[0, c, cy, cx]] = pixel[c] as f32 / 255.0;
        }
    }
    Ok((canvas, fit))
}

/// Reads `[.., N, 6]` end-to-end rows into source-image boxes.
pub fn parse_end2end(
    data: &[f32],
    fit: &Letterbox,
    confidence_threshold: f32,
    image_w: u32,
    image_h: u32,
) -> Vec<RawDetection> {
    let (max_x, max_y) = (image_w as f32, image_h as f32);
    let mut items = Vec::new();
    for row in data.chunks_exact(END2END_COLS) {
        let score = row[4];
        if !score.is_finite() || score < confidence_threshold {
            continue;
        }
        let x1 = fit.unmap_x(row[0]).clamp(0.0, max_x);
        let y1 = fit.unmap_y(row[1]).clamp(0.0, max_y);
        let x2 = fit.unmap_x(row[2]).clamp(0.0, max_x);
        let y2 = fit.unmap_y(row[3]).clamp(0.0, max_y);
        if x2 <= x1 || y2 <= y1 {
            continue;
        }
        items.push(RawDetection {
            class_id: row[5].round() as i32,
            class_name: None,
            confidence: score.min(1.0),
            x: x1,
            y: y1,
            width: x2 - x1,
            height: y2 - y1,
        });
    }
    items
}

/// YOLOv8-family detector exported with suppression inside the graph.
pub struct OrtDetectionEngine {
    session: Session,
    input_name: String,
    input_w: u32,
    input_h: u32,
}

impl OrtDetectionEngine {
    pub fn from_memory(model_bytes: &[u8]) -> Result<Self> {
        Self::from_session(build_session_from_memory(model_bytes)?)
    }

    pub fn from_file(model_path: &Path) -> Result<Self> {
        Self::from_session(build_session_from_file(model_path)?)
    }

    fn from_session(session: Session) -> Result<Self> {
        let (input_name, dims, _) = first_input(&session)?;
        let declared = |idx: usize| {
            dims.get(idx)
                .copied()
                .filter(|d| *d > 0)
                .map(|d| d as u32)
                .unwrap_or(DETECTION_INPUT_SIZE)
        };
        let (input_h, input_w) = (declared(2), declared(3));
        log::debug!("Detection model input '{input_name}' {input_w}x{input_h}");
        Ok(Self {
            session,
            input_name,
            input_w,
            input_h,
        })
    }

    fn run_session(
        &mut self,
        image: &DynamicImage,
        confidence_threshold: f32,
    ) -> Result<Vec<RawDetection>> {
        let (input, fit) = letterbox(image, self.input_w, self.input_h)?;
        let value = Tensor::from_array(input)
            .map_err(|e| Error::Inference(format!("{e}")))?
            .into_dyn();
        let outputs = self
            .session
            .run(ort::inputs![self.input_name.as_str() => value])
            .map_err(|e| Error::Inference(format!("Failed to run detection model: {e}")))?;
        let (shape, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| Error::Inference(format!("{e}")))?;
        if shape.last().copied() != Some(END2END_COLS as i64) {
            return Err(Error::Inference(format!(
                "Expected an end-to-end [1, N, 6] output, got {:?}",
                shape.iter().collect::<Vec<_>>()
            )));
        }
        Ok(parse_end2end(
            data,
            &fit,
            confidence_threshold,
            image.width(),
            image.height(),
        ))
    }
}

impl DetectionEngine for OrtDetectionEngine {
    fn detect(
        &mut self,
        image: &DynamicImage,
        confidence_threshold: f32,
    ) -> Result<Vec<RawDetection>> {
        match catch_unwind(AssertUnwindSafe(|| self.run_session(image, confidence_threshold))) {
            Ok(res) => res,
            Err(_) => Err(Error::Inference("ONNX Runtime panicked during detection".into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn letterbox_pads_the_short_axis() {
        let fit = Letterbox::fit(1280, 640, 640, 640);
        assert_eq!(fit.scale, 0.5);
        assert_eq!((fit.pad_x, fit.pad_y), (0, 160));
    }

    #[test]
    fn letterbox_fills_canvas_and_copies_pixels() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 2, Rgb([255, 0, 0])));
        let (canvas, fit) = letterbox(&img, 8, 8).unwrap();
        assert_eq!(canvas.shape(), &[1, 3, 8, 8]);
        assert_eq!((fit.pad_x, fit.pad_y), (0, 2));
        assert_eq!(canvas[[0, 0, 0, 0]], LETTERBOX_FILL);
        assert!((canvas[[0, 0, 3, 3]] - 1.0).abs() < 1e-2);
        assert!(canvas[[0, 1, 3, 3]].abs() < 1e-2);
        assert_eq!(canvas[[0, 2, 7, 7]], LETTERBOX_FILL);
    }

    #[test]
    fn letterbox_rejects_empty_images() {
        assert!(letterbox(&DynamicImage::new_rgb8(0, 3), 8, 8).is_err());
    }

    #[test]
    fn end2end_rows_are_unletterboxed_and_thresholded() {
        let fit = Letterbox::fit(1280, 640, 640, 640);
        let rows = [
            // inside the image, above threshold
            100.0, 210.0, 150.0, 260.0, 0.9, 41.0,
            // below threshold
            0.0, 160.0, 10.0, 170.0, 0.1, 0.0,
            // spills into the top padding, clamped to the image
            0.0, 100.0, 20.0, 200.0, 0.5, 0.0,
        ];
        let dets = parse_end2end(&rows, &fit, 0.25, 1280, 640);
        assert_eq!(dets.len(), 2);
        assert_eq!(dets[0].class_id, 41);
        assert_eq!(
            (dets[0].x, dets[0].y, dets[0].width, dets[0].height),
            (200.0, 100.0, 100.0, 100.0)
        );
        assert_eq!(dets[0].class_name, None);
        assert_eq!((dets[1].y, dets[1].height), (0.0, 80.0));
    }

    #[test]
    fn missing_model_file_is_an_init_error() {
        let err = OrtEmbeddingEngine::from_file(Path::new("/nonexistent/model.onnx")).err();
        assert!(matches!(err, Some(Error::Init(_))));
    }

    #[test]
    fn empty_model_blob_is_an_init_error() {
        assert!(matches!(OrtDetectionEngine::from_memory(&[]).err(), Some(Error::Init(_))));
    }
}
