use crate::config::VisionConfig;
use crate::engine::DetectionEngine;
use crate::error::{Error, Result};
use crate::models::{Detection, RawDetection};
use crate::onnx::OrtDetectionEngine;
use crate::vocabulary::ClassNameResolver;
use image::DynamicImage;

pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.25;

/// Runs a detection engine and keeps the boxes matching a free-text query.
pub struct ObjectDetector<E> {
    engine: Option<E>,
    resolver: ClassNameResolver,
}

impl<E: DetectionEngine> Default for ObjectDetector<E> {
    fn default() -> Self {
        Self::new(ClassNameResolver::coco())
    }
}

impl<E: DetectionEngine> ObjectDetector<E> {
    /// Starts uninitialized; `detect` returns nothing until an engine is attached.
    pub fn new(resolver: ClassNameResolver) -> Self {
        Self {
            engine: None,
            resolver,
        }
    }

    pub fn with_engine(engine: E, resolver: ClassNameResolver) -> Self {
        let mut detector = Self::new(resolver);
        detector.initialize(engine);
        detector
    }

    pub fn initialize(&mut self, engine: E) {
        self.engine = Some(engine);
        log::info!("Object detector ready");
    }

    pub fn is_initialized(&self) -> bool {
        self.engine.is_some()
    }

    /// Drops the engine; later `detect` calls return nothing.
    pub fn release(&mut self) {
        if self.engine.take().is_some() {
            log::info!("Object detector released");
        }
    }

    pub fn engine(&self) -> Option<&E> {
        self.engine.as_ref()
    }

    pub fn resolver(&self) -> &ClassNameResolver {
        &self.resolver
    }

    /// Detections for `query`, or all of them when the query is absent or blank.
    ///
    /// Unknown queries, engine failures and an uninitialized detector all give
    /// an empty list.
    pub fn detect(
        &mut self,
        image: &DynamicImage,
        query: Option<&str>,
        confidence_threshold: f32,
    ) -> Vec<Detection> {
        match self.try_detect(image, query, confidence_threshold) {
            Ok(detections) => detections,
            Err(err) if err.is_recoverable() => {
                log::warn!("Detection failed: {err}");
                Vec::new()
            }
            Err(err) => {
                log::error!("Object detector is unusable: {err}");
                Vec::new()
            }
        }
    }

    pub fn try_detect(
        &mut self,
        image: &DynamicImage,
        query: Option<&str>,
        confidence_threshold: f32,
    ) -> Result<Vec<Detection>> {
        let engine = self
            .engine
            .as_mut()
            .ok_or_else(|| Error::Init("Object detector is not initialized".into()))?;
        let target = match query.map(str::trim).filter(|q| !q.is_empty()) {
            Some(q) => {
                let class_name = self.resolver.resolve(q);
                match self.resolver.class_id_of(&class_name) {
                    Some(id) => Some(id),
                    None => {
                        log::warn!("Class not found: {q} (resolved to {class_name})");
                        return Ok(Vec::new());
                    }
                }
            }
            None => None,
        };
        let raw = engine.detect(image, confidence_threshold)?;
        let resolver = &self.resolver;
        Ok(raw
            .into_iter()
            .filter(|d| target.map_or(true, |id| d.class_id == id))
            .map(|d| to_detection(d, resolver))
            .collect())
    }
}

fn to_detection(raw: RawDetection, resolver: &ClassNameResolver) -> Detection {
    let class_name = raw
        .class_name
        .unwrap_or_else(|| resolver.name_of(raw.class_id).to_string());
    Detection {
        class_id: raw.class_id,
        class_name,
        confidence: raw.confidence,
        x: raw.x,
        y: raw.y,
        width: raw.width,
        height: raw.height,
    }
}

impl ObjectDetector<OrtDetectionEngine> {
    /// Loads the configured detection model with the built-in and configured aliases.
    pub fn load(config: &VisionConfig) -> Result<Self> {
        let model_path = config.resolve_model(&config.detection_model_path);
        let engine = OrtDetectionEngine::from_file(&model_path)?;
        let resolver = ClassNameResolver::coco().with_aliases(config.alias_pairs());
        Ok(Self::with_engine(engine, resolver))
    }
}
