use crate::codec;
use crate::config::VisionConfig;
use crate::embedding::{normalize_embedding, SceneVectorLibrary};
use crate::engine::EmbeddingEngine;
use crate::error::{Error, Result};
use crate::models::{SceneMatch, TensorDescriptor};
use crate::onnx::OrtEmbeddingEngine;
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Score the best match must exceed; at -1.0 every finite match is accepted.
pub const DEFAULT_MIN_SCORE: f32 = -1.0;

/// Outcome of [`SceneClassifier::classify`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SceneLabel {
    Scene(String),
    /// Empty library, or no match above the minimum score.
    Unknown,
    /// This call failed; the classifier stays usable.
    Error,
    /// The classifier never became ready.
    ErrorInit,
}

impl SceneLabel {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Scene(label) => label,
            Self::Unknown => "UNKNOWN",
            Self::Error => "ERROR",
            Self::ErrorInit => "ERROR_INIT",
        }
    }

    pub fn is(&self, label: &str) -> bool {
        matches!(self, Self::Scene(l) if l == label)
    }
}

impl fmt::Display for SceneLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

struct Ready<E> {
    engine: E,
    descriptor: TensorDescriptor,
    library: SceneVectorLibrary,
}

/// Embeds an image and names the closest scene in a reference library.
pub struct SceneClassifier<E> {
    ready: Option<Ready<E>>,
    min_score: f32,
}

impl<E: EmbeddingEngine> Default for SceneClassifier<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: EmbeddingEngine> SceneClassifier<E> {
    /// A classifier that is not ready yet; `classify` answers `ERROR_INIT`.
    pub fn new() -> Self {
        Self {
            ready: None,
            min_score: DEFAULT_MIN_SCORE,
        }
    }

    pub fn with_min_score(mut self, min_score: f32) -> Self {
        self.min_score = min_score;
        self
    }

    pub fn min_score(&self) -> f32 {
        self.min_score
    }

    pub fn is_ready(&self) -> bool {
        self.ready.is_some()
    }

    /// Derives the input layout from `engine` and loads the catalogue.
    ///
    /// On failure the classifier is left not-ready and nothing is kept.
    pub fn initialize(&mut self, engine: E, catalogue_json: &str) -> Result<()> {
        self.ready = None;
        let spec = engine.input_spec()?;
        let descriptor = TensorDescriptor::from_shape(&spec.shape, spec.element_type)?;
        let library = SceneVectorLibrary::from_catalogue_json(catalogue_json)?;
        log::info!(
            "Scene classifier ready: input '{}' {:?} {}x{}x{} {:?}, {} scene vectors",
            spec.name,
            descriptor.layout,
            descriptor.width,
            descriptor.height,
            descriptor.channels,
            descriptor.element_type,
            library.len()
        );
        self.ready = Some(Ready {
            engine,
            descriptor,
            library,
        });
        Ok(())
    }

    pub fn library(&self) -> Option<&SceneVectorLibrary> {
        self.ready.as_ref().map(|r| &r.library)
    }

    pub fn descriptor(&self) -> Option<&TensorDescriptor> {
        self.ready.as_ref().map(|r| &r.descriptor)
    }

    /// Best match with its score, or `None` for an empty library.
    pub fn classify_scored(&mut self, image: &DynamicImage) -> Result<Option<SceneMatch>> {
        let ready = self
            .ready
            .as_mut()
            .ok_or_else(|| Error::Init("Scene classifier is not initialized".into()))?;
        let input = codec::encode(image, &ready.descriptor)?;
        let output = ready.engine.run(&input)?;
        let raw = codec::decode(&output.data, output.embedding_len())?;
        let embedding = normalize_embedding(&raw);
        ready.library.best_match(&embedding)
    }

    pub fn classify(&mut self, image: &DynamicImage) -> SceneLabel {
        if !self.is_ready() {
            log::warn!("Scene classifier used before initialization");
            return SceneLabel::ErrorInit;
        }
        match self.classify_scored(image) {
            Ok(Some(hit)) if hit.score > self.min_score => {
                log::debug!("Scene match: {} ({:.4})", hit.label, hit.score);
                SceneLabel::Scene(hit.label)
            }
            Ok(Some(hit)) => {
                log::info!(
                    "Best scene {} ({:.4}) is not above {:.4}",
                    hit.label,
                    hit.score,
                    self.min_score
                );
                SceneLabel::Unknown
            }
            Ok(None) => SceneLabel::Unknown,
            Err(err) if err.is_recoverable() => {
                log::warn!("Scene classification failed: {err}");
                SceneLabel::Error
            }
            Err(err) => {
                log::error!("Scene classifier is unusable: {err}");
                SceneLabel::Error
            }
        }
    }
}

impl SceneClassifier<OrtEmbeddingEngine> {
    /// Builds from a model blob; a failure leaves a classifier that answers `ERROR_INIT`.
    pub fn from_model_bytes(model_bytes: &[u8], catalogue_json: &str, min_score: f32) -> Self {
        let mut classifier = Self::new().with_min_score(min_score);
        let loaded = OrtEmbeddingEngine::from_memory(model_bytes)
            .and_then(|engine| classifier.initialize(engine, catalogue_json));
        if let Err(err) = loaded {
            log::warn!("Scene classifier initialization failed: {err}");
        }
        classifier
    }

    /// Loads the configured model and catalogue files.
    pub fn load(config: &VisionConfig) -> Result<Self> {
        let model_path = config.resolve_model(&config.scene_model_path);
        let catalogue_path = config.resolve_model(&config.scene_catalogue_path);
        let engine = OrtEmbeddingEngine::from_file(&model_path)?;
        let catalogue = std::fs::read_to_string(&catalogue_path).map_err(|e| {
            Error::Init(format!(
                "Failed to read scene catalogue {}: {e}",
                catalogue_path.display()
            ))
        })?;
        let mut classifier = Self::new().with_min_score(config.scene_min_score);
        classifier.initialize(engine, &catalogue)?;
        Ok(classifier)
    }
}
