//! Scene matching and object finding for camera frames, on top of ONNX Runtime.

pub mod codec;
pub mod config;
pub mod detection;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod models;
pub mod onnx;
pub mod overlay;
pub mod scan;
pub mod scenario;
pub mod scene;
pub mod vocabulary;

pub use config::VisionConfig;
pub use detection::ObjectDetector;
pub use error::{Error, Result};
pub use models::Detection;
pub use overlay::{map_to_view, OverlayDetection};
pub use scenario::{ScenarioOutcome, ScenarioPipeline, SceneAction};
pub use scene::{SceneClassifier, SceneLabel};
pub use vocabulary::ClassNameResolver;
