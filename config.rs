use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisionConfig {
    /// Base directory for relative model and catalogue paths.
    #[serde(default)]
    pub models_dir: Option<PathBuf>,
    #[serde(default = "default_scene_model_path")]
    pub scene_model_path: PathBuf,
    #[serde(default = "default_scene_catalogue_path")]
    pub scene_catalogue_path: PathBuf,
    #[serde(default = "default_detection_model_path")]
    pub detection_model_path: PathBuf,
    #[serde(default = "default_detection_confidence_threshold")]
    pub detection_confidence_threshold: f32,
    #[serde(default = "default_scene_min_score")]
    pub scene_min_score: f32,
    #[serde(default = "default_scenario_detection_threshold")]
    pub scenario_detection_threshold: f32,
    #[serde(default = "default_object_scene_label")]
    pub object_scene_label: String,
    #[serde(default = "default_text_scene_label")]
    pub text_scene_label: String,
    /// Alias -> class name, layered over the built-in aliases.
    #[serde(default)]
    pub extra_aliases: BTreeMap<String, String>,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            models_dir: None,
            scene_model_path: default_scene_model_path(),
            scene_catalogue_path: default_scene_catalogue_path(),
            detection_model_path: default_detection_model_path(),
            detection_confidence_threshold: default_detection_confidence_threshold(),
            scene_min_score: default_scene_min_score(),
            scenario_detection_threshold: default_scenario_detection_threshold(),
            object_scene_label: default_object_scene_label(),
            text_scene_label: default_text_scene_label(),
            extra_aliases: BTreeMap::new(),
        }
    }
}

fn default_scene_model_path() -> PathBuf {
    PathBuf::from("vision_model_uint8.onnx")
}

fn default_scene_catalogue_path() -> PathBuf {
    PathBuf::from("action_embeddings.json")
}

fn default_detection_model_path() -> PathBuf {
    PathBuf::from("yolov8n.onnx")
}

fn default_detection_confidence_threshold() -> f32 {
    0.25
}

fn default_scene_min_score() -> f32 {
    -1.0
}

fn default_scenario_detection_threshold() -> f32 {
    0.15
}

fn default_object_scene_label() -> String {
    "OBJECT".into()
}

fn default_text_scene_label() -> String {
    "TEXT".into()
}

impl VisionConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::Path(format!("Failed to read config {}: {e}", path.display())))?;
        let mut config: Self = serde_json::from_str(&raw)?;
        if config.models_dir.is_none() {
            config.models_dir = path.parent().map(Path::to_path_buf);
        }
        Ok(config)
    }

    pub fn resolve_model(&self, name: &Path) -> PathBuf {
        match &self.models_dir {
            Some(dir) if !name.is_absolute() => dir.join(name),
            _ => name.to_path_buf(),
        }
    }

    pub fn alias_pairs(&self) -> impl Iterator<Item = (String, String)> + '_ {
        self.extra_aliases
            .iter()
            .map(|(alias, class)| (alias.clone(), class.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_take_defaults() {
        let config: VisionConfig =
            serde_json::from_str(r#"{"detection_confidence_threshold": 0.4}"#).unwrap();
        assert_eq!(config.detection_confidence_threshold, 0.4);
        assert_eq!(config.scene_min_score, -1.0);
        assert_eq!(config.scenario_detection_threshold, 0.15);
        assert_eq!(config.object_scene_label, "OBJECT");
        assert_eq!(config.scene_model_path, PathBuf::from("vision_model_uint8.onnx"));
    }

    #[test]
    fn relative_models_resolve_against_models_dir() {
        let config = VisionConfig {
            models_dir: Some(PathBuf::from("/opt/models")),
            ..VisionConfig::default()
        };
        assert_eq!(
            config.resolve_model(Path::new("yolov8n.onnx")),
            PathBuf::from("/opt/models/yolov8n.onnx")
        );
        assert_eq!(
            config.resolve_model(Path::new("/abs/clip.onnx")),
            PathBuf::from("/abs/clip.onnx")
        );
    }

    #[test]
    fn load_defaults_models_dir_to_config_location() {
        let dir = std::env::temp_dir().join("vm_config_load");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("vision.json");
        std::fs::write(&path, r#"{"extra_aliases": {"mug": "cup"}}"#).unwrap();

        let config = VisionConfig::load(&path).unwrap();
        assert_eq!(config.models_dir.as_deref(), Some(dir.as_path()));
        assert_eq!(
            config.alias_pairs().collect::<Vec<_>>(),
            vec![("mug".to_string(), "cup".to_string())]
        );
    }

    #[test]
    fn missing_config_file_is_a_path_error() {
        let err = VisionConfig::load(Path::new("/nonexistent/vision.json")).unwrap_err();
        assert!(matches!(err, Error::Path(_)));
    }
}
