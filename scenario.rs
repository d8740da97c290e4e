use crate::config::VisionConfig;
use crate::detection::ObjectDetector;
use crate::engine::{DetectionEngine, EmbeddingEngine};
use crate::models::Detection;
use crate::onnx::{OrtDetectionEngine, OrtEmbeddingEngine};
use crate::scene::{SceneClassifier, SceneLabel};
use image::DynamicImage;

/// What the host should do next for a classified image.
#[derive(Debug, Clone, PartialEq)]
pub enum SceneAction {
    /// Object scene: every detection found, in engine order.
    Objects(Vec<Detection>),
    /// Text scene: the host runs OCR on the image.
    ExtractText,
    None,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioOutcome {
    pub scene: SceneLabel,
    pub action: SceneAction,
}

impl ScenarioOutcome {
    /// Class name of the first detection in an object scene.
    pub fn headline(&self) -> Option<&str> {
        match &self.action {
            SceneAction::Objects(dets) => dets.first().map(|d| d.class_name.as_str()),
            _ => None,
        }
    }
}

/// Classifies a scene, then dispatches object scenes to the detector.
pub struct ScenarioPipeline<C, D> {
    classifier: SceneClassifier<C>,
    detector: ObjectDetector<D>,
    object_label: String,
    text_label: String,
    detection_threshold: f32,
}

impl<C: EmbeddingEngine, D: DetectionEngine> ScenarioPipeline<C, D> {
    pub fn new(
        classifier: SceneClassifier<C>,
        detector: ObjectDetector<D>,
        config: &VisionConfig,
    ) -> Self {
        Self {
            classifier,
            detector,
            object_label: config.object_scene_label.clone(),
            text_label: config.text_scene_label.clone(),
            detection_threshold: config.scenario_detection_threshold,
        }
    }

    pub fn classifier_mut(&mut self) -> &mut SceneClassifier<C> {
        &mut self.classifier
    }

    pub fn detector_mut(&mut self) -> &mut ObjectDetector<D> {
        &mut self.detector
    }

    pub fn detection_threshold(&self) -> f32 {
        self.detection_threshold
    }

    /// Detections for `query` at `confidence_threshold`, reusing the ones `analyze`
    /// already found when the request matches the scenario's own detection pass.
    pub fn find_objects(
        &mut self,
        image: &DynamicImage,
        outcome: &ScenarioOutcome,
        query: Option<&str>,
        confidence_threshold: f32,
    ) -> Vec<Detection> {
        let unfiltered = query.map_or(true, |q| q.trim().is_empty());
        if let SceneAction::Objects(found) = &outcome.action {
            if unfiltered && confidence_threshold == self.detection_threshold {
                return found.clone();
            }
        }
        if !self.detector.is_initialized() {
            log::debug!("No detection model loaded");
            return Vec::new();
        }
        self.detector.detect(image, query, confidence_threshold)
    }

    pub fn analyze(&mut self, image: &DynamicImage) -> ScenarioOutcome {
        let scene = self.classifier.classify(image);
        let action = if scene.is(&self.object_label) {
            let detections = self.detector.detect(image, None, self.detection_threshold);
            if detections.is_empty() {
                log::info!("Object scene without any detection");
            }
            SceneAction::Objects(detections)
        } else if scene.is(&self.text_label) {
            SceneAction::ExtractText
        } else {
            SceneAction::None
        };
        ScenarioOutcome { scene, action }
    }
}

impl ScenarioPipeline<OrtEmbeddingEngine, OrtDetectionEngine> {
    /// A missing scene model leaves the classifier answering `ERROR_INIT`
    /// and a missing detection model leaves the detector empty.
    pub fn load(config: &VisionConfig) -> Self {
        let classifier = SceneClassifier::load(config).unwrap_or_else(|err| {
            log::error!("Scene classifier unavailable: {err}");
            SceneClassifier::new().with_min_score(config.scene_min_score)
        });
        let detector = ObjectDetector::load(config).unwrap_or_else(|err| {
            log::error!("Object detector unavailable: {err}");
            ObjectDetector::default()
        });
        Self::new(classifier, detector, config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::tests::{raw, ScriptedEngine};
    use crate::scene::tests::MeanColorEngine;
    use crate::vocabulary::ClassNameResolver;
    use image::{Rgb, RgbImage};

    const CATALOGUE: &str = r#"{"OBJECT": [1, 0, 0], "TEXT": [0, 1, 0], "SCENERY": [0, 0, 1]}"#;

    fn pipeline() -> ScenarioPipeline<MeanColorEngine, ScriptedEngine> {
        let mut classifier = SceneClassifier::new();
        classifier.initialize(MeanColorEngine::nchw_u8(), CATALOGUE).unwrap();
        let detector = ObjectDetector::with_engine(
            ScriptedEngine::new(vec![raw(39, 0.2, 5.0), raw(41, 0.9, 6.0), raw(0, 0.05, 7.0)]),
            ClassNameResolver::coco(),
        );
        ScenarioPipeline::new(classifier, detector, &VisionConfig::default())
    }

    fn solid(r: u8, g: u8, b: u8) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 8, Rgb([r, g, b])))
    }

    #[test]
    fn object_scene_runs_low_threshold_detection() {
        let outcome = pipeline().analyze(&solid(220, 10, 10));
        assert!(outcome.scene.is("OBJECT"));
        let SceneAction::Objects(dets) = &outcome.action else {
            panic!("expected objects, got {:?}", outcome.action);
        };
        assert_eq!(dets.len(), 2);
        assert_eq!(outcome.headline(), Some("bottle"));
    }

    #[test]
    fn text_scene_asks_for_ocr() {
        let outcome = pipeline().analyze(&solid(10, 220, 10));
        assert!(outcome.scene.is("TEXT"));
        assert_eq!(outcome.action, SceneAction::ExtractText);
        assert_eq!(outcome.headline(), None);
    }

    #[test]
    fn other_scenes_do_nothing() {
        let outcome = pipeline().analyze(&solid(10, 10, 220));
        assert_eq!(outcome.scene, SceneLabel::Scene("SCENERY".into()));
        assert_eq!(outcome.action, SceneAction::None);
    }

    #[test]
    fn released_detector_gives_empty_object_list() {
        let mut pipeline = pipeline();
        pipeline.detector_mut().release();
        let outcome = pipeline.analyze(&solid(220, 10, 10));
        assert_eq!(outcome.action, SceneAction::Objects(Vec::new()));
        assert_eq!(outcome.headline(), None);
    }

    fn engine_calls(pipeline: &ScenarioPipeline<MeanColorEngine, ScriptedEngine>) -> usize {
        pipeline.detector.engine().map_or(0, |e| e.calls)
    }

    #[test]
    fn matching_requests_reuse_scenario_detections() {
        let mut pipeline = pipeline();
        let image = solid(220, 10, 10);
        let outcome = pipeline.analyze(&image);
        assert_eq!(engine_calls(&pipeline), 1);

        let threshold = pipeline.detection_threshold();
        let found = pipeline.find_objects(&image, &outcome, None, threshold);
        assert_eq!(engine_calls(&pipeline), 1);
        assert_eq!(SceneAction::Objects(found), outcome.action);

        let cups = pipeline.find_objects(&image, &outcome, Some("cup"), threshold);
        assert_eq!(engine_calls(&pipeline), 2);
        assert_eq!(cups.len(), 1);
        assert_eq!(cups[0].class_id, 41);
    }

    #[test]
    fn other_scenes_run_the_detector_once() {
        let mut pipeline = pipeline();
        let image = solid(10, 220, 10);
        let outcome = pipeline.analyze(&image);
        assert_eq!(engine_calls(&pipeline), 0);
        let found = pipeline.find_objects(&image, &outcome, None, 0.25);
        assert_eq!(engine_calls(&pipeline), 1);
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn missing_detector_is_skipped() {
        let mut pipeline = pipeline();
        pipeline.detector_mut().release();
        let image = solid(10, 220, 10);
        let outcome = pipeline.analyze(&image);
        assert!(pipeline.find_objects(&image, &outcome, Some("cup"), 0.25).is_empty());
    }
}
