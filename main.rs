use clap::Parser;
use serde::Serialize;
use std::path::{Path, PathBuf};
use vision_matrix::error::Result;
use vision_matrix::scan::collect_images;
use vision_matrix::{
    map_to_view, Detection, OverlayDetection, ScenarioPipeline, SceneAction, VisionConfig,
};

/// Names the scene of each image and finds objects in it.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSON config; model paths are relative to its directory
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
    /// Only report this class (English name or alias, e.g. "cup" or "杯子")
    #[arg(long)]
    query: Option<String>,
    /// Detection confidence threshold; defaults to the configured one
    #[arg(long)]
    threshold: Option<f32>,
    /// Map boxes into a view of this size, e.g. 1080x1920
    #[arg(long, value_name = "WxH", value_parser = parse_view)]
    view: Option<(f32, f32)>,
    /// Image file or directory
    input: PathBuf,
}

fn parse_view(raw: &str) -> std::result::Result<(f32, f32), String> {
    let (w, h) = raw
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WxH, got {raw}"))?;
    let w: f32 = w.trim().parse().map_err(|e| format!("bad width {w}: {e}"))?;
    let h: f32 = h.trim().parse().map_err(|e| format!("bad height {h}: {e}"))?;
    if w <= 0.0 || h <= 0.0 {
        return Err(format!("view must be positive, got {raw}"));
    }
    Ok((w, h))
}

#[derive(Serialize)]
struct Overlay {
    label: String,
    #[serde(flatten)]
    detection: OverlayDetection,
}

#[derive(Serialize)]
struct Report {
    path: String,
    scene: String,
    action: &'static str,
    headline: Option<String>,
    detections: Vec<Detection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    overlays: Option<Vec<Overlay>>,
}

fn main() -> Result<()> {
    env_logger::init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => VisionConfig::load(path)?,
        None => VisionConfig::default(),
    };
    let threshold = args.threshold.unwrap_or(config.detection_confidence_threshold);

    let images = collect_images(&args.input)?;
    log::info!("Found {} images under {}", images.len(), args.input.display());

    let mut pipeline = ScenarioPipeline::load(&config);
    for path in &images {
        match analyze(&mut pipeline, path, &args, threshold) {
            Ok(report) => println!("{}", serde_json::to_string(&report)?),
            Err(err) => log::warn!("Skipping {}: {err}", path.display()),
        }
    }
    Ok(())
}

fn analyze<C, D>(
    pipeline: &mut ScenarioPipeline<C, D>,
    path: &Path,
    args: &Args,
    threshold: f32,
) -> Result<Report>
where
    C: vision_matrix::engine::EmbeddingEngine,
    D: vision_matrix::engine::DetectionEngine,
{
    let image = image::open(path)?;
    let outcome = pipeline.analyze(&image);
    let detections = pipeline.find_objects(&image, &outcome, args.query.as_deref(), threshold);
    let overlays = args.view.map(|(view_w, view_h)| {
        map_to_view(&detections, image.width(), image.height(), view_w, view_h)
            .into_iter()
            .map(|detection| Overlay {
                label: detection.label(),
                detection,
            })
            .collect()
    });
    let action = match &outcome.action {
        SceneAction::Objects(_) => "objects",
        SceneAction::ExtractText => "extract_text",
        SceneAction::None => "none",
    };
    Ok(Report {
        path: path.display().to_string(),
        scene: outcome.scene.to_string(),
        action,
        headline: outcome.headline().map(str::to_string),
        detections,
        overlays,
    })
}
