use crate::models::Detection;
use serde::{Deserialize, Serialize};

/// Caption padding around the label text, in view pixels.
const LABEL_PAD_X: f32 = 16.0;
const LABEL_PAD_Y: f32 = 8.0;

/// Uniform "contain" fit of an image inside a view, centred on both axes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LetterboxTransform {
    pub scale: f32,
    pub offset_x: f32,
    pub offset_y: f32,
}

impl LetterboxTransform {
    /// `None` when either image dimension is zero.
    pub fn contain(
        image_width: u32,
        image_height: u32,
        view_width: f32,
        view_height: f32,
    ) -> Option<Self> {
        if image_width == 0 || image_height == 0 {
            return None;
        }
        let (iw, ih) = (image_width as f32, image_height as f32);
        let scale = (view_width / iw).min(view_height / ih);
        Some(Self {
            scale,
            offset_x: (view_width - iw * scale) / 2.0,
            offset_y: (view_height - ih * scale) / 2.0,
        })
    }

    pub fn map_x(&self, x: f32) -> f32 {
        self.offset_x + x * self.scale
    }

    pub fn map_y(&self, y: f32) -> f32 {
        self.offset_y + y * self.scale
    }

    pub fn apply(&self, det: &Detection) -> OverlayDetection {
        OverlayDetection {
            class_id: det.class_id,
            class_name: det.class_name.clone(),
            confidence: det.confidence,
            x: self.map_x(det.x),
            y: self.map_y(det.y),
            width: det.width * self.scale,
            height: det.height * self.scale,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

/// A detection in destination-view pixels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverlayDetection {
    pub class_id: i32,
    pub class_name: String,
    pub confidence: f32,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl OverlayDetection {
    pub fn rect(&self) -> Rect {
        Rect {
            left: self.x,
            top: self.y,
            right: self.x + self.width,
            bottom: self.y + self.height,
        }
    }

    /// Caption such as `cup 87%`; the percentage is truncated.
    pub fn label(&self) -> String {
        format!("{} {}%", self.class_name, (self.confidence * 100.0) as i32)
    }

    /// Background of the caption, sitting on top of the box's upper-left corner.
    pub fn label_box(&self, text_width: f32, text_height: f32) -> Rect {
        Rect {
            left: self.x,
            top: self.y - text_height - LABEL_PAD_Y,
            right: self.x + text_width + LABEL_PAD_X,
            bottom: self.y,
        }
    }
}

/// Maps image-space detections into a view that shows the image letterboxed.
pub fn map_to_view(
    detections: &[Detection],
    image_width: u32,
    image_height: u32,
    view_width: f32,
    view_height: f32,
) -> Vec<OverlayDetection> {
    if detections.is_empty() {
        return Vec::new();
    }
    match LetterboxTransform::contain(image_width, image_height, view_width, view_height) {
        Some(fit) => detections.iter().map(|d| fit.apply(d)).collect(),
        None => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(x: f32, y: f32, w: f32, h: f32) -> Detection {
        Detection {
            class_id: 41,
            class_name: "cup".into(),
            confidence: 0.876,
            x,
            y,
            width: w,
            height: h,
        }
    }

    #[test]
    fn wide_image_in_square_view() {
        let fit = LetterboxTransform::contain(1000, 500, 500.0, 500.0).unwrap();
        assert_eq!(fit.scale, 0.5);
        assert_eq!(fit.offset_x, 0.0);
        assert_eq!(fit.offset_y, 125.0);

        let mapped = map_to_view(&[det(100.0, 100.0, 50.0, 50.0)], 1000, 500, 500.0, 500.0);
        assert_eq!(mapped.len(), 1);
        let m = &mapped[0];
        assert_eq!((m.x, m.y, m.width, m.height), (50.0, 175.0, 25.0, 25.0));
        assert_eq!(m.class_name, "cup");
    }

    #[test]
    fn tall_image_is_centred_horizontally() {
        let fit = LetterboxTransform::contain(300, 600, 400.0, 300.0).unwrap();
        assert_eq!(fit.scale, 0.5);
        assert_eq!((fit.offset_x, fit.offset_y), (125.0, 0.0));
    }

    #[test]
    fn zero_dimensions_or_no_detections_map_to_nothing() {
        assert!(map_to_view(&[det(1.0, 1.0, 1.0, 1.0)], 0, 500, 500.0, 500.0).is_empty());
        assert!(map_to_view(&[det(1.0, 1.0, 1.0, 1.0)], 500, 0, 500.0, 500.0).is_empty());
        assert!(map_to_view(&[], 500, 500, 500.0, 500.0).is_empty());
    }

    #[test]
    fn mapping_is_deterministic() {
        let dets = vec![det(10.0, 20.0, 30.0, 40.0), det(0.0, 0.0, 640.0, 480.0)];
        let a = map_to_view(&dets, 640, 480, 1080.0, 1920.0);
        let b = map_to_view(&dets, 640, 480, 1080.0, 1920.0);
        assert_eq!(a, b);
        assert_eq!(a.len(), 2);
    }

    #[test]
    fn caption_and_label_box() {
        let mapped = map_to_view(&[det(100.0, 100.0, 50.0, 50.0)], 1000, 500, 500.0, 500.0);
        let m = &mapped[0];
        assert_eq!(m.label(), "cup 87%");
        assert_eq!(
            m.rect(),
            Rect { left: 50.0, top: 175.0, right: 75.0, bottom: 200.0 }
        );
        assert_eq!(
            m.label_box(60.0, 20.0),
            Rect { left: 50.0, top: 147.0, right: 126.0, bottom: 175.0 }
        );
    }
}
