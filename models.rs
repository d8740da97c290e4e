use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Axis order of a 4-d image tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TensorLayout {
    /// Channel-major: `[batch, channels, height, width]`.
    Nchw,
    /// Channel-minor: `[batch, height, width, channels]`.
    Nhwc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElementType {
    Uint8,
    Float32,
}

impl ElementType {
    pub fn byte_width(self) -> usize {
        match self {
            Self::Uint8 => 1,
            Self::Float32 => 4,
        }
    }
}

/// Declared input of an embedding model, as reported by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputSpec {
    pub name: String,
    pub shape: Vec<i64>,
    pub element_type: ElementType,
}

/// Numeric layout an engine expects for its single image input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TensorDescriptor {
    pub layout: TensorLayout,
    pub height: u32,
    pub width: u32,
    pub channels: u32,
    pub element_type: ElementType,
}

impl TensorDescriptor {
    /// Derives the descriptor from a declared `[N, C, H, W]` or `[N, H, W, C]` shape.
    ///
    /// Dynamic dimensions (declared `<= 0`) are pinned to 1. The layout is the one
    /// whose channel axis holds 1 or 3, checking the NCHW position first.
    pub fn from_shape(shape: &[i64], element_type: ElementType) -> Result<Self> {
        if shape.len() != 4 {
            return Err(Error::Init(format!(
                "Expected a 4-d image input, got shape {shape:?}"
            )));
        }
        let dims = shape
            .iter()
            .map(|&d| {
                if d <= 0 {
                    Ok(1)
                } else {
                    u32::try_from(d).map_err(|_| {
                        Error::Init(format!("Input dimension {d} in {shape:?} is too large"))
                    })
                }
            })
            .collect::<Result<Vec<u32>>>()?;
        let is_channels = |d: u32| d == 1 || d == 3;
        if is_channels(dims[1]) {
            Ok(Self {
                layout: TensorLayout::Nchw,
                channels: dims[1],
                height: dims[2],
                width: dims[3],
                element_type,
            })
        } else if is_channels(dims[3]) {
            Ok(Self {
                layout: TensorLayout::Nhwc,
                height: dims[1],
                width: dims[2],
                channels: dims[3],
                element_type,
            })
        } else {
            Err(Error::Init(format!(
                "Cannot find a 1- or 3-channel axis in input shape {shape:?}"
            )))
        }
    }

    /// Tensor shape with a batch of one, in layout order.
    pub fn shape(&self) -> [usize; 4] {
        let (c, h, w) = (
            self.channels as usize,
            self.height as usize,
            self.width as usize,
        );
        match self.layout {
            TensorLayout::Nchw => [1, c, h, w],
            TensorLayout::Nhwc => [1, h, w, c],
        }
    }

    pub fn element_count(&self) -> usize {
        self.channels as usize * self.height as usize * self.width as usize
    }

    pub fn byte_len(&self) -> usize {
        self.element_count() * self.element_type.byte_width()
    }
}

/// Best library entry for a query embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneMatch {
    pub label: String,
    pub score: f32,
}

/// Detection as reported by a detection engine; the class name is optional.
#[derive(Debug, Clone, PartialEq)]
pub struct RawDetection {
    pub class_id: i32,
    pub class_name: Option<String>,
    pub confidence: f32,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// Box in the pixel space of the analysed image, origin top-left.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub class_id: i32,
    pub class_name: String,
    pub confidence: f32,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}
