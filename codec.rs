use crate::error::{Error, Result};
use crate::models::{ElementType, TensorDescriptor, TensorLayout};
use image::imageops::FilterType;
use image::{DynamicImage, Rgb, RgbImage};

/// CLIP image normalisation, per RGB channel.
pub const CLIP_MEAN: [f32; 3] = [0.48145466, 0.4578275, 0.40821073];
pub const CLIP_STD: [f32; 3] = [0.26862954, 0.26130258, 0.27577711];

#[derive(Debug, Clone, PartialEq)]
pub enum TensorData {
    U8(Vec<u8>),
    F32(Vec<f32>),
}

impl TensorData {
    pub fn len(&self) -> usize {
        match self {
            Self::U8(v) => v.len(),
            Self::F32(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// An image laid out exactly as an engine input expects it.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedTensor {
    pub descriptor: TensorDescriptor,
    pub data: TensorData,
}

impl EncodedTensor {
    pub fn shape(&self) -> [usize; 4] {
        self.descriptor.shape()
    }

    /// Raw input buffer; floats are written little-endian.
    pub fn to_bytes(&self) -> Vec<u8> {
        match &self.data {
            TensorData::U8(v) => v.clone(),
            TensorData::F32(v) => serialize_f32(v),
        }
    }
}

/// Stretches `image` to the descriptor geometry and lays out its channels.
pub fn encode(image: &DynamicImage, descriptor: &TensorDescriptor) -> Result<EncodedTensor> {
    if image.width() == 0 || image.height() == 0 {
        return Err(Error::Codec(format!(
            "Cannot encode an empty {}x{} bitmap",
            image.width(),
            image.height()
        )));
    }
    let (w, h) = (descriptor.width, descriptor.height);
    let resized = if image.width() == w && image.height() == h {
        image.clone()
    } else {
        image.resize_exact(w, h, FilterType::Triangle)
    };
    let planes: Vec<Vec<u8>> = match descriptor.channels {
        3 => {
            let rgb = resized.to_rgb8();
            (0..3)
                .map(|c| rgb.pixels().map(|p| p[c]).collect())
                .collect()
        }
        1 => vec![resized.to_luma8().into_raw()],
        other => {
            return Err(Error::Codec(format!(
                "Unsupported channel count {other}; expected 1 or 3"
            )))
        }
    };
    let data = match descriptor.element_type {
        ElementType::Uint8 => TensorData::U8(interleave(&planes, descriptor.layout, |_, v| v)),
        ElementType::Float32 => TensorData::F32(interleave(&planes, descriptor.layout, |c, v| {
            (v as f32 / 255.0 - CLIP_MEAN[c]) / CLIP_STD[c]
        })),
    };
    if data.len() != descriptor.element_count() {
        return Err(Error::Codec(format!(
            "Encoded {} values, descriptor expects {}",
            data.len(),
            descriptor.element_count()
        )));
    }
    Ok(EncodedTensor {
        descriptor: *descriptor,
        data,
    })
}

/// Emits every plane in turn (NCHW) or one value per plane per pixel (NHWC).
fn interleave<T>(planes: &[Vec<u8>], layout: TensorLayout, map: impl Fn(usize, u8) -> T) -> Vec<T> {
    let pixels = planes.first().map(Vec::len).unwrap_or(0);
    let mut out = Vec::with_capacity(pixels * planes.len());
    match layout {
        TensorLayout::Nchw => {
            for (c, plane) in planes.iter().enumerate() {
                out.extend(plane.iter().map(|&v| map(c, v)));
            }
        }
        TensorLayout::Nhwc => {
            for idx in 0..pixels {
                for (c, plane) in planes.iter().enumerate() {
                    out.push(map(c, plane[idx]));
                }
            }
        }
    }
    out
}

/// Copies `output_len` floats out of an engine output buffer, untransformed.
pub fn decode(raw: &[f32], output_len: usize) -> Result<Vec<f32>> {
    if output_len == 0 || raw.len() != output_len {
        return Err(Error::Codec(format!(
            "Embedding buffer holds {} floats, expected {output_len}",
            raw.len()
        )));
    }
    Ok(raw.to_vec())
}

/// Same as [`decode`] for a little-endian byte buffer.
pub fn decode_bytes(raw: &[u8], output_len: usize) -> Result<Vec<f32>> {
    if output_len == 0 || raw.len() != output_len * 4 {
        return Err(Error::Codec(format!(
            "Embedding buffer holds {} bytes, expected {}",
            raw.len(),
            output_len * 4
        )));
    }
    Ok(deserialize_f32(raw))
}

/// Rebuilds the RGB bitmap a 3-channel uint8 encoding was produced from.
pub fn unpack_rgb8(encoded: &EncodedTensor) -> Result<RgbImage> {
    let desc = &encoded.descriptor;
    let TensorData::U8(data) = &encoded.data else {
        return Err(Error::Codec("Only uint8 tensors can be unpacked".into()));
    };
    if desc.channels != 3 || data.len() != desc.element_count() {
        return Err(Error::Codec(format!(
            "Cannot unpack {} bytes as a {}x{}x{} RGB tensor",
            data.len(),
            desc.width,
            desc.height,
            desc.channels
        )));
    }
    let (w, h) = (desc.width, desc.height);
    let plane = (w * h) as usize;
    let mut img = RgbImage::new(w, h);
    for (x, y, pixel) in img.enumerate_pixels_mut() {
        let idx = (y * w + x) as usize;
        *pixel = match desc.layout {
            TensorLayout::Nchw => Rgb([data[idx], data[idx + plane], data[idx + plane * 2]]),
            TensorLayout::Nhwc => Rgb([data[idx * 3], data[idx * 3 + 1], data[idx * 3 + 2]]),
        };
    }
    Ok(img)
}

pub fn serialize_f32(vec: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(vec.len() * 4);
    for v in vec {
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}

pub fn deserialize_f32(data: &[u8]) -> Vec<f32> {
    data.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(w: u32, h: u32) -> RgbImage {
        let mut img = RgbImage::new(w, h);
        for (x, y, pixel) in img.enumerate_pixels_mut() {
            *pixel = Rgb([(x * 40) as u8, (y * 60) as u8, (x * 7 + y * 11) as u8]);
        }
        img
    }

    fn descriptor(
        layout: TensorLayout,
        element_type: ElementType,
        w: u32,
        h: u32,
    ) -> TensorDescriptor {
        TensorDescriptor {
            layout,
            height: h,
            width: w,
            channels: 3,
            element_type,
        }
    }

    #[test]
    fn uint8_round_trip_is_lossless() {
        let img = gradient(4, 3);
        for layout in [TensorLayout::Nchw, TensorLayout::Nhwc] {
            let desc = descriptor(layout, ElementType::Uint8, 4, 3);
            let encoded = encode(&DynamicImage::ImageRgb8(img.clone()), &desc).unwrap();
            assert_eq!(encoded.to_bytes().len(), desc.byte_len());
            assert_eq!(unpack_rgb8(&encoded).unwrap(), img);
        }
    }

    #[test]
    fn nchw_emits_channel_planes() {
        let mut img = RgbImage::new(2, 1);
        img.put_pixel(0, 0, Rgb([1, 2, 3]));
        img.put_pixel(1, 0, Rgb([4, 5, 6]));
        let src = DynamicImage::ImageRgb8(img);

        let nchw = encode(&src, &descriptor(TensorLayout::Nchw, ElementType::Uint8, 2, 1)).unwrap();
        assert_eq!(nchw.data, TensorData::U8(vec![1, 4, 2, 5, 3, 6]));

        let nhwc = encode(&src, &descriptor(TensorLayout::Nhwc, ElementType::Uint8, 2, 1)).unwrap();
        assert_eq!(nhwc.data, TensorData::U8(vec![1, 2, 3, 4, 5, 6]));
    }

    #[test]
    fn float_encoding_applies_clip_normalisation() {
        let img = RgbImage::from_pixel(2, 2, Rgb([255, 0, 128]));
        let desc = descriptor(TensorLayout::Nhwc, ElementType::Float32, 2, 2);
        let encoded = encode(&DynamicImage::ImageRgb8(img), &desc).unwrap();
        let TensorData::F32(values) = &encoded.data else {
            panic!("expected float tensor");
        };
        assert_eq!(values.len(), 12);
        assert!((values[0] - (1.0 - CLIP_MEAN[0]) / CLIP_STD[0]).abs() < 1e-5);
        assert!((values[1] - (0.0 - CLIP_MEAN[1]) / CLIP_STD[1]).abs() < 1e-5);
        assert!((values[2] - (128.0 / 255.0 - CLIP_MEAN[2]) / CLIP_STD[2]).abs() < 1e-5);
        assert_eq!(encoded.to_bytes().len(), 48);
    }

    #[test]
    fn resize_stretches_to_model_geometry() {
        let img = RgbImage::from_pixel(30, 10, Rgb([9, 9, 9]));
        let desc = descriptor(TensorLayout::Nchw, ElementType::Uint8, 8, 8);
        let encoded = encode(&DynamicImage::ImageRgb8(img), &desc).unwrap();
        assert_eq!(encoded.data, TensorData::U8(vec![9; 8 * 8 * 3]));
    }

    #[test]
    fn single_channel_uses_luma() {
        let img = image::GrayImage::from_pixel(2, 2, image::Luma([200]));
        let desc = TensorDescriptor {
            channels: 1,
            ..descriptor(TensorLayout::Nchw, ElementType::Uint8, 2, 2)
        };
        let encoded = encode(&DynamicImage::ImageLuma8(img), &desc).unwrap();
        assert_eq!(encoded.data, TensorData::U8(vec![200; 4]));
    }

    #[test]
    fn empty_bitmap_is_a_codec_error() {
        let desc = descriptor(TensorLayout::Nchw, ElementType::Uint8, 2, 2);
        let err = encode(&DynamicImage::new_rgb8(0, 0), &desc).unwrap_err();
        assert!(matches!(err, Error::Codec(_)));
    }

    #[test]
    fn decode_checks_length() {
        assert_eq!(decode(&[0.5, -1.0], 2).unwrap(), vec![0.5, -1.0]);
        assert!(matches!(decode(&[0.5], 2), Err(Error::Codec(_))));
        let bytes = serialize_f32(&[1.5, 2.5, -3.0]);
        assert_eq!(decode_bytes(&bytes, 3).unwrap(), vec![1.5, 2.5, -3.0]);
        assert!(decode_bytes(&bytes[..10], 3).is_err());
    }
}
