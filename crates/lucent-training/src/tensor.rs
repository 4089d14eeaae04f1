use crate::error::{TrainingError, TrainingResult};
use rand::Rng;
use std::path::Path;

/// How files of the run's single inferred extension are decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeKind {
    /// 8-bit formats decoded to RGB and normalized into [0,1] by 255.
    Standard,
    /// High-dynamic-range EXR, decoded to native floats with no rescaling.
    Hdr,
}

impl DecodeKind {
    /// Resolve the decode strategy for a file extension (case-insensitive).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" | "png" | "bmp" => Some(Self::Standard),
            "exr" => Some(Self::Hdr),
            _ => None,
        }
    }
}

/// A 3-channel float image in HWC layout.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageTensor {
    pub height: usize,
    pub width: usize,
    pub data: Vec<f32>,
}

impl ImageTensor {
    pub const CHANNELS: usize = 3;

    pub fn zeros(height: usize, width: usize) -> Self {
        Self { height, width, data: vec![0.0; height * width * Self::CHANNELS] }
    }

    pub fn from_data(height: usize, width: usize, data: Vec<f32>) -> Self {
        debug_assert_eq!(data.len(), height * width * Self::CHANNELS);
        Self { height, width, data }
    }

    #[inline]
    pub fn get(&self, y: usize, x: usize, c: usize) -> f32 {
        self.data[(y * self.width + x) * Self::CHANNELS + c]
    }

    #[inline]
    pub fn set(&mut self, y: usize, x: usize, c: usize, value: f32) {
        self.data[(y * self.width + x) * Self::CHANNELS + c] = value;
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Decode an image file according to the run's decode strategy.
    pub fn decode(path: &Path, kind: DecodeKind) -> TrainingResult<Self> {
        let dynamic = image::open(path)?;
        let tensor = match kind {
            DecodeKind::Standard => {
                let rgb = dynamic.to_rgb8();
                let (w, h) = rgb.dimensions();
                let data = rgb.into_raw().iter().map(|&v| f32::from(v) / 255.0).collect();
                Self::from_data(h as usize, w as usize, data)
            }
            DecodeKind::Hdr => {
                let rgb = dynamic.to_rgb32f();
                let (w, h) = rgb.dimensions();
                Self::from_data(h as usize, w as usize, rgb.into_raw())
            }
        };
        Ok(tensor)
    }

    /// Extract a square crop with its top-left corner at `(y0, x0)`.
    pub fn crop(&self, y0: usize, x0: usize, size: usize) -> Self {
        debug_assert!(y0 + size <= self.height && x0 + size <= self.width);
        let mut out = Self::zeros(size, size);
        for y in 0..size {
            let src = ((y0 + y) * self.width + x0) * Self::CHANNELS;
            let dst = y * size * Self::CHANNELS;
            out.data[dst..dst + size * Self::CHANNELS]
                .copy_from_slice(&self.data[src..src + size * Self::CHANNELS]);
        }
        out
    }

    /// Bilinear resize to an exact target resolution.
    ///
    /// Non-integral scale ratios degrade gracefully through the
    /// interpolation; they are never an error.
    pub fn resize_bilinear(&self, height: usize, width: usize) -> Self {
        if height == self.height && width == self.width {
            return self.clone();
        }
        let mut out = Self::zeros(height, width);
        let sy = self.height as f32 / height as f32;
        let sx = self.width as f32 / width as f32;
        for y in 0..height {
            // Sample at pixel centers.
            let fy = ((y as f32 + 0.5) * sy - 0.5).max(0.0);
            let y0 = (fy as usize).min(self.height - 1);
            let y1 = (y0 + 1).min(self.height - 1);
            let wy = fy - y0 as f32;
            for x in 0..width {
                let fx = ((x as f32 + 0.5) * sx - 0.5).max(0.0);
                let x0 = (fx as usize).min(self.width - 1);
                let x1 = (x0 + 1).min(self.width - 1);
                let wx = fx - x0 as f32;
                for c in 0..Self::CHANNELS {
                    let top = self.get(y0, x0, c) * (1.0 - wx) + self.get(y0, x1, c) * wx;
                    let bottom = self.get(y1, x0, c) * (1.0 - wx) + self.get(y1, x1, c) * wx;
                    out.set(y, x, c, top * (1.0 - wy) + bottom * wy);
                }
            }
        }
        out
    }

    /// Quantize the unit-range float image to an 8-bit RGB buffer.
    pub fn to_rgb8(&self) -> image::RgbImage {
        let mut out = image::RgbImage::new(self.width as u32, self.height as u32);
        for y in 0..self.height {
            for x in 0..self.width {
                let px = image::Rgb([
                    (self.get(y, x, 0) * 255.0).clamp(0.0, 255.0) as u8,
                    (self.get(y, x, 1) * 255.0).clamp(0.0, 255.0) as u8,
                    (self.get(y, x, 2) * 255.0).clamp(0.0, 255.0) as u8,
                ]);
                out.put_pixel(x as u32, y as u32, px);
            }
        }
        out
    }
}

/// Crop both images of a pair with a single jointly drawn offset, so the
/// geometric alignment between input and ground truth is preserved.
///
/// Sources smaller than the crop size are a configuration error; no padding
/// is applied.
pub fn joint_random_crop<R: Rng>(
    input: &ImageTensor,
    ground_truth: &ImageTensor,
    size: usize,
    rng: &mut R,
) -> TrainingResult<(ImageTensor, ImageTensor)> {
    if input.height != ground_truth.height || input.width != ground_truth.width {
        return Err(TrainingError::Configuration(format!(
            "input ({}x{}) and ground truth ({}x{}) dimensions differ within a pair",
            input.width, input.height, ground_truth.width, ground_truth.height
        )));
    }
    if input.height < size || input.width < size {
        return Err(TrainingError::Configuration(format!(
            "source image {}x{} is smaller than the crop size {}",
            input.width, input.height, size
        )));
    }
    let y0 = rng.gen_range(0..=input.height - size);
    let x0 = rng.gen_range(0..=input.width - size);
    Ok((input.crop(y0, x0, size), ground_truth.crop(y0, x0, size)))
}
