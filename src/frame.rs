use crate::error::DetectionError;
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::SystemTime;

/// Pixel layout of a camera frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrameFormat {
    /// One JPEG image per frame
    Mjpeg,
    /// Packed 8-bit RGB, row-major, no padding
    Rgb24,
}

/// One camera frame. The pixel buffer is shared so frames clone cheaply
/// across the blocking preprocessing boundary.
#[derive(Debug, Clone)]
pub struct FrameData {
    /// Increasing per source
    pub id: u64,
    pub captured_at: SystemTime,
    pub data: Arc<Vec<u8>>,
    pub width: u32,
    pub height: u32,
    pub format: FrameFormat,
}

impl FrameData {
    pub fn new(
        id: u64,
        captured_at: SystemTime,
        data: Vec<u8>,
        width: u32,
        height: u32,
        format: FrameFormat,
    ) -> Self {
        Self {
            id,
            captured_at,
            data: Arc::new(data),
            width,
            height,
            format,
        }
    }

    /// All-black RGB frame, used by replay sources and tests
    pub fn blank(id: u64, width: u32, height: u32) -> Self {
        let len = rgb24_len(width, height);
        Self::new(
            id,
            SystemTime::now(),
            vec![0u8; len],
            width,
            height,
            FrameFormat::Rgb24,
        )
    }

    /// Decode into an RGB image. Both formats must match their declared
    /// dimensions exactly, since board geometry is fitted to them.
    pub fn to_rgb_image(&self) -> Result<RgbImage, DetectionError> {
        if self.width == 0 || self.height == 0 {
            return Err(self.malformed("has zero dimension".to_string()));
        }

        match self.format {
            FrameFormat::Mjpeg => {
                let img = image::load_from_memory(&self.data)
                    .map_err(|e| self.malformed(format!("JPEG decode failed: {}", e)))?
                    .to_rgb8();
                if img.dimensions() != (self.width, self.height) {
                    return Err(self.malformed(format!(
                        "decodes to {}x{}, declared {}x{}",
                        img.width(),
                        img.height(),
                        self.width,
                        self.height
                    )));
                }
                Ok(img)
            }
            FrameFormat::Rgb24 => {
                let expected = rgb24_len(self.width, self.height);
                if self.data.len() != expected {
                    return Err(self.malformed(format!(
                        "has {} bytes, {}x{} RGB needs {}",
                        self.data.len(),
                        self.width,
                        self.height,
                        expected
                    )));
                }
                RgbImage::from_raw(self.width, self.height, self.data.as_ref().clone())
                    .ok_or_else(|| self.malformed("buffer rejected".to_string()))
            }
        }
    }

    fn malformed(&self, what: String) -> DetectionError {
        DetectionError::MalformedFrame {
            details: format!("frame {} {}", self.id, what),
        }
    }
}

fn rgb24_len(width: u32, height: u32) -> usize {
    width as usize * height as usize * 3
}
