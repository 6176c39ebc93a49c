use super::scorer::InputTensor;
use crate::error::DetectionError;
use crate::frame::FrameData;
use image::{imageops, Rgb, RgbImage};
use tracing::trace;

/// Grey used for letterbox padding
const PAD_VALUE: u8 = 114;

/// Aspect-preserving resize plus centred padding into the model's input size.
/// Kept alongside each tensor so box coordinates can be mapped back to the frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    pub scale: f32,
    pub pad_x: u32,
    pub pad_y: u32,
    pub resized_width: u32,
    pub resized_height: u32,
    pub input_width: u32,
    pub input_height: u32,
}

impl Letterbox {
    pub fn fit(frame_width: u32, frame_height: u32, input_width: u32, input_height: u32) -> Self {
        let scale = (input_width as f32 / frame_width as f32)
            .min(input_height as f32 / frame_height as f32);
        let resized_width = ((frame_width as f32 * scale).round() as u32).clamp(1, input_width);
        let resized_height = ((frame_height as f32 * scale).round() as u32).clamp(1, input_height);

        Self {
            scale,
            pad_x: (input_width - resized_width) / 2,
            pad_y: (input_height - resized_height) / 2,
            resized_width,
            resized_height,
            input_width,
            input_height,
        }
    }

    /// Map a point from input-tensor pixels back to frame pixels
    pub fn to_frame(&self, x: f32, y: f32) -> (f32, f32) {
        (
            (x - self.pad_x as f32) / self.scale,
            (y - self.pad_y as f32) / self.scale,
        )
    }

    /// Map a point from frame pixels into input-tensor pixels
    pub fn to_input(&self, x: f32, y: f32) -> (f32, f32) {
        (
            x * self.scale + self.pad_x as f32,
            y * self.scale + self.pad_y as f32,
        )
    }
}

/// Decode `frame` and letterbox it into an `input_width` x `input_height` tensor
pub fn letterbox(
    frame: &FrameData,
    input_width: u32,
    input_height: u32,
) -> Result<(InputTensor, Letterbox), DetectionError> {
    let image = frame.to_rgb_image()?;
    let transform = Letterbox::fit(image.width(), image.height(), input_width, input_height);

    let resized = imageops::resize(
        &image,
        transform.resized_width,
        transform.resized_height,
        imageops::FilterType::Triangle,
    );
    let mut canvas = RgbImage::from_pixel(input_width, input_height, Rgb([PAD_VALUE; 3]));
    imageops::overlay(
        &mut canvas,
        &resized,
        transform.pad_x as i64,
        transform.pad_y as i64,
    );

    trace!(
        "Letterboxed frame {} {}x{} -> {}x{} (scale {:.3}, pad {}x{})",
        frame.id,
        image.width(),
        image.height(),
        input_width,
        input_height,
        transform.scale,
        transform.pad_x,
        transform.pad_y
    );

    Ok((to_tensor(&canvas), transform))
}

fn to_tensor(image: &RgbImage) -> InputTensor {
    let plane = (image.width() * image.height()) as usize;
    let mut data = vec![0.0f32; plane * 3];

    for (i, pixel) in image.pixels().enumerate() {
        for channel in 0..3 {
            data[channel * plane + i] = pixel[channel] as f32 / 255.0;
        }
    }

    InputTensor {
        width: image.width(),
        height: image.height(),
        data,
    }
}
