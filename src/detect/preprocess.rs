//! Letterbox an image into a square NCHW tensor for YOLO-style models.

use image::{DynamicImage, GenericImageView, imageops::FilterType};
use ndarray::Array4;

/// Padding gray, as a raw channel value.
pub const PAD_VALUE: u8 = 114;

/// How an image was fitted into the model input. Used to map boxes back.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    pub scale: f32,
    pub pad_x: f32,
    pub pad_y: f32,
    pub width: u32,
    pub height: u32,
}

impl Letterbox {
    /// Fit a `width` x `height` image into a `size` square, centered.
    pub fn fit(width: u32, height: u32, size: u32) -> Self {
        if width == 0 || height == 0 {
            return Self {
                scale: 1.0,
                pad_x: 0.0,
                pad_y: 0.0,
                width,
                height,
            };
        }
        let scale = (size as f32 / width as f32).min(size as f32 / height as f32);
        let (new_w, new_h) = Self::resized_dims(width, height, scale);
        Self {
            scale,
            pad_x: (size.saturating_sub(new_w) / 2) as f32,
            pad_y: (size.saturating_sub(new_h) / 2) as f32,
            width,
            height,
        }
    }

    fn resized_dims(width: u32, height: u32, scale: f32) -> (u32, u32) {
        let new_w = ((width as f32 * scale).round() as u32).max(1);
        let new_h = ((height as f32 * scale).round() as u32).max(1);
        (new_w, new_h)
    }

    /// Map a box from model-input space back to clipped image pixels.
    pub fn to_image(&self, bbox: [f32; 4]) -> [f32; 4] {
        let w = self.width as f32;
        let h = self.height as f32;
        [
            ((bbox[0] - self.pad_x) / self.scale).clamp(0.0, w),
            ((bbox[1] - self.pad_y) / self.scale).clamp(0.0, h),
            ((bbox[2] - self.pad_x) / self.scale).clamp(0.0, w),
            ((bbox[3] - self.pad_y) / self.scale).clamp(0.0, h),
        ]
    }
}

/// Resize with aspect ratio kept, pad with gray, scale to `[0, 1]`,
/// and lay out as `[1, 3, size, size]` RGB.
pub fn letterbox(image: &DynamicImage, size: u32) -> (Array4<f32>, Letterbox) {
    let (width, height) = image.dimensions();
    let fit = Letterbox::fit(width, height, size);

    let side = size as usize;
    let mut tensor = Array4::from_elem((1, 3, side, side), PAD_VALUE as f32 / 255.0);

    if width == 0 || height == 0 {
        return (tensor, fit);
    }

    let (new_w, new_h) = Letterbox::resized_dims(width, height, fit.scale);
    let rgb = image
        .resize_exact(new_w, new_h, FilterType::Triangle)
        .to_rgb8();

    let off_x = fit.pad_x as usize;
    let off_y = fit.pad_y as usize;
    for (x, y, pixel) in rgb.enumerate_pixels() {
        let (tx, ty) = (x as usize + off_x, y as usize + off_y);
        if tx >= side || ty >= side {
            continue;
        }
        for c in 0..3 {
            tensor[[0, c, ty, tx]] = pixel[c] as f32 / 255.0;
        }
    }

    (tensor, fit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn fit_wide_image_pads_vertically() {
        let fit = Letterbox::fit(1280, 640, 640);
        assert_eq!(fit.scale, 0.5);
        assert_eq!(fit.pad_x, 0.0);
        assert_eq!(fit.pad_y, 160.0);
    }

    #[test]
    fn fit_square_image_has_no_padding() {
        let fit = Letterbox::fit(320, 320, 640);
        assert_eq!(fit.scale, 2.0);
        assert_eq!(fit.pad_x, 0.0);
        assert_eq!(fit.pad_y, 0.0);
    }

    #[test]
    fn to_image_undoes_letterbox() {
        let fit = Letterbox::fit(1280, 640, 640);
        let bbox = fit.to_image([100.0, 260.0, 200.0, 360.0]);
        assert_eq!(bbox, [200.0, 200.0, 400.0, 400.0]);
    }

    #[test]
    fn to_image_clips_to_bounds() {
        let fit = Letterbox::fit(1280, 640, 640);
        let bbox = fit.to_image([-10.0, 0.0, 700.0, 640.0]);
        assert_eq!(bbox, [0.0, 0.0, 1280.0, 640.0]);
    }

    #[test]
    fn letterbox_tensor_shape_and_padding() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(64, 32, Rgb([255, 0, 0])));
        let (tensor, fit) = letterbox(&image, 64);

        assert_eq!(tensor.shape(), &[1, 3, 64, 64]);
        assert_eq!(fit.pad_y, 16.0);

        let pad = PAD_VALUE as f32 / 255.0;
        // Top band is padding
        assert_eq!(tensor[[0, 0, 0, 0]], pad);
        // Center is the red image
        assert_eq!(tensor[[0, 0, 32, 32]], 1.0);
        assert_eq!(tensor[[0, 1, 32, 32]], 0.0);
        assert_eq!(tensor[[0, 2, 32, 32]], 0.0);
    }

    #[test]
    fn letterbox_empty_image_is_all_padding() {
        let image = DynamicImage::ImageRgb8(RgbImage::new(0, 0));
        let (tensor, _) = letterbox(&image, 32);
        let pad = PAD_VALUE as f32 / 255.0;
        assert!(tensor.iter().all(|&v| v == pad));
    }
}
