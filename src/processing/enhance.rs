//! Fixed photo enhancement applied to durable shots before they are saved.

use image::RgbaImage;
use image::imageops;

use crate::config::EnhanceConfig;
use crate::processing::color::{blend_channel, luma, mean_luma, rgba};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnhanceParams {
    pub brightness: f32,
    pub contrast: f32,
    pub saturation: f32,
    pub border_size: u32,
    pub border_color: [u8; 3],
}

impl From<&EnhanceConfig> for EnhanceParams {
    fn from(cfg: &EnhanceConfig) -> Self {
        Self {
            brightness: cfg.brightness,
            contrast: cfg.contrast,
            saturation: cfg.saturation,
            border_size: cfg.border_size,
            border_color: cfg.border_color,
        }
    }
}

pub trait Enhancer: Send + Sync {
    fn enhance(&self, image: &RgbaImage, params: &EnhanceParams) -> RgbaImage;
}

/// Brightness, contrast and saturation boosts followed by a solid border.
///
/// Each adjustment blends the image against a degenerate version of itself:
/// black for brightness, the mean grey level for contrast and the per-pixel
/// grey value for saturation. A factor of 1.0 leaves the image unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct ColorEnhancer;

impl Enhancer for ColorEnhancer {
    fn enhance(&self, image: &RgbaImage, params: &EnhanceParams) -> RgbaImage {
        let mut out = image.clone();
        adjust_brightness(&mut out, params.brightness);
        adjust_contrast(&mut out, params.contrast);
        adjust_saturation(&mut out, params.saturation);
        add_border(&out, params.border_size, params.border_color)
    }
}

pub fn adjust_brightness(image: &mut RgbaImage, factor: f32) {
    for pixel in image.pixels_mut() {
        for channel in pixel.0.iter_mut().take(3) {
            *channel = blend_channel(0.0, *channel, factor);
        }
    }
}

pub fn adjust_contrast(image: &mut RgbaImage, factor: f32) {
    let mean = mean_luma(image).round();
    for pixel in image.pixels_mut() {
        for channel in pixel.0.iter_mut().take(3) {
            *channel = blend_channel(mean, *channel, factor);
        }
    }
}

pub fn adjust_saturation(image: &mut RgbaImage, factor: f32) {
    for pixel in image.pixels_mut() {
        let grey = luma(pixel).round();
        for channel in pixel.0.iter_mut().take(3) {
            *channel = blend_channel(grey, *channel, factor);
        }
    }
}

pub fn add_border(image: &RgbaImage, size: u32, color: [u8; 3]) -> RgbaImage {
    if size == 0 {
        return image.clone();
    }
    let (w, h) = image.dimensions();
    let mut framed = RgbaImage::from_pixel(w + size * 2, h + size * 2, rgba(color));
    imageops::replace(&mut framed, image, i64::from(size), i64::from(size));
    framed
}
