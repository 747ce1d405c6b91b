use image::{Rgba, RgbaImage};

/// ITU-R 601 luma of one pixel, 0..=255.
pub fn luma(pixel: &Rgba<u8>) -> f32 {
    (f32::from(pixel[0]) * 299.0 + f32::from(pixel[1]) * 587.0 + f32::from(pixel[2]) * 114.0)
        / 1000.0
}

/// Mean luma over the opaque part of the image, weighted by alpha.
pub fn mean_luma(img: &RgbaImage) -> f32 {
    let mut accum = 0f64;
    let mut total = 0f64;
    for pixel in img.pixels() {
        let alpha = f64::from(pixel[3]) / 255.0;
        if alpha <= 0.0 {
            continue;
        }
        total += alpha;
        accum += f64::from(luma(pixel)) * alpha;
    }
    if total <= f64::EPSILON {
        return 0.0;
    }
    (accum / total) as f32
}

/// Linear interpolation from `degenerate` towards `value` by `factor`;
/// factors above 1.0 extrapolate away from the degenerate value.
pub fn blend_channel(degenerate: f32, value: u8, factor: f32) -> u8 {
    let out = degenerate + (f32::from(value) - degenerate) * factor;
    out.round().clamp(0.0, 255.0) as u8
}

pub fn rgba(rgb: [u8; 3]) -> Rgba<u8> {
    Rgba([rgb[0], rgb[1], rgb[2], 255])
}
