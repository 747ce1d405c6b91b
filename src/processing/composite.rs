//! Builds the printable strip from the processed shots of a finished session.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use ab_glyph::{Font, FontArc, PxScale, ScaleFont, point};
use anyhow::{Context, Result, anyhow, bail, ensure};
use chrono::{DateTime, Local};
use fontdb::{Database, Family, Query, Source};
use image::imageops::{self, FilterType};
use image::{DynamicImage, Rgba, RgbaImage};
use tracing::{debug, info, warn};

use crate::config::{CompositeConfig, HeaderConfig};
use crate::processing::color::rgba;
use crate::processing::layout::{LayoutParams, Rect, StripLayout, compute_strip_layout};
use crate::session::FinalizedSession;

#[derive(Debug, Clone)]
pub struct CompositeArtifact {
    pub layout: StripLayout,
    pub output_path: PathBuf,
}

pub struct CompositeBuilder {
    cfg: CompositeConfig,
    total_shots: usize,
    font: Option<FontArc>,
}

impl std::fmt::Debug for CompositeBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositeBuilder")
            .field("cfg", &self.cfg)
            .field("total_shots", &self.total_shots)
            .field("font", &self.font.is_some())
            .finish()
    }
}

impl CompositeBuilder {
    /// A missing header font is not fatal: the band is still reserved, just left blank.
    pub fn new(cfg: CompositeConfig, total_shots: usize) -> Self {
        let font = if cfg.header.enabled {
            match load_font(&cfg.header) {
                Ok(font) => Some(font),
                Err(err) => {
                    warn!("header font unavailable, strips will have a blank header: {err:#}");
                    None
                }
            }
        } else {
            None
        };
        Self {
            cfg,
            total_shots,
            font,
        }
    }

    pub fn output_path_for(dir: &Path, session_id: &str) -> PathBuf {
        dir.join(format!("{session_id}_composite.jpg"))
    }

    /// Returns `Ok(None)` for ephemeral sessions, which have nothing on disk to compose.
    pub fn build(
        &self,
        session: &FinalizedSession,
        now: DateTime<Local>,
    ) -> Result<Option<CompositeArtifact>> {
        let Some(dir) = session.storage_target.path() else {
            debug!(session = %session.id, "ephemeral session; skipping composite");
            return Ok(None);
        };
        ensure!(
            session.shots.len() == self.total_shots,
            "session {} has {} shots, expected {}",
            session.id,
            session.shots.len(),
            self.total_shots
        );

        let mut photos = Vec::with_capacity(session.shots.len());
        for (position, shot) in session.shots.iter().enumerate() {
            ensure!(
                shot.index == position + 1,
                "shot {} out of order in session {}",
                shot.index,
                session.id
            );
            let path = shot
                .processed_path
                .as_ref()
                .ok_or_else(|| anyhow!("shot {} has no processed image", shot.index))?;
            let img = image::open(path)
                .with_context(|| format!("failed to read processed shot {}", path.display()))?
                .to_rgba8();
            photos.push(img);
        }
        let Some(first) = photos.first() else {
            bail!("session {} has no shots", session.id);
        };

        let params = LayoutParams::from(&self.cfg);
        let (w, h) = first.dimensions();
        let layout = compute_strip_layout(w, h, photos.len(), &params)
            .with_context(|| format!("cannot lay out strip for session {}", session.id))?;

        let mut canvas = render_composite(&photos, &layout, self.cfg.background);
        if let Some(band) = layout.header {
            let text = header_text(&self.cfg.header.format, now)?;
            if let Some(font) = self.font.as_ref() {
                draw_header(&mut canvas, font, &text, band, rgba(self.cfg.header.color));
            }
        }

        let output_path = Self::output_path_for(dir, &session.id);
        DynamicImage::ImageRgba8(canvas)
            .to_rgb8()
            .save(&output_path)
            .with_context(|| format!("failed to write composite {}", output_path.display()))?;
        info!(
            session = %session.id,
            path = %output_path.display(),
            photo_width = layout.photo_width,
            photo_height = layout.photo_height,
            "composite written"
        );
        Ok(Some(CompositeArtifact {
            layout,
            output_path,
        }))
    }
}

/// Renders the header timestamp, failing on patterns chrono cannot format.
pub fn header_text(format: &str, now: DateTime<Local>) -> Result<String> {
    let mut text = String::new();
    write!(text, "{}", now.format(format))
        .map_err(|_| anyhow!("invalid header format {format:?}"))?;
    Ok(text)
}

/// Paints each photo, resized to its slot, onto a background-filled canvas.
/// Photos beyond the number of slots are ignored.
pub fn render_composite(photos: &[RgbaImage], layout: &StripLayout, background: [u8; 3]) -> RgbaImage {
    let mut canvas = RgbaImage::from_pixel(layout.canvas_width, layout.canvas_height, rgba(background));
    for (photo, slot) in photos.iter().zip(&layout.slots) {
        let resized = if photo.dimensions() == (slot.width, slot.height) {
            photo.clone()
        } else {
            imageops::resize(photo, slot.width, slot.height, FilterType::Lanczos3)
        };
        imageops::overlay(&mut canvas, &resized, i64::from(slot.x), i64::from(slot.y));
    }
    canvas
}

fn draw_header(canvas: &mut RgbaImage, font: &FontArc, text: &str, band: Rect, color: Rgba<u8>) {
    let scale = PxScale::from(band.height as f32 * 0.5);
    let scaled = font.as_scaled(scale);
    let text_width = measure_text(text, font, scale);
    let left = band.x as f32 + (band.width as f32 - text_width).max(0.0) / 2.0;
    let text_height = scaled.ascent() - scaled.descent();
    let baseline = band.y as f32 + (band.height as f32 - text_height) / 2.0 + scaled.ascent();

    let mut cursor_x = left;
    let mut previous = None;
    for ch in text.chars() {
        if ch.is_control() {
            continue;
        }
        let glyph = scaled.glyph_id(ch);
        if let Some(prev) = previous {
            cursor_x += scaled.kern(prev, glyph);
        }
        let advance = scaled.h_advance(glyph);
        let mut positioned = scaled.scaled_glyph(ch);
        positioned.position = point(cursor_x, baseline);
        if let Some(outline) = font.outline_glyph(positioned) {
            let bounds = outline.px_bounds();
            outline.draw(|x, y, coverage| {
                let px = bounds.min.x as i64 + i64::from(x);
                let py = bounds.min.y as i64 + i64::from(y);
                blend_pixel(canvas, px, py, color, coverage);
            });
        }
        cursor_x += advance;
        previous = Some(glyph);
    }
}

fn blend_pixel(canvas: &mut RgbaImage, x: i64, y: i64, color: Rgba<u8>, coverage: f32) {
    if x < 0 || y < 0 || x >= i64::from(canvas.width()) || y >= i64::from(canvas.height()) {
        return;
    }
    let coverage = coverage.clamp(0.0, 1.0);
    let dst = canvas.get_pixel_mut(x as u32, y as u32);
    for c in 0..3 {
        let blended = f32::from(dst[c]) * (1.0 - coverage) + f32::from(color[c]) * coverage;
        dst[c] = blended.round().clamp(0.0, 255.0) as u8;
    }
}

fn measure_text(text: &str, font: &FontArc, scale: PxScale) -> f32 {
    let scaled = font.as_scaled(scale);
    let mut width = 0.0f32;
    let mut previous = None;
    for ch in text.chars() {
        if ch.is_control() {
            continue;
        }
        let glyph = scaled.glyph_id(ch);
        if let Some(prev) = previous {
            width += scaled.kern(prev, glyph);
        }
        width += scaled.h_advance(glyph);
        previous = Some(glyph);
    }
    width.max(0.0)
}

fn load_font(header: &HeaderConfig) -> Result<FontArc> {
    if let Some(path) = &header.font {
        let data =
            fs::read(path).with_context(|| format!("failed to read font at {}", path.display()))?;
        return FontArc::try_from_vec(data)
            .with_context(|| format!("failed to decode font {}", path.display()));
    }

    let mut db = Database::new();
    db.load_system_fonts();
    let preferred_families = [
        Family::Name("DejaVu Sans"),
        Family::Name("Noto Sans"),
        Family::SansSerif,
    ];
    for family in preferred_families {
        if let Some(id) = db.query(&Query {
            families: &[family],
            ..Default::default()
        }) && let Some(font) = load_face(&db, id)?
        {
            return Ok(font);
        }
    }
    Err(anyhow!("no system sans-serif font found for the strip header"))
}

fn load_face(db: &Database, id: fontdb::ID) -> Result<Option<FontArc>> {
    let face = db.face(id).context("missing font face in database")?;
    let data = match &face.source {
        Source::Binary(data) => data.as_ref().as_ref().to_vec(),
        Source::File(path) => {
            fs::read(path).with_context(|| format!("failed to read font at {}", path.display()))?
        }
        Source::SharedFile(_, data) => data.as_ref().as_ref().to_vec(),
    };
    Ok(FontArc::try_from_vec(data).ok())
}
