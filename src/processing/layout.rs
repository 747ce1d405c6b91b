//! Print strip geometry. Everything here is integer arithmetic on the input
//! dimensions so that identical inputs always give identical pixel positions.

use crate::config::{CompositeConfig, StripOrientation};
use crate::error::LayoutError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutParams {
    pub canvas_width: u32,
    pub canvas_height: u32,
    pub margin: u32,
    pub spacing: u32,
    /// Band reserved at the top of the canvas for the date header.
    pub header_height: u32,
    pub orientation: StripOrientation,
}

impl From<&CompositeConfig> for LayoutParams {
    fn from(cfg: &CompositeConfig) -> Self {
        let (canvas_width, canvas_height) = cfg.canvas.dimensions();
        Self {
            canvas_width,
            canvas_height,
            margin: cfg.margin,
            spacing: cfg.spacing,
            header_height: cfg.header.reserved_height(),
            orientation: cfg.orientation,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StripLayout {
    pub canvas_width: u32,
    pub canvas_height: u32,
    pub photo_width: u32,
    pub photo_height: u32,
    pub spacing: u32,
    pub margin: u32,
    /// One slot per shot, in shot order.
    pub slots: Vec<Rect>,
    pub header: Option<Rect>,
}

impl StripLayout {
    /// Width (horizontal) or height (vertical) of the photo group including inner spacing.
    pub fn group_extent(&self) -> u32 {
        match (self.slots.first(), self.slots.last()) {
            (Some(first), Some(last)) if first.y == last.y => last.x + last.width - first.x,
            (Some(first), Some(last)) => last.y + last.height - first.y,
            _ => 0,
        }
    }
}

/// Lay out `count` copies of a `source_width` x `source_height` photo.
///
/// Along the main axis the photos share the space left after margins and
/// `count + 1` spacings. The cross dimension follows the source aspect ratio
/// and may use the full cross extent of the area; when it does not fit, both
/// dimensions shrink together. The group is
/// centred on both axes inside the area below the header.
pub fn compute_strip_layout(
    source_width: u32,
    source_height: u32,
    count: usize,
    params: &LayoutParams,
) -> Result<StripLayout, LayoutError> {
    if count == 0 {
        return Err(LayoutError::NoShots);
    }
    if source_width == 0 || source_height == 0 {
        return Err(LayoutError::EmptySource);
    }
    let no_room = || LayoutError::NoRoom {
        width: params.canvas_width,
        height: params.canvas_height,
        count,
    };

    let n = count as u64;
    let spacing = u64::from(params.spacing);
    let margin = u64::from(params.margin);
    let area_w = u64::from(params.canvas_width)
        .checked_sub(margin * 2)
        .ok_or_else(no_room)?;
    let area_h = u64::from(params.canvas_height)
        .checked_sub(margin * 2 + u64::from(params.header_height))
        .ok_or_else(no_room)?;

    // (main, cross) in the orientation's frame of reference.
    let (area_main, area_cross, src_main, src_cross) = match params.orientation {
        StripOrientation::Horizontal => (area_w, area_h, u64::from(source_width), u64::from(source_height)),
        StripOrientation::Vertical => (area_h, area_w, u64::from(source_height), u64::from(source_width)),
    };

    let mut photo_main = area_main
        .checked_sub(spacing * (n + 1))
        .ok_or_else(no_room)?
        / n;
    let mut photo_cross = photo_main * src_cross / src_main;
    if photo_cross > area_cross {
        photo_cross = area_cross;
        photo_main = photo_cross * src_main / src_cross;
    }
    if photo_main == 0 || photo_cross == 0 {
        return Err(no_room());
    }

    let group_main = photo_main * n + spacing * (n - 1);
    let start_main = (area_main - group_main) / 2;
    let start_cross = (area_cross - photo_cross) / 2;
    let origin_x = margin;
    let origin_y = margin + u64::from(params.header_height);

    let slots = (0..n)
        .map(|i| {
            let main = start_main + i * (photo_main + spacing);
            let (x, y, width, height) = match params.orientation {
                StripOrientation::Horizontal => (main, start_cross, photo_main, photo_cross),
                StripOrientation::Vertical => (start_cross, main, photo_cross, photo_main),
            };
            Rect {
                x: (origin_x + x) as u32,
                y: (origin_y + y) as u32,
                width: width as u32,
                height: height as u32,
            }
        })
        .collect::<Vec<_>>();

    let header = (params.header_height > 0).then(|| Rect {
        x: params.margin,
        y: params.margin,
        width: area_w as u32,
        height: params.header_height,
    });

    Ok(StripLayout {
        canvas_width: params.canvas_width,
        canvas_height: params.canvas_height,
        photo_width: slots[0].width,
        photo_height: slots[0].height,
        spacing: params.spacing,
        margin: params.margin,
        slots,
        header,
    })
}
