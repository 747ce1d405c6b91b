use rust_photo_booth::config::{CanvasConfig, CanvasPreset, CompositeConfig, StripOrientation};
use rust_photo_booth::processing::layout::{LayoutParams, compute_strip_layout};

fn horizontal(width: u32, height: u32) -> LayoutParams {
    LayoutParams {
        canvas_width: width,
        canvas_height: height,
        margin: 0,
        spacing: 5,
        header_height: 0,
        orientation: StripOrientation::Horizontal,
    }
}

#[test]
fn default_composite_config_matches_4x6_strip() {
    let params = LayoutParams::from(&CompositeConfig::default());
    assert_eq!(params, horizontal(1844, 1240));

    let layout = compute_strip_layout(1280, 960, 3, &params).unwrap();
    assert_eq!(layout.photo_width, 608);
    assert_eq!(layout.photo_height, 456);
    assert_eq!(layout.group_extent(), 1834);
    assert_eq!(layout.slots[0].x, 5);
}

#[test]
fn geometry_is_a_pure_function_of_inputs() {
    let params = horizontal(1844, 620);
    let a = compute_strip_layout(1280, 960, 3, &params).unwrap();
    let b = compute_strip_layout(1280, 960, 3, &params).unwrap();
    assert_eq!(a, b);
}

#[test]
fn two_by_six_strip_shrinks_to_height() {
    let params = LayoutParams::from(&CompositeConfig {
        canvas: CanvasConfig::Preset(CanvasPreset::Dnp2x6),
        ..CompositeConfig::default()
    });
    let layout = compute_strip_layout(1280, 960, 3, &params).unwrap();
    assert_eq!(layout.photo_height, 456);
    assert!(layout.slots.iter().all(|s| s.y + s.height <= 620));

    // Portrait shots hit the full 620 px canvas height and shrink.
    let tall = compute_strip_layout(960, 1280, 3, &params).unwrap();
    assert_eq!(tall.photo_height, 620);
    assert_eq!(tall.photo_width, 620 * 960 / 1280);
    assert!(tall.slots.iter().all(|s| s.y == 0));
}

#[test]
fn slots_never_overlap_and_keep_spacing() {
    for count in 1..=6 {
        let layout = compute_strip_layout(4, 3, count, &horizontal(1844, 1240)).unwrap();
        assert_eq!(layout.slots.len(), count);
        for pair in layout.slots.windows(2) {
            assert_eq!(pair[1].x - (pair[0].x + pair[0].width), 5);
        }
        let last = layout.slots.last().unwrap();
        assert!(last.x + last.width <= 1844);
    }
}

#[test]
fn margin_is_respected_on_both_axes() {
    let params = LayoutParams {
        margin: 40,
        ..horizontal(1844, 1240)
    };
    let layout = compute_strip_layout(4, 3, 3, &params).unwrap();
    assert_eq!(layout.photo_width, (1844 - 80 - 20) / 3);
    for slot in &layout.slots {
        assert!(slot.x >= 40 && slot.y >= 40);
        assert!(slot.x + slot.width <= 1844 - 40);
        assert!(slot.y + slot.height <= 1240 - 40);
    }
}
