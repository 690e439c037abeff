//! On-screen text: the frame rate counter and the active tracking thresholds.
//!
//! Both are anchored near the bottom edge of the frame with the bottom left corner of the text at
//! the anchor point.

use crate::{
    config::TrackingConfig,
    image::{draw, Color, Frame, Resolution},
};

const TEXT_COLOR: Color = Color::WHITE;

/// Formats the frame rate for display, truncated to an integer.
///
/// `None` (no frame rate available yet) is shown as `--fps`.
pub fn fps_text(fps: Option<f32>) -> String {
    match fps {
        Some(fps) => format!("{}fps", fps as u32),
        None => "--fps".to_string(),
    }
}

/// Returns the bottom left corner of the frame rate text.
pub fn fps_anchor(res: Resolution) -> (i32, i32) {
    (res.width() as i32 - 50, res.height() as i32 - 10)
}

/// Returns the bottom left corner of the tracking threshold text.
pub fn settings_anchor(res: Resolution) -> (i32, i32) {
    (10, res.height() as i32 - 10)
}

/// Draws the frame rate counter in the bottom right corner of `frame`.
pub fn draw_fps(frame: &mut Frame, fps: Option<f32>) {
    let (x, y) = fps_anchor(frame.resolution());
    let text = fps_text(fps);
    draw::text(frame, x, y, &text)
        .color(TEXT_COLOR)
        .align_left()
        .align_bottom();
}

/// Draws the detection and tracking confidence thresholds in the bottom left corner of `frame`.
pub fn draw_settings(frame: &mut Frame, config: &TrackingConfig) {
    let (x, y) = settings_anchor(frame.resolution());
    let text = config.to_string();
    draw::text(frame, x, y, &text)
        .color(TEXT_COLOR)
        .align_left()
        .align_bottom();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn changed_pixels(a: &Frame, b: &Frame) -> Vec<(u32, u32)> {
        let mut changed = Vec::new();
        for y in 0..a.height() {
            for x in 0..a.width() {
                if a.get(x, y) != b.get(x, y) {
                    changed.push((x, y));
                }
            }
        }
        changed
    }

    #[test]
    fn fps_formatting() {
        assert_eq!(fps_text(Some(2.0)), "2fps");
        assert_eq!(fps_text(Some(29.97)), "29fps");
        assert_eq!(fps_text(Some(0.4)), "0fps");
        assert_eq!(fps_text(None), "--fps");
    }

    #[test]
    fn anchors() {
        assert_eq!(fps_anchor(Resolution::RES_480P), (590, 470));
        assert_eq!(settings_anchor(Resolution::RES_480P), (10, 470));
        assert_eq!(fps_anchor(Resolution::RES_720P), (1230, 710));
    }

    #[test]
    fn fps_drawn_bottom_right() {
        let blank = Frame::new(640, 480);
        let mut frame = blank.clone();
        draw_fps(&mut frame, Some(30.0));

        let changed = changed_pixels(&blank, &frame);
        assert!(!changed.is_empty());
        for (x, y) in changed {
            assert!(x >= 590, "pixel at x={x} left of the anchor");
            assert!((455..=470).contains(&y), "pixel at y={y} outside the text band");
        }
    }

    #[test]
    fn settings_drawn_bottom_left() {
        let blank = Frame::new(640, 480);
        let mut frame = blank.clone();
        draw_settings(&mut frame, &TrackingConfig::default());

        let changed = changed_pixels(&blank, &frame);
        assert!(!changed.is_empty());
        for (x, y) in changed {
            assert!(x >= 10, "pixel at x={x} left of the anchor");
            assert!((455..=470).contains(&y), "pixel at y={y} outside the text band");
            assert_eq!(frame.get(x, y), TEXT_COLOR);
        }
    }
}
