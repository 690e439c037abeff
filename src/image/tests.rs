use super::*;
use Color as C;

fn mkframe<const W: usize, const H: usize>(data: [[Color; W]; H]) -> Frame {
    let data = data
        .into_iter()
        .flat_map(|row| row.into_iter())
        .flat_map(|col| col.0)
        .collect::<Vec<_>>();
    Frame::from_rgba8(Resolution::new(W as u32, H as u32), &data)
}

fn count_non_black(frame: &Frame) -> usize {
    (0..frame.height())
        .flat_map(|y| (0..frame.width()).map(move |x| (x, y)))
        .filter(|&(x, y)| frame.get(x, y) != C::BLACK)
        .count()
}

#[test]
fn new_frame_is_black() {
    let frame = Frame::new(4, 3);
    assert_eq!(frame.resolution(), Resolution::new(4, 3));
    assert_eq!(count_non_black(&frame), 0);
}

#[test]
fn packed_layouts() {
    let frame = mkframe([[C::RED, C::from_rgb8(1, 2, 3)]]);

    let rgb = frame.to_packed(PixelLayout::Rgb8);
    assert_eq!(rgb.channels(), 3);
    assert_eq!(rgb.data(), &[255, 0, 0, 1, 2, 3]);
    assert_eq!(rgb.rgb(1, 0), [1, 2, 3]);

    let bgr = frame.to_packed(PixelLayout::Bgr8);
    assert_eq!(bgr.data(), &[0, 0, 255, 3, 2, 1]);
    assert_eq!(bgr.pixel(1, 0), &[3, 2, 1]);
    assert_eq!(bgr.rgb(1, 0), [1, 2, 3]);

    let rgba = frame.to_packed(PixelLayout::Rgba8);
    assert_eq!(rgba.channels(), 4);
    assert_eq!(rgba.data().len(), 8);
    assert_eq!(rgba.resolution(), frame.resolution());
}

#[test]
fn packing_leaves_frame_untouched() {
    let frame = mkframe([[C::GREEN, C::BLUE], [C::WHITE, C::RED]]);
    let before = frame.data().to_vec();
    let _ = frame.to_packed(PixelLayout::Bgr8);
    assert_eq!(frame.data(), &before[..]);
}

#[test]
#[should_panic]
fn packed_pixel_out_of_bounds() {
    Frame::new(2, 2).to_packed(PixelLayout::Rgb8).pixel(2, 0);
}

#[test]
fn set_ignores_out_of_bounds() {
    let mut frame = Frame::new(2, 2);
    frame.set(-1, 0, C::WHITE);
    frame.set(0, 2, C::WHITE);
    frame.set(1, 1, C::WHITE);
    assert_eq!(count_non_black(&frame), 1);
    assert_eq!(frame.get(1, 1), C::WHITE);
}

#[test]
fn draw_line_and_circle() {
    let mut frame = Frame::new(16, 16);
    draw::line(&mut frame, 0, 0, 15, 0).color(C::WHITE);
    assert_eq!(frame.get(0, 0), C::WHITE);
    assert_eq!(frame.get(15, 0), C::WHITE);
    assert_eq!(frame.get(0, 1), C::BLACK);

    frame.clear(C::BLACK);
    draw::circle(&mut frame, 8, 8, 5).color(C::RED).fill(C::RED);
    assert_eq!(frame.get(8, 8), C::RED);
    assert_eq!(frame.get(0, 0), C::BLACK);
}

#[test]
fn draw_text_stays_in_bounds() {
    let mut frame = Frame::new(20, 20);
    // Partially outside of the frame; must not panic.
    draw::text(&mut frame, 15, 19, "clipped text").align_left().align_bottom();
    assert!(count_non_black(&frame) > 0);
}
