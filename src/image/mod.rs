//! Frame storage and color conversion.
//!
//! This module provides:
//!
//! - [`Frame`], an owned RGBA image that overlays are drawn on and that is shown in the window.
//! - [`PackedFrame`], a tightly packed copy of a [`Frame`] in the [`PixelLayout`] a landmark
//!   network wants as its input.
//! - A handful of [`draw`] functions used to visualize landmarks and text.

pub mod draw;
mod resolution;

#[cfg(test)]
mod tests;

use std::{fmt, ops::Index};

use embedded_graphics::{pixelcolor::raw::RawU32, prelude::PixelColor};
use image::{ImageBuffer, Rgba, RgbaImage};

pub use resolution::*;

/// An 8-bit sRGB frame with alpha channel.
#[derive(Clone)]
pub struct Frame {
    // Kept in RGBA so that the window can upload it to the GPU without conversion.
    buf: RgbaImage,
}

impl Frame {
    /// Creates an empty frame of a specified size.
    ///
    /// The frame starts out black and fully opaque.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            buf: ImageBuffer::from_pixel(width, height, Rgba(Color::BLACK.0)),
        }
    }

    /// Creates a frame from raw RGBA8 data.
    ///
    /// # Panics
    ///
    /// Panics if `buf` does not hold exactly `4 * width * height` bytes.
    pub fn from_rgba8(res: Resolution, buf: &[u8]) -> Self {
        let expected_size = res.width() as usize * res.height() as usize * 4;
        assert_eq!(
            expected_size,
            buf.len(),
            "incorrect buffer size {} for {} frame (expected {} bytes)",
            buf.len(),
            res,
            expected_size,
        );

        Self {
            buf: ImageBuffer::from_vec(res.width(), res.height(), buf.to_vec())
                .expect("buffer size does not match frame resolution"),
        }
    }

    /// Decodes a JFIF JPEG or Motion JPEG from a byte slice.
    pub fn decode_jpeg(data: &[u8]) -> anyhow::Result<Self> {
        let buf = image::load_from_memory_with_format(data, image::ImageFormat::Jpeg)?.to_rgba8();
        Ok(Self { buf })
    }

    /// Returns the width of this frame, in pixels.
    #[inline]
    pub fn width(&self) -> u32 {
        self.buf.width()
    }

    /// Returns the height of this frame, in pixels.
    #[inline]
    pub fn height(&self) -> u32 {
        self.buf.height()
    }

    /// Returns the size of this frame.
    #[inline]
    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width(), self.height())
    }

    /// Gets the color at the given pixel coordinates.
    ///
    /// # Panics
    ///
    /// This will panic if `(x, y)` is outside the bounds of this frame.
    pub fn get(&self, x: u32, y: u32) -> Color {
        Color(self.buf[(x, y)].0)
    }

    /// Sets the color at the given pixel coordinates, ignoring coordinates outside the frame.
    pub(crate) fn set(&mut self, x: i32, y: i32, color: Color) {
        if x >= 0 && y >= 0 && (x as u32) < self.width() && (y as u32) < self.height() {
            self.buf[(x as u32, y as u32)] = Rgba(color.0);
        }
    }

    /// Clears the frame, setting every pixel value to `color`.
    pub fn clear(&mut self, color: Color) {
        self.buf.pixels_mut().for_each(|pix| pix.0 = color.0);
    }

    /// Returns the raw RGBA8 pixel data, row by row.
    #[inline]
    pub fn data(&self) -> &[u8] {
        self.buf.as_raw()
    }

    /// Creates a tightly packed copy of this frame in the given layout.
    ///
    /// This does not modify `self`; the overlay is still drawn on the original frame.
    pub fn to_packed(&self, layout: PixelLayout) -> PackedFrame {
        let channels = layout.channels();
        let mut data = Vec::with_capacity(self.buf.as_raw().len() / 4 * channels);
        for Rgba([r, g, b, a]) in self.buf.pixels() {
            match layout {
                PixelLayout::Rgb8 => data.extend_from_slice(&[*r, *g, *b]),
                PixelLayout::Bgr8 => data.extend_from_slice(&[*b, *g, *r]),
                PixelLayout::Rgba8 => data.extend_from_slice(&[*r, *g, *b, *a]),
            }
        }

        PackedFrame {
            resolution: self.resolution(),
            layout,
            data,
        }
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{} Frame", self.width(), self.height())
    }
}

/// Order and number of channels of a [`PackedFrame`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelLayout {
    Rgb8,
    Bgr8,
    Rgba8,
}

impl PixelLayout {
    /// Returns the number of bytes per pixel.
    pub fn channels(&self) -> usize {
        match self {
            Self::Rgb8 | Self::Bgr8 => 3,
            Self::Rgba8 => 4,
        }
    }
}

/// A frame converted into the pixel layout expected by a landmark network.
#[derive(Clone)]
pub struct PackedFrame {
    resolution: Resolution,
    layout: PixelLayout,
    data: Vec<u8>,
}

impl PackedFrame {
    #[inline]
    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    #[inline]
    pub fn layout(&self) -> PixelLayout {
        self.layout
    }

    #[inline]
    pub fn channels(&self) -> usize {
        self.layout.channels()
    }

    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Returns the raw channel values of the pixel at `(x, y)`, in this frame's layout.
    ///
    /// # Panics
    ///
    /// This will panic if `(x, y)` is outside the bounds of this frame.
    pub fn pixel(&self, x: u32, y: u32) -> &[u8] {
        assert!(
            x < self.resolution.width() && y < self.resolution.height(),
            "pixel ({x}, {y}) out of bounds for {} frame",
            self.resolution,
        );
        let channels = self.channels();
        let start = (y as usize * self.resolution.width() as usize + x as usize) * channels;
        &self.data[start..start + channels]
    }

    /// Returns the pixel at `(x, y)` as `[r, g, b]`, regardless of the layout.
    pub fn rgb(&self, x: u32, y: u32) -> [u8; 3] {
        let px = self.pixel(x, y);
        match self.layout {
            PixelLayout::Rgb8 | PixelLayout::Rgba8 => [px[0], px[1], px[2]],
            PixelLayout::Bgr8 => [px[2], px[1], px[0]],
        }
    }
}

impl fmt::Debug for PackedFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:?} PackedFrame", self.resolution, self.layout)
    }
}

/// An 8-bit RGBA color.
///
/// Colors are always in the sRGB color space and use non-premultiplied alpha.
#[derive(PartialEq, Eq, Clone, Copy)]
pub struct Color(pub(crate) [u8; 4]);

impl Color {
    pub const BLACK: Self = Self([0, 0, 0, 255]);
    pub const WHITE: Self = Self([255, 255, 255, 255]);
    pub const RED: Self = Self([255, 0, 0, 255]);
    pub const GREEN: Self = Self([0, 255, 0, 255]);
    pub const BLUE: Self = Self([0, 0, 255, 255]);

    #[inline]
    pub const fn from_rgb8(r: u8, g: u8, b: u8) -> Self {
        Self([r, g, b, 255])
    }

    #[inline]
    pub fn r(&self) -> u8 {
        self.0[0]
    }

    #[inline]
    pub fn g(&self) -> u8 {
        self.0[1]
    }

    #[inline]
    pub fn b(&self) -> u8 {
        self.0[2]
    }

    #[inline]
    pub fn a(&self) -> u8 {
        self.0[3]
    }
}

impl fmt::Debug for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{:02x}{:02x}{:02x}{:02x}",
            self.r(),
            self.g(),
            self.b(),
            self.a(),
        )
    }
}

impl Index<usize> for Color {
    type Output = u8;

    #[inline]
    fn index(&self, index: usize) -> &u8 {
        &self.0[index]
    }
}

impl PixelColor for Color {
    type Raw = RawU32;
}
