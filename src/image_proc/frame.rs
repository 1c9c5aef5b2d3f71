//! Panel-sized RGB frames.

use image::{Rgb, RgbImage};

/// Colour bars used by the test pattern (left to right)
const TEST_BARS: [[u8; 3]; 8] = [
    [255, 255, 255],
    [255, 255, 0],
    [0, 255, 255],
    [0, 255, 0],
    [255, 0, 255],
    [255, 0, 0],
    [0, 0, 255],
    [0, 0, 0],
];

/// An RGB8 frame whose size matches the panel it was built for.
///
/// Frames are handed to the driver by value, so every submission owns its
/// own pixel buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedFrame {
    pixels: RgbImage,
}

impl NormalizedFrame {
    pub(crate) fn from_rgb(pixels: RgbImage) -> Self {
        Self { pixels }
    }

    /// Frame filled with a single colour
    pub fn solid(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        Self::from_rgb(RgbImage::from_pixel(width, height, Rgb(rgb)))
    }

    /// All LEDs off
    pub fn blank(width: u32, height: u32) -> Self {
        Self::solid(width, height, [0, 0, 0])
    }

    /// Vertical colour bars with a white border, for checking wiring and
    /// the RGB sequence of a panel
    pub fn test_pattern(width: u32, height: u32) -> Self {
        let bar_width = (width / TEST_BARS.len() as u32).max(1);
        let pixels = RgbImage::from_fn(width, height, |x, y| {
            if x == 0 || y == 0 || x + 1 == width || y + 1 == height {
                return Rgb([255, 255, 255]);
            }
            let bar = ((x / bar_width) as usize).min(TEST_BARS.len() - 1);
            Rgb(TEST_BARS[bar])
        });
        Self::from_rgb(pixels)
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }

    /// Pixel at (x, y) as [r, g, b]
    #[cfg(test)]
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 3] {
        self.pixels.get_pixel(x, y).0
    }

    /// Row-major pixel iterator yielding (x, y, [r, g, b])
    #[cfg(any(test, feature = "hardware"))]
    pub fn pixels(&self) -> impl Iterator<Item = (u32, u32, [u8; 3])> + '_ {
        self.pixels.enumerate_pixels().map(|(x, y, p)| (x, y, p.0))
    }

    /// Raw interleaved RGB bytes
    #[cfg(test)]
    pub fn as_raw(&self) -> &[u8] {
        self.pixels.as_raw()
    }

    pub fn into_rgb(self) -> RgbImage {
        self.pixels
    }
}
