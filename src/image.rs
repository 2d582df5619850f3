// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Raw pixel buffers for map markers and color sampling.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Color {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
    pub alpha: u8,
}

impl Color {
    pub const CLEAR: Color = Color::rgba(0, 0, 0, 0);

    pub const fn rgba(red: u8, green: u8, blue: u8, alpha: u8) -> Self {
        Self {
            red,
            green,
            blue,
            alpha,
        }
    }

    pub const fn rgb(red: u8, green: u8, blue: u8) -> Self {
        Self::rgba(red, green, blue, 255)
    }
}

/// Image bytes with a size in points and a scale factor.
///
/// `data` holds `(width * scale) * (height * scale)` pixels of
/// `bytes_per_pixel` bytes each: 1 (alpha only), 3 (RGB) or 4 (RGBA).
#[derive(Debug, Clone, PartialEq)]
pub struct PixelBuffer {
    pub width: usize,
    pub height: usize,
    pub scale: usize,
    pub bytes_per_pixel: usize,
    pub data: Vec<u8>,
}

impl PixelBuffer {
    fn row_pixels(&self) -> Option<usize> {
        self.width.checked_mul(self.scale)
    }

    fn row_count(&self) -> Option<usize> {
        self.height.checked_mul(self.scale)
    }

    fn byte_len(&self) -> Option<usize> {
        self.row_pixels()?
            .checked_mul(self.row_count()?)?
            .checked_mul(self.bytes_per_pixel)
    }

    /// Byte offset of point (`x`, `y`), where `x` is in points and `y` is a
    /// pixel row. `None` when the point falls outside the buffer.
    fn offset_of(&self, x: usize, y: usize) -> Option<usize> {
        if x >= self.width || y >= self.row_count()? {
            return None;
        }
        self.row_pixels()?
            .checked_mul(y)?
            .checked_add(x.checked_mul(self.scale)?)?
            .checked_mul(self.bytes_per_pixel)
    }

    /// Sample the pixel at point (`x`, `y`).
    ///
    /// Returns [`Color::CLEAR`] when the point is outside the buffer or the
    /// byte layout is not one of the supported ones.
    pub fn pixel_color(&self, x: usize, y: usize) -> Color {
        if self.byte_len() != Some(self.data.len()) {
            return Color::CLEAR;
        }
        let Some(offset) = self.offset_of(x, y) else {
            return Color::CLEAR;
        };
        let Some(px) = self.data.get(offset..offset + self.bytes_per_pixel) else {
            return Color::CLEAR;
        };

        match *px {
            [alpha] => Color::rgba(0, 0, 0, alpha),
            [red, green, blue] => Color::rgb(red, green, blue),
            [red, green, blue, alpha] => Color::rgba(red, green, blue, alpha),
            _ => Color::CLEAR,
        }
    }

    /// A `diameter` x `diameter` RGBA image of a filled disc on a clear background.
    pub fn circle(diameter: usize, color: Color) -> Self {
        let radius = diameter as f64 / 2.0;
        let mut data = Vec::with_capacity(diameter * diameter * 4);
        for row in 0..diameter {
            for col in 0..diameter {
                let dx = col as f64 + 0.5 - radius;
                let dy = row as f64 + 0.5 - radius;
                let fill = if dx * dx + dy * dy <= radius * radius {
                    color
                } else {
                    Color::CLEAR
                };
                data.extend_from_slice(&[fill.red, fill.green, fill.blue, fill.alpha]);
            }
        }

        Self {
            width: diameter,
            height: diameter,
            scale: 1,
            bytes_per_pixel: 4,
            data,
        }
    }
}
