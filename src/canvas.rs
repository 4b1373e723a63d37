use sha2::{Digest as _, Sha256};

use crate::{
    color::Color,
    error::{ForgeError, ForgeResult},
    hash::ContentHash,
};

/// A pixel buffer with per-pixel ARGB color. `Solid` never materializes its
/// data except when hashed or exported, where it expands logically.
#[derive(Clone, Debug, PartialEq)]
pub enum Canvas {
    Solid {
        width: u32,
        height: u32,
        color: Color,
    },
    Pixels(PixelCanvas),
}

impl Canvas {
    pub fn solid(width: u32, height: u32, color: Color) -> Canvas {
        Canvas::Solid {
            width,
            height,
            color,
        }
    }

    pub fn width(&self) -> u32 {
        match self {
            Canvas::Solid { width, .. } => *width,
            Canvas::Pixels(p) => p.width,
        }
    }

    pub fn height(&self) -> u32 {
        match self {
            Canvas::Solid { height, .. } => *height,
            Canvas::Pixels(p) => p.height,
        }
    }

    pub fn get(&self, x: u32, y: u32) -> Color {
        match self {
            Canvas::Solid { color, .. } => *color,
            Canvas::Pixels(p) => p.get(x, y),
        }
    }

    pub fn in_bounds(&self, x: u32, y: u32) -> bool {
        x < self.width() && y < self.height()
    }

    /// Copies a sub-rectangle into a new dense buffer. The caller is
    /// responsible for bounds; pixels are read through `get`.
    pub fn sub_region(&self, width: u32, height: u32, x_offset: u32, y_offset: u32) -> PixelCanvas {
        PixelCanvas::from_fn(width, height, |x, y| self.get(x + x_offset, y + y_offset))
    }

    pub fn pixel_hash(&self) -> ContentHash {
        self.pixel_hash_with(&[])
    }

    /// Content hash over the raw little-endian pixel words, with trailing
    /// `metadata` bytes mixed in so e.g. an encoding-mode change alone
    /// invalidates a cache entry.
    pub fn pixel_hash_with(&self, metadata: &[u8]) -> ContentHash {
        let mut hasher = Sha256::new();
        match self {
            Canvas::Solid {
                width,
                height,
                color,
            } => {
                let bytes = color.0.to_le_bytes();
                for _ in 0..u64::from(*width) * u64::from(*height) {
                    hasher.update(bytes);
                }
            }
            Canvas::Pixels(p) => {
                for px in &p.data {
                    hasher.update(px.to_le_bytes());
                }
            }
        }
        hasher.update(metadata);
        ContentHash::new(hasher.finalize().into())
    }

    /// Expands into the codec interchange form (straight-alpha RGBA8).
    pub fn to_image(&self) -> image::RgbaImage {
        image::RgbaImage::from_fn(self.width(), self.height(), |x, y| {
            let c = self.get(x, y);
            image::Rgba([c.r() as u8, c.g() as u8, c.b() as u8, c.a() as u8])
        })
    }

    pub fn from_image(img: &image::RgbaImage) -> Canvas {
        let data = img
            .pixels()
            .map(|px| {
                let [r, g, b, a] = px.0;
                Color::from_argb(a as i32, r as i32, g as i32, b as i32).0
            })
            .collect();
        Canvas::Pixels(PixelCanvas {
            width: img.width(),
            height: img.height(),
            data,
        })
    }
}

impl From<PixelCanvas> for Canvas {
    fn from(p: PixelCanvas) -> Canvas {
        Canvas::Pixels(p)
    }
}

/// Dense row-major ARGB buffer. Invariant: `data.len() == width * height`.
#[derive(Clone, Debug, PartialEq)]
pub struct PixelCanvas {
    width: u32,
    height: u32,
    data: Vec<u32>,
}

impl PixelCanvas {
    /// Fully transparent buffer.
    pub fn new(width: u32, height: u32) -> PixelCanvas {
        PixelCanvas {
            width,
            height,
            data: vec![0; width as usize * height as usize],
        }
    }

    pub fn from_raw(width: u32, height: u32, data: Vec<u32>) -> ForgeResult<PixelCanvas> {
        if data.len() as u64 != u64::from(width) * u64::from(height) {
            return Err(ForgeError::resolution(format!(
                "mismatching pixel buffer size: {} for {width}x{height}",
                data.len()
            )));
        }
        Ok(PixelCanvas {
            width,
            height,
            data,
        })
    }

    /// Fills every pixel from a generator, row-major.
    pub fn from_fn(width: u32, height: u32, mut f: impl FnMut(u32, u32) -> Color) -> PixelCanvas {
        let mut data = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height {
            for x in 0..width {
                data.push(f(x, y).0);
            }
        }
        PixelCanvas {
            width,
            height,
            data,
        }
    }

    /// Dense copy of any canvas; a plain buffer clone when the source is
    /// already dense.
    pub fn from_canvas(canvas: &Canvas) -> PixelCanvas {
        match canvas {
            Canvas::Pixels(p) => p.clone(),
            other => PixelCanvas::from_fn(other.width(), other.height(), |x, y| other.get(x, y)),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn get(&self, x: u32, y: u32) -> Color {
        debug_assert!(x < self.width && y < self.height);
        Color(self.data[(y * self.width + x) as usize])
    }

    pub fn set(&mut self, x: u32, y: u32, color: Color) {
        debug_assert!(x < self.width && y < self.height);
        self.data[(y * self.width + x) as usize] = color.0;
    }
}
