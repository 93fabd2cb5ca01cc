//! Decoded frame bitmap (8-bit RGBA)
//!
//! **Why**: Frames move between the decode worker, the cache arena and the
//! playback driver. Cloning must be cheap, so pixel data lives behind an `Arc`
//! and is immutable once decoded.
//!
//! **Used by**: Frame sources (decode output), FrameCache (slots, poster),
//! PlaybackDriver (current frame)
//!
//! # Pixel Layouts
//!
//! - `PixelLayout::Rgba8`: straight alpha, as decoded
//! - `PixelLayout::PremultipliedRgba8`: color channels multiplied by alpha,
//!   produced by [`Frame::predrawn`]; what compositors want to blend directly

use image::RgbaImage;
use std::fmt;
use std::sync::Arc;

use crate::error::DecodeError;

/// Pixel layout of a frame buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelLayout {
    Rgba8,              // Straight alpha
    PremultipliedRgba8, // Color pre-multiplied by alpha (predrawn)
}

/// Immutable frame data shared between clones
struct FrameData {
    pixels: Vec<u8>,
    width: u32,
    height: u32,
    layout: PixelLayout,
    index: usize, // Frame index within its animation
}

/// Decoded frame. Clones share the same pixel buffer.
#[derive(Clone)]
pub struct Frame {
    data: Arc<FrameData>,
}

impl Frame {
    /// Wrap an RGBA8 buffer decoded for frame `index`.
    ///
    /// # Errors
    ///
    /// `DecodeError::Malformed` if the buffer length does not match `width * height * 4`.
    pub fn from_rgba(index: usize, width: u32, height: u32, pixels: Vec<u8>) -> Result<Self, DecodeError> {
        let expected = width as usize * height as usize * 4;
        if pixels.len() != expected {
            return Err(DecodeError::Malformed {
                index,
                reason: format!(
                    "pixel buffer is {} bytes, expected {} for {}x{}",
                    pixels.len(),
                    expected,
                    width,
                    height
                ),
            });
        }

        Ok(Self {
            data: Arc::new(FrameData {
                pixels,
                width,
                height,
                layout: PixelLayout::Rgba8,
                index,
            }),
        })
    }

    /// Wrap an `image` crate RGBA buffer (still images)
    pub fn from_rgba_image(index: usize, image: RgbaImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            data: Arc::new(FrameData {
                pixels: image.into_raw(),
                width,
                height,
                layout: PixelLayout::Rgba8,
                index,
            }),
        }
    }

    /// Solid-color frame (test fixtures, placeholder sources)
    pub fn solid(index: usize, width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let mut pixels = vec![0u8; width as usize * height as usize * 4];
        for px in pixels.chunks_exact_mut(4) {
            px.copy_from_slice(&rgba);
        }
        Self {
            data: Arc::new(FrameData {
                pixels,
                width,
                height,
                layout: PixelLayout::Rgba8,
                index,
            }),
        }
    }

    pub fn index(&self) -> usize {
        self.data.index
    }

    pub fn width(&self) -> u32 {
        self.data.width
    }

    pub fn height(&self) -> u32 {
        self.data.height
    }

    pub fn size(&self) -> (u32, u32) {
        (self.data.width, self.data.height)
    }

    pub fn layout(&self) -> PixelLayout {
        self.data.layout
    }

    /// Raw pixel bytes, 4 per pixel, row-major
    pub fn pixels(&self) -> &[u8] {
        &self.data.pixels
    }

    /// RGBA of the pixel at (x, y), None if outside the frame
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.data.width || y >= self.data.height {
            return None;
        }
        let offset = (y as usize * self.data.width as usize + x as usize) * 4;
        let px = &self.data.pixels[offset..offset + 4];
        Some([px[0], px[1], px[2], px[3]])
    }

    /// Memory held by the pixel buffer in bytes
    pub fn mem(&self) -> usize {
        self.data.pixels.len()
    }

    /// True if both handles share one pixel buffer
    pub fn ptr_eq(a: &Frame, b: &Frame) -> bool {
        Arc::ptr_eq(&a.data, &b.data)
    }

    /// Convert to premultiplied alpha for cheap per-tick blending.
    ///
    /// Trades one pass over the pixels at decode time for no conversion work
    /// at draw time. Already premultiplied frames are returned unchanged.
    pub fn predrawn(self) -> Frame {
        if self.data.layout == PixelLayout::PremultipliedRgba8 {
            return self;
        }

        let mut pixels = self.data.pixels.clone();
        for px in pixels.chunks_exact_mut(4) {
            let alpha = u16::from(px[3]);
            if alpha == 255 {
                continue;
            }
            for channel in &mut px[..3] {
                *channel = ((u16::from(*channel) * alpha + 127) / 255) as u8;
            }
        }

        Frame {
            data: Arc::new(FrameData {
                pixels,
                width: self.data.width,
                height: self.data.height,
                layout: PixelLayout::PremultipliedRgba8,
                index: self.data.index,
            }),
        }
    }

    /// Copy out as an `image` crate buffer (straight-alpha frames only)
    pub fn to_rgba_image(&self) -> Option<RgbaImage> {
        if self.data.layout != PixelLayout::Rgba8 {
            return None;
        }
        RgbaImage::from_raw(self.data.width, self.data.height, self.data.pixels.clone())
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("index", &self.data.index)
            .field("width", &self.data.width)
            .field("height", &self.data.height)
            .field("layout", &self.data.layout)
            .finish()
    }
}
