//! Abstract traits for dependency inversion.
//!
//! `FrameSource` is the opaque decode capability the cache pulls from; the
//! concrete GIF and still-image readers live in `entities::source`, and tests
//! plug in scripted sources.
//!
//! `PixelSize` lets layout code ask any image-like value for its size without
//! branching on whether it is animated.

use std::sync::Arc;
use std::time::Duration;

use super::frame::Frame;
use crate::error::DecodeError;

/// Container-level decode capability.
///
/// Implementations must be callable from the decode worker thread while the
/// foreground reads metadata.
pub trait FrameSource: Send + Sync {
    /// Raw container payload
    fn data(&self) -> &[u8];

    /// Number of frames (0 is rejected at construction)
    fn frame_count(&self) -> usize;

    /// Declared delay of `index`, before normalization
    fn declared_delay(&self, index: usize) -> Duration;

    /// Loop count; 0 = infinite
    fn loop_count(&self) -> u32;

    /// Logical canvas size (width, height)
    fn canvas_size(&self) -> (u32, u32);

    /// Decode one fully composited frame.
    fn decode_frame(&self, index: usize) -> Result<Frame, DecodeError>;
}

impl<T: FrameSource + ?Sized> FrameSource for Arc<T> {
    fn data(&self) -> &[u8] {
        (**self).data()
    }

    fn frame_count(&self) -> usize {
        (**self).frame_count()
    }

    fn declared_delay(&self, index: usize) -> Duration {
        (**self).declared_delay(index)
    }

    fn loop_count(&self) -> u32 {
        (**self).loop_count()
    }

    fn canvas_size(&self) -> (u32, u32) {
        (**self).canvas_size()
    }

    fn decode_frame(&self, index: usize) -> Result<Frame, DecodeError> {
        (**self).decode_frame(index)
    }
}

/// Anything with a pixel size
pub trait PixelSize {
    fn pixel_size(&self) -> (u32, u32);
}

impl PixelSize for Frame {
    fn pixel_size(&self) -> (u32, u32) {
        self.size()
    }
}

impl PixelSize for image::DynamicImage {
    fn pixel_size(&self) -> (u32, u32) {
        (self.width(), self.height())
    }
}

impl PixelSize for image::RgbaImage {
    fn pixel_size(&self) -> (u32, u32) {
        self.dimensions()
    }
}

impl<T: PixelSize + ?Sized> PixelSize for Arc<T> {
    fn pixel_size(&self) -> (u32, u32) {
        (**self).pixel_size()
    }
}

/// Pixel size of an animated or still image, uniformly.
pub fn size_for_image<T: PixelSize + ?Sized>(image: &T) -> (u32, u32) {
    image.pixel_size()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_for_still_images() {
        let rgba = image::RgbaImage::new(7, 3);
        assert_eq!(size_for_image(&rgba), (7, 3));

        let dynamic = image::DynamicImage::ImageRgba8(rgba);
        assert_eq!(size_for_image(&dynamic), (7, 3));

        let frame = Frame::solid(0, 5, 9, [0, 0, 0, 255]);
        assert_eq!(size_for_image(&frame), (5, 9));
    }
}
