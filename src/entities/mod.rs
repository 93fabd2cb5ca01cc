//! Entities module - image-side types, independent of playback
//!
//! - `Frame`: decoded bitmap handle (cheap to clone)
//! - `FrameSource`: container decode capability (GIF, still images, custom)
//! - `AnimatedImage`: immutable facade owning a source, delays, poster and cache

pub mod animated_image;
pub mod frame;
pub mod source;
pub mod traits;

pub use animated_image::{AnimatedImage, ImageOptions, DEFAULT_RECOVERY_INTERVAL, MIN_FRAME_DELAY};
pub use frame::{Frame, PixelLayout};
pub use source::{open_source, GifSource, StillSource};
pub use traits::{size_for_image, FrameSource, PixelSize};
