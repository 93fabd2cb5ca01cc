//! Container readers: animated GIF and single-frame stills
//!
//! **Why**: The cache needs random access to composited frames, but GIF
//! frames are deltas drawn over the previous canvas. `GifSource` keeps a
//! replay cursor so the forward prefetch pattern decodes one frame per call,
//! and falls back to replaying from frame 0 for backward jumps.
//!
//! **Used by**: `AnimatedImage::with_options` (format sniffing picks a reader)
//!
//! # Disposal
//!
//! - `Keep` / `Any`: leave the frame on the canvas
//! - `Background`: clear the frame rect to transparent before the next frame
//! - `Previous`: restore the canvas as it was before the frame was drawn

use gif::DisposalMethod;
use image::ImageFormat;
use log::{debug, trace, warn};
use std::io::Cursor;
use std::num::NonZeroU64;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::frame::Frame;
use super::traits::FrameSource;
use crate::error::{ConstructionError, DecodeError};

type GifDecoder = gif::Decoder<Cursor<Arc<[u8]>>>;

/// Largest RGBA canvas (and per-frame decoder buffer) a GIF may declare: 256 MiB
pub const MAX_CANVAS_BYTES: u64 = 256 * 1024 * 1024;

/// Pick a reader for the payload by sniffing its magic bytes.
pub fn open_source(data: Arc<[u8]>) -> Result<Arc<dyn FrameSource>, ConstructionError> {
    if data.is_empty() {
        return Err(ConstructionError::EmptyPayload);
    }

    match image::guess_format(&data) {
        Ok(ImageFormat::Gif) => Ok(Arc::new(GifSource::open(data)?)),
        Ok(format @ (ImageFormat::Png | ImageFormat::Jpeg)) => {
            debug!("Opening {:?} payload as a still image", format);
            Ok(Arc::new(StillSource::open(data, format)?))
        }
        _ => Err(ConstructionError::UnrecognizedFormat),
    }
}

/// Frame rectangle in canvas coordinates
#[derive(Debug, Clone, Copy)]
struct Rect {
    left: usize,
    top: usize,
    width: usize,
    height: usize,
}

/// Disposal owed by the last drawn frame
struct PendingDisposal {
    method: DisposalMethod,
    rect: Rect,
    saved: Option<Vec<u8>>, // Canvas before the frame (Previous only)
}

/// Sequential decode cursor over the container
struct Replay {
    decoder: GifDecoder,
    canvas: Vec<u8>,
    next_index: usize,
    pending: Option<PendingDisposal>,
}

impl Replay {
    fn start(data: &Arc<[u8]>, width: u32, height: u32) -> Result<Self, String> {
        let decoder = rgba_decoder(data).map_err(|e| e.to_string())?;
        let len = canvas_bytes(width, height) as usize;
        let mut canvas = Vec::new();
        canvas
            .try_reserve_exact(len)
            .map_err(|e| format!("cannot allocate {}x{} canvas: {}", width, height, e))?;
        canvas.resize(len, 0);

        Ok(Self {
            decoder,
            canvas,
            next_index: 0,
            pending: None,
        })
    }

    /// Draw frames until `target` is on the canvas; returns a copy of the canvas.
    fn advance_to(&mut self, target: usize, width: u32, height: u32) -> Result<Vec<u8>, String> {
        let (canvas_w, canvas_h) = (width as usize, height as usize);

        loop {
            if let Some(pending) = self.pending.take() {
                match pending.method {
                    DisposalMethod::Background => clear_rect(&mut self.canvas, canvas_w, canvas_h, pending.rect),
                    DisposalMethod::Previous => {
                        if let Some(saved) = pending.saved {
                            self.canvas = saved;
                        }
                    }
                    DisposalMethod::Keep | DisposalMethod::Any => {}
                }
            }

            let frame = match self.decoder.read_next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => return Err(format!("container ended before frame {}", target)),
                Err(e) => return Err(e.to_string()),
            };

            let rect = Rect {
                left: usize::from(frame.left),
                top: usize::from(frame.top),
                width: usize::from(frame.width),
                height: usize::from(frame.height),
            };
            let saved = (frame.dispose == DisposalMethod::Previous).then(|| self.canvas.clone());
            blit(&mut self.canvas, canvas_w, canvas_h, &frame.buffer, rect);
            self.pending = Some(PendingDisposal {
                method: frame.dispose,
                rect,
                saved,
            });

            let index = self.next_index;
            self.next_index += 1;
            if index == target {
                return Ok(self.canvas.clone());
            }
        }
    }
}

fn canvas_bytes(width: u32, height: u32) -> u64 {
    u64::from(width) * u64::from(height) * 4
}

fn rgba_decoder(data: &Arc<[u8]>) -> Result<GifDecoder, gif::DecodingError> {
    let mut options = gif::DecodeOptions::new();
    options.set_color_output(gif::ColorOutput::RGBA);
    let limit = NonZeroU64::new(MAX_CANVAS_BYTES).map_or(gif::MemoryLimit::Unlimited, gif::MemoryLimit::Bytes);
    options.set_memory_limit(limit);
    options.read_info(Cursor::new(Arc::clone(data)))
}

/// Draw an RGBA frame over the canvas; fully transparent pixels are skipped.
fn blit(canvas: &mut [u8], canvas_w: usize, canvas_h: usize, pixels: &[u8], rect: Rect) {
    for row in 0..rect.height {
        let y = rect.top + row;
        if y >= canvas_h {
            break;
        }
        for col in 0..rect.width {
            let x = rect.left + col;
            if x >= canvas_w {
                break;
            }
            let src = (row * rect.width + col) * 4;
            let Some(px) = pixels.get(src..src + 4) else {
                return;
            };
            if px[3] == 0 {
                continue;
            }
            let dst = (y * canvas_w + x) * 4;
            canvas[dst..dst + 4].copy_from_slice(px);
        }
    }
}

fn clear_rect(canvas: &mut [u8], canvas_w: usize, canvas_h: usize, rect: Rect) {
    let x_end = (rect.left + rect.width).min(canvas_w);
    for y in rect.top..(rect.top + rect.height).min(canvas_h) {
        if rect.left >= x_end {
            break;
        }
        let start = (y * canvas_w + rect.left) * 4;
        let end = (y * canvas_w + x_end) * 4;
        canvas[start..end].fill(0);
    }
}

/// Animated GIF reader
pub struct GifSource {
    data: Arc<[u8]>,
    width: u32,
    height: u32,
    delays: Vec<Duration>,
    loop_count: u32,
    replay: Mutex<Option<Replay>>,
}

impl GifSource {
    /// Scan the container: screen size, per-frame delays and loop count.
    ///
    /// Frame pixel data is not composited here; only metadata is walked.
    pub fn open(data: Arc<[u8]>) -> Result<Self, ConstructionError> {
        let mut decoder = rgba_decoder(&data).map_err(|e| ConstructionError::Malformed(e.to_string()))?;
        let (width, height) = (u32::from(decoder.width()), u32::from(decoder.height()));
        if width == 0 || height == 0 {
            return Err(ConstructionError::Malformed(format!(
                "logical screen is {}x{}",
                width, height
            )));
        }
        if canvas_bytes(width, height) > MAX_CANVAS_BYTES {
            return Err(ConstructionError::Malformed(format!(
                "logical screen {}x{} exceeds the {} byte canvas limit",
                width, height, MAX_CANVAS_BYTES
            )));
        }

        let mut delays = Vec::new();
        loop {
            match decoder.next_frame_info() {
                // GIF delays are in hundredths of a second
                Ok(Some(frame)) => delays.push(Duration::from_millis(u64::from(frame.delay) * 10)),
                Ok(None) => break,
                Err(e) if delays.is_empty() => return Err(ConstructionError::Malformed(e.to_string())),
                Err(e) => {
                    warn!("GIF scan stopped after {} frames: {}", delays.len(), e);
                    break;
                }
            }
        }

        if delays.is_empty() {
            return Err(ConstructionError::NoFrames);
        }

        let loop_count = match decoder.repeat() {
            gif::Repeat::Infinite => 0,
            // No NETSCAPE extension: play once
            gif::Repeat::Finite(0) => 1,
            gif::Repeat::Finite(n) => u32::from(n),
        };

        debug!(
            "GIF opened: {}x{}, {} frames, loop_count={}",
            width,
            height,
            delays.len(),
            loop_count
        );

        Ok(Self {
            data,
            width,
            height,
            delays,
            loop_count,
            replay: Mutex::new(None),
        })
    }
}

impl FrameSource for GifSource {
    fn data(&self) -> &[u8] {
        &self.data
    }

    fn frame_count(&self) -> usize {
        self.delays.len()
    }

    fn declared_delay(&self, index: usize) -> Duration {
        self.delays.get(index).copied().unwrap_or_default()
    }

    fn loop_count(&self) -> u32 {
        self.loop_count
    }

    fn canvas_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn decode_frame(&self, index: usize) -> Result<Frame, DecodeError> {
        let frame_count = self.delays.len();
        if index >= frame_count {
            return Err(DecodeError::OutOfRange { index, frame_count });
        }

        let malformed = |reason: String| DecodeError::Malformed { index, reason };
        let mut slot = self.replay.lock().unwrap_or_else(|e| e.into_inner());

        // Backward jump or fresh start: replay from frame 0
        let resumable = slot.as_ref().is_some_and(|r| r.next_index <= index);
        if !resumable {
            trace!("GIF replay restart for frame {}", index);
            *slot = Some(Replay::start(&self.data, self.width, self.height).map_err(malformed)?);
        }

        let Some(replay) = slot.as_mut() else {
            return Err(malformed("replay cursor unavailable".to_string()));
        };

        match replay.advance_to(index, self.width, self.height) {
            Ok(canvas) => Frame::from_rgba(index, self.width, self.height, canvas),
            Err(reason) => {
                // Cursor state is unknown after an error; next call restarts
                *slot = None;
                Err(malformed(reason))
            }
        }
    }
}

/// Single-frame still image (PNG, JPEG), played as a one-frame animation
pub struct StillSource {
    data: Arc<[u8]>,
    format: ImageFormat,
    width: u32,
    height: u32,
}

impl StillSource {
    pub fn open(data: Arc<[u8]>, format: ImageFormat) -> Result<Self, ConstructionError> {
        let reader = image::ImageReader::with_format(Cursor::new(&data[..]), format);
        let (width, height) = reader
            .into_dimensions()
            .map_err(|e| ConstructionError::Malformed(e.to_string()))?;

        Ok(Self {
            data,
            format,
            width,
            height,
        })
    }
}

impl FrameSource for StillSource {
    fn data(&self) -> &[u8] {
        &self.data
    }

    fn frame_count(&self) -> usize {
        1
    }

    fn declared_delay(&self, _index: usize) -> Duration {
        Duration::ZERO
    }

    fn loop_count(&self) -> u32 {
        0
    }

    fn canvas_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn decode_frame(&self, index: usize) -> Result<Frame, DecodeError> {
        if index != 0 {
            return Err(DecodeError::OutOfRange { index, frame_count: 1 });
        }
        let image = image::load_from_memory_with_format(&self.data, self.format).map_err(|e| {
            DecodeError::Malformed {
                index,
                reason: e.to_string(),
            }
        })?;
        Ok(Frame::from_rgba_image(index, image.to_rgba8()))
    }
}
