//! Shared fixtures for unit tests: GIF encoding and a scripted frame source.

use crossbeam_channel::{Receiver, Sender};
use gif::DisposalMethod;
use std::borrow::Cow;
use std::collections::HashSet;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::entities::{Frame, FrameSource};
use crate::error::DecodeError;

pub const RED: [u8; 4] = [255, 0, 0, 255];
pub const GREEN: [u8; 4] = [0, 255, 0, 255];
pub const BLUE: [u8; 4] = [0, 0, 255, 255];

const PALETTE: [u8; 12] = [255, 0, 0, 0, 255, 0, 0, 0, 255, 0, 0, 0];
const TRANSPARENT_INDEX: u8 = 3;

fn palette_index(color: [u8; 4]) -> u8 {
    match color {
        RED => 0,
        GREEN => 1,
        BLUE => 2,
        _ => TRANSPARENT_INDEX,
    }
}

/// One frame to encode: a solid rect in one palette color
pub struct FramePlan {
    color: [u8; 4],
    rect: Option<(u16, u16, u16, u16)>,
    delay: u16,
    dispose: DisposalMethod,
}

impl FramePlan {
    /// Frame covering the whole canvas; `delay` in hundredths of a second
    pub fn full(color: [u8; 4], delay: u16) -> Self {
        Self {
            color,
            rect: None,
            delay,
            dispose: DisposalMethod::Keep,
        }
    }

    pub fn patch(color: [u8; 4], left: u16, top: u16, width: u16, height: u16, delay: u16) -> Self {
        Self {
            color,
            rect: Some((left, top, width, height)),
            delay,
            dispose: DisposalMethod::Keep,
        }
    }

    pub fn dispose(mut self, method: DisposalMethod) -> Self {
        self.dispose = method;
        self
    }
}

/// Encode a GIF; `repeat`: None = no loop extension, Some(0) = infinite.
pub fn encode_gif(width: u16, height: u16, repeat: Option<u16>, frames: &[FramePlan]) -> Vec<u8> {
    let mut bytes = Vec::new();
    {
        let mut encoder = gif::Encoder::new(&mut bytes, width, height, &PALETTE).unwrap();
        match repeat {
            None => {}
            Some(0) => encoder.set_repeat(gif::Repeat::Infinite).unwrap(),
            Some(n) => encoder.set_repeat(gif::Repeat::Finite(n)).unwrap(),
        }
        for plan in frames {
            let (left, top, w, h) = plan.rect.unwrap_or((0, 0, width, height));
            let mut frame = gif::Frame::default();
            frame.left = left;
            frame.top = top;
            frame.width = w;
            frame.height = h;
            frame.delay = plan.delay;
            frame.dispose = plan.dispose;
            frame.transparent = Some(TRANSPARENT_INDEX);
            frame.buffer = Cow::Owned(vec![palette_index(plan.color); usize::from(w) * usize::from(h)]);
            encoder.write_frame(&frame).unwrap();
        }
    }
    bytes
}

/// In-memory source with scripted delays, failures and decode latency.
pub struct TestSource {
    delays: Vec<Duration>,
    loop_count: u32,
    size: (u32, u32),
    failing: HashSet<usize>,
    latency: Option<Duration>,
    gate: Option<(usize, Sender<usize>, Receiver<()>)>,
    decode_log: Mutex<Vec<usize>>,
}

impl TestSource {
    pub fn new(frame_count: usize) -> Self {
        Self::with_delays_ms(&vec![10; frame_count])
    }

    pub fn with_delays_ms(delays: &[u64]) -> Self {
        Self {
            delays: delays.iter().map(|&ms| Duration::from_millis(ms)).collect(),
            loop_count: 0,
            size: (4, 4),
            failing: HashSet::new(),
            latency: None,
            gate: None,
            decode_log: Mutex::new(Vec::new()),
        }
    }

    pub fn loop_count(mut self, loop_count: u32) -> Self {
        self.loop_count = loop_count;
        self
    }

    pub fn size(mut self, width: u32, height: u32) -> Self {
        self.size = (width, height);
        self
    }

    pub fn failing(mut self, indices: &[usize]) -> Self {
        self.failing.extend(indices.iter().copied());
        self
    }

    pub fn latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Block decodes of `index`: announce on `started`, wait for `release`.
    pub fn gate(mut self, index: usize, started: Sender<usize>, release: Receiver<()>) -> Self {
        self.gate = Some((index, started, release));
        self
    }

    pub fn decodes_of(&self, index: usize) -> usize {
        self.decode_log.lock().unwrap().iter().filter(|&&i| i == index).count()
    }
}

impl FrameSource for TestSource {
    fn data(&self) -> &[u8] {
        &[]
    }

    fn frame_count(&self) -> usize {
        self.delays.len()
    }

    fn declared_delay(&self, index: usize) -> Duration {
        self.delays[index]
    }

    fn loop_count(&self) -> u32 {
        self.loop_count
    }

    fn canvas_size(&self) -> (u32, u32) {
        self.size
    }

    fn decode_frame(&self, index: usize) -> Result<Frame, DecodeError> {
        self.decode_log.lock().unwrap().push(index);

        if let Some((gated, started, release)) = &self.gate {
            if *gated == index {
                let _ = started.send(index);
                let _ = release.recv();
            }
        }
        if let Some(latency) = self.latency {
            std::thread::sleep(latency);
        }
        if self.failing.contains(&index) {
            return Err(DecodeError::Malformed {
                index,
                reason: "scripted failure".to_string(),
            });
        }

        let shade = (index % 256) as u8;
        Ok(Frame::solid(index, self.size.0, self.size.1, [shade, 0, 0, 255]))
    }
}

/// Poll `condition` until it holds or `timeout` elapses.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
}
