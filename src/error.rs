//! Error types for image construction and per-frame decoding.
//!
//! Construction errors are fatal and surface to the caller. Decode errors are
//! recoverable: the cache marks the frame undecodable and playback substitutes
//! the poster frame.

use thiserror::Error;

/// Failure to build an [`AnimatedImage`](crate::AnimatedImage). No partial object is produced.
#[derive(Debug, Error)]
pub enum ConstructionError {
    #[error("payload is empty")]
    EmptyPayload,
    #[error("payload is not a recognized image container")]
    UnrecognizedFormat,
    #[error("malformed container: {0}")]
    Malformed(String),
    #[error("container declares zero frames")]
    NoFrames,
    #[error("none of the {frame_count} frames could be decoded")]
    NoDecodableFrame { frame_count: usize },
    #[error("failed to start decode worker: {0}")]
    Worker(#[from] std::io::Error),
}

/// Failure to decode a single frame.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("frame {index} is malformed: {reason}")]
    Malformed { index: usize, reason: String },
    #[error("frame {index} out of range (frame count {frame_count})")]
    OutOfRange { index: usize, frame_count: usize },
}

impl DecodeError {
    /// Index of the frame that failed.
    pub fn index(&self) -> usize {
        match self {
            DecodeError::Malformed { index, .. } | DecodeError::OutOfRange { index, .. } => *index,
        }
    }
}
