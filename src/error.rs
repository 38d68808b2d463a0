//! Typed failures of the capture subsystem.
//!
//! All three kinds are absorbed by the capture loop and turned into state
//! transitions. Callers of the frame store and the MJPEG emitter only ever
//! observe "no frame yet" or a valid frame.

use thiserror::Error;

/// No candidate URL produced a live, readable stream.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("cannot reach camera at {host}")]
    Unreachable { host: String, attempts: usize },
    #[error("no candidate urls configured for camera at {host}")]
    NoCandidates { host: String },
    #[error("negotiation cancelled")]
    Cancelled,
}

impl ConnectError {
    /// Host identity of the endpoint the negotiation was run against.
    pub fn host(&self) -> Option<&str> {
        match self {
            ConnectError::Unreachable { host, .. } | ConnectError::NoCandidates { host } => {
                Some(host)
            }
            ConnectError::Cancelled => None,
        }
    }
}

/// A previously-open transport handle stopped delivering frames.
#[derive(Debug, Error)]
pub enum ReadError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("stream stalled: no frame within {0:?}")]
    Stalled(std::time::Duration),
    #[error("stream ended")]
    EndOfStream,
    #[error(transparent)]
    Decode(#[from] EncodeError),
}

impl ReadError {
    pub(crate) fn transport(err: impl std::fmt::Display) -> Self {
        ReadError::Transport(err.to_string())
    }
}

/// A frame could not be encoded, or received bytes could not be decoded.
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("frame buffer of {len} bytes does not match {width}x{height} rgb")]
    InvalidBuffer { width: u32, height: u32, len: usize },
    #[error("jpeg quality {0} outside 1..=100")]
    InvalidQuality(u8),
    #[error("jpeg encode failed: {0}")]
    Encode(#[source] image::ImageError),
    #[error("jpeg decode failed: {0}")]
    Decode(#[source] image::ImageError),
}
