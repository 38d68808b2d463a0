//! Transport handles.
//!
//! This module provides the sources a negotiated connection can wrap:
//! - RTSP streams (feature: rtsp-gstreamer)
//! - HTTP MJPEG streams and single-JPEG snapshot URLs
//! - Synthetic `stub://` sources (demos and tests)
//!
//! A source is opened by a [`TransportOpener`] and then owned exclusively by
//! the capture loop. Dropping a source releases its underlying connection, so
//! a partially-opened handle that fails its first read is released simply by
//! letting it go out of scope.

pub mod http;
#[cfg(feature = "rtsp-gstreamer")]
pub mod rtsp;
pub mod synthetic;

use anyhow::Result;
use std::time::Duration;

use crate::endpoint::{CandidateUrl, Transport};
use crate::error::ReadError;
use crate::frame::Frame;

pub use http::HttpSource;
#[cfg(feature = "rtsp-gstreamer")]
pub use rtsp::RtspSource;
pub use synthetic::SyntheticSource;

pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(5);

/// An open connection to the camera capable of yielding frames.
pub trait FrameSource: Send {
    /// Block until the next frame is decoded, or fail.
    fn read_frame(&mut self) -> Result<Frame, ReadError>;

    /// Limit internal buffering to `frames` so reads return the freshest frame.
    fn set_buffer_depth(&mut self, frames: u32);
}

/// Opens a transport handle for one candidate URL.
///
/// Implementations must not keep any resource alive when `open` fails.
pub trait TransportOpener: Send + Sync {
    fn open(&self, candidate: &CandidateUrl) -> Result<Box<dyn FrameSource>>;
}

#[derive(Clone, Debug)]
pub struct TransportOptions {
    /// Upper bound on a single blocking read.
    pub read_timeout: Duration,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }
}

/// Dispatches on the candidate's transport family.
#[derive(Clone, Debug, Default)]
pub struct DefaultOpener {
    options: TransportOptions,
}

impl DefaultOpener {
    pub fn new(options: TransportOptions) -> Self {
        Self { options }
    }
}

impl TransportOpener for DefaultOpener {
    fn open(&self, candidate: &CandidateUrl) -> Result<Box<dyn FrameSource>> {
        match candidate.transport {
            Transport::Synthetic => Ok(Box::new(SyntheticSource::open(&candidate.url)?)),
            Transport::Http => Ok(Box::new(HttpSource::open(&candidate.url, &self.options)?)),
            Transport::Rtsp => open_rtsp(candidate, &self.options),
        }
    }
}

#[cfg(feature = "rtsp-gstreamer")]
fn open_rtsp(
    candidate: &CandidateUrl,
    options: &TransportOptions,
) -> Result<Box<dyn FrameSource>> {
    Ok(Box::new(RtspSource::open(&candidate.url, options)?))
}

#[cfg(not(feature = "rtsp-gstreamer"))]
fn open_rtsp(
    _candidate: &CandidateUrl,
    _options: &TransportOptions,
) -> Result<Box<dyn FrameSource>> {
    anyhow::bail!("RTSP requires the rtsp-gstreamer feature")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_opener_serves_stub_urls() -> Result<()> {
        let candidate = CandidateUrl::from_override("stub://front?width=32&height=24")?;
        let mut source = DefaultOpener::default().open(&candidate)?;
        let frame = source.read_frame()?;
        assert_eq!((frame.width, frame.height), (32, 24));
        Ok(())
    }

    #[cfg(not(feature = "rtsp-gstreamer"))]
    #[test]
    fn rtsp_without_backend_fails_to_open() {
        use crate::endpoint::CameraEndpoint;

        let endpoint = CameraEndpoint::new("127.0.0.1", "u", "p");
        let candidate = &endpoint.candidates()[0];
        let err = DefaultOpener::default().open(candidate).err().expect("open must fail");
        assert!(err.to_string().contains("rtsp-gstreamer"));
    }
}
