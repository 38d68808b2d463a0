//! MJPEG emitter.
//!
//! [`MjpegStream`] is a cancellable iterator of multipart chunks. Each pull
//! encodes whatever the frame feed holds at that moment (or the no-signal
//! placeholder), so a stream never buffers history and never goes silent
//! while the camera is away. The iterator ends when the feed's stop signal is
//! raised; the HTTP layer ends it early by dropping it when a client leaves.

use std::sync::Arc;
use std::time::Duration;

use crate::encode::{encode_jpeg, no_signal_placeholder};
use crate::frame::Frame;
use crate::signal::StopSignal;

pub const BOUNDARY: &str = "frame";
pub const CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=frame";

/// Source of frames for an emitter.
pub trait FrameFeed: Send + Sync {
    fn latest(&self) -> Option<Frame>;

    /// Most recent capture failure, drawn onto the placeholder.
    fn last_error(&self) -> Option<String>;

    fn stop_signal(&self) -> &StopSignal;
}

/// Frame one JPEG payload as a multipart part.
pub fn part(jpeg: &[u8]) -> Vec<u8> {
    let header = format!("--{}\r\nContent-Type: image/jpeg\r\n\r\n", BOUNDARY);
    let mut chunk = Vec::with_capacity(header.len() + jpeg.len() + 2);
    chunk.extend_from_slice(header.as_bytes());
    chunk.extend_from_slice(jpeg);
    chunk.extend_from_slice(b"\r\n");
    chunk
}

pub struct MjpegStream {
    feed: Arc<dyn FrameFeed>,
    cadence: Duration,
    quality: u8,
    started: bool,
    finished: bool,
}

impl MjpegStream {
    pub fn new(feed: Arc<dyn FrameFeed>, cadence: Duration, quality: u8) -> Self {
        Self {
            feed,
            cadence,
            quality,
            started: false,
            finished: false,
        }
    }

    fn encode_current(&self) -> Option<Vec<u8>> {
        if let Some(frame) = self.feed.latest() {
            match encode_jpeg(&frame, self.quality) {
                Ok(jpeg) => return Some(jpeg),
                Err(err) => {
                    log::warn!("MjpegStream: frame encode failed, sending placeholder: {}", err)
                }
            }
        }
        let last_error = self.feed.last_error();
        match no_signal_placeholder(last_error.as_deref()) {
            Ok(jpeg) => Some(jpeg),
            Err(err) => {
                log::error!("MjpegStream: placeholder encode failed: {}", err);
                None
            }
        }
    }
}

impl Iterator for MjpegStream {
    type Item = Vec<u8>;

    fn next(&mut self) -> Option<Vec<u8>> {
        loop {
            if self.finished {
                return None;
            }
            // The first chunk goes out immediately; later ones wait one tick.
            let stopped = if self.started {
                self.feed.stop_signal().sleep(self.cadence)
            } else {
                self.feed.stop_signal().is_stopped()
            };
            self.started = true;
            if stopped {
                self.finished = true;
                return None;
            }
            if let Some(jpeg) = self.encode_current() {
                return Some(part(&jpeg));
            }
        }
    }
}

impl std::iter::FusedIterator for MjpegStream {}
