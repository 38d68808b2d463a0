//! RTSP frame source (feature: rtsp-gstreamer).
//!
//! Pipeline: `rtspsrc ! decodebin ! videoconvert ! RGB appsink`. RTSP is
//! requested over TCP interleaved transport, which survives home NAT and Wi-Fi
//! loss far better than UDP. The appsink drops old buffers, so after
//! [`FrameSource::set_buffer_depth`] a read returns the freshest frame.
//!
//! Dropping the source sets the pipeline to `Null`, releasing the session.

use anyhow::{anyhow, Context, Result};
use gstreamer::prelude::*;
use std::time::Duration;

use super::{FrameSource, TransportOptions};
use crate::endpoint::redact_url;
use crate::error::ReadError;
use crate::frame::Frame;

const PIPELINE: &str = "rtspsrc name=src latency=0 protocols=tcp ! decodebin ! videoconvert ! \
     video/x-raw,format=RGB ! appsink name=appsink sync=false max-buffers=4 drop=true";

pub struct RtspSource {
    url: String,
    pipeline: gstreamer::Pipeline,
    appsink: gstreamer_app::AppSink,
    read_timeout: Duration,
}

impl RtspSource {
    pub fn open(url: &str, options: &TransportOptions) -> Result<Self> {
        gstreamer::init().context("initialize gstreamer")?;

        let pipeline = gstreamer::parse::launch(PIPELINE)
            .context("build RTSP pipeline")?
            .downcast::<gstreamer::Pipeline>()
            .map_err(|_| anyhow!("RTSP pipeline is not a Pipeline"))?;

        let src = pipeline
            .by_name("src")
            .context("rtspsrc element missing from pipeline")?;
        // set after parsing so credentials never need escaping inside the
        // launch string
        src.set_property("location", url);
        src.set_property("timeout", options.read_timeout.as_micros() as u64);

        let appsink = pipeline
            .by_name("appsink")
            .context("appsink element missing from pipeline")?
            .downcast::<gstreamer_app::AppSink>()
            .map_err(|_| anyhow!("appsink element has unexpected type"))?;
        let caps = gstreamer::Caps::builder("video/x-raw")
            .field("format", "RGB")
            .build();
        appsink.set_caps(Some(&caps));

        let source = Self {
            url: url.to_string(),
            pipeline,
            appsink,
            read_timeout: options.read_timeout,
        };
        source
            .pipeline
            .set_state(gstreamer::State::Playing)
            .with_context(|| format!("start RTSP pipeline for {}", redact_url(url)))?;
        log::debug!("RtspSource: pipeline playing for {}", redact_url(url));
        Ok(source)
    }

    fn bus_error(&self) -> Option<String> {
        let bus = self.pipeline.bus()?;
        while let Some(message) = bus.timed_pop(gstreamer::ClockTime::ZERO) {
            use gstreamer::MessageView;
            match message.view() {
                MessageView::Error(err) => {
                    return Some(format!(
                        "gstreamer error from {:?}: {}",
                        err.src().map(|s| s.path_string()),
                        err.error()
                    ));
                }
                MessageView::Eos(..) => return Some("gstreamer reached EOS".to_string()),
                _ => {}
            }
        }
        None
    }
}

impl FrameSource for RtspSource {
    fn read_frame(&mut self) -> Result<Frame, ReadError> {
        if let Some(err) = self.bus_error() {
            return Err(ReadError::Transport(err));
        }

        let timeout = gstreamer::ClockTime::from_mseconds(self.read_timeout.as_millis() as u64);
        let Some(sample) = self.appsink.try_pull_sample(timeout) else {
            if self.appsink.is_eos() {
                return Err(ReadError::EndOfStream);
            }
            return Err(match self.bus_error() {
                Some(err) => ReadError::Transport(err),
                None => ReadError::Stalled(self.read_timeout),
            });
        };

        sample_to_frame(&sample)
    }

    fn set_buffer_depth(&mut self, frames: u32) {
        self.appsink.set_max_buffers(frames.max(1));
        self.appsink.set_drop(true);
    }
}

impl Drop for RtspSource {
    fn drop(&mut self) {
        if let Err(err) = self.pipeline.set_state(gstreamer::State::Null) {
            log::warn!(
                "RtspSource: failed to release pipeline for {}: {}",
                redact_url(&self.url),
                err
            );
        }
    }
}

fn sample_to_frame(sample: &gstreamer::Sample) -> Result<Frame, ReadError> {
    let buffer = sample
        .buffer()
        .ok_or_else(|| ReadError::transport("RTSP sample missing buffer"))?;
    let caps = sample
        .caps()
        .ok_or_else(|| ReadError::transport("RTSP sample missing caps"))?;
    let info = gstreamer_video::VideoInfo::from_caps(caps).map_err(ReadError::transport)?;

    let width = info.width();
    let height = info.height();
    let row_bytes = (width as usize) * 3;
    let stride = info.stride()[0] as usize;

    let map = buffer.map_readable().map_err(ReadError::transport)?;
    let data = map.as_slice();

    if stride == row_bytes {
        let len = row_bytes * height as usize;
        let pixels = data
            .get(..len)
            .ok_or_else(|| ReadError::transport("RTSP buffer shorter than frame"))?;
        return Ok(Frame::from_rgb(width, height, pixels.to_vec())?);
    }

    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        let end = start + row_bytes;
        pixels.extend_from_slice(
            data.get(start..end)
                .ok_or_else(|| ReadError::transport("RTSP buffer row is out of bounds"))?,
        );
    }
    Ok(Frame::from_rgb(width, height, pixels)?)
}
