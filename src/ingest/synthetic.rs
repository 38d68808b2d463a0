//! Synthetic frame source for `stub://` URLs.
//!
//! Lets the daemon and the tests run the full capture path without camera
//! hardware. Query parameters shape the stream:
//!
//! - `width`, `height`: frame size (default 640x480)
//! - `fail_after`: end the stream after this many frames, to exercise
//!   reconnection

use anyhow::{anyhow, Context, Result};
use url::Url;

use super::FrameSource;
use crate::error::ReadError;
use crate::frame::Frame;

const DEFAULT_WIDTH: u32 = 640;
const DEFAULT_HEIGHT: u32 = 480;

pub struct SyntheticSource {
    url: String,
    width: u32,
    height: u32,
    fail_after: Option<u64>,
    frame_count: u64,
    /// Simulated scene state, bumped every 50 frames.
    scene_state: u8,
}

impl SyntheticSource {
    pub fn open(raw: &str) -> Result<Self> {
        let url = Url::parse(raw).context("parse stub url")?;
        if url.scheme() != "stub" {
            return Err(anyhow!("synthetic source expects stub://, got {}://", url.scheme()));
        }

        let mut width = DEFAULT_WIDTH;
        let mut height = DEFAULT_HEIGHT;
        let mut fail_after = None;
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "width" => width = value.parse().context("stub width")?,
                "height" => height = value.parse().context("stub height")?,
                "fail_after" => fail_after = Some(value.parse().context("stub fail_after")?),
                other => log::debug!("SyntheticSource: ignoring query parameter {}", other),
            }
        }
        if width == 0 || height == 0 {
            return Err(anyhow!("stub dimensions must be non-zero"));
        }

        log::info!("SyntheticSource: opened {} ({}x{})", raw, width, height);
        Ok(Self {
            url: raw.to_string(),
            width,
            height,
            fail_after,
            frame_count: 0,
            scene_state: 0,
        })
    }

    fn generate_pixels(&mut self) -> Vec<u8> {
        let pixel_count = (self.width * self.height * 3) as usize;
        if self.frame_count % 50 == 0 {
            self.scene_state = self.scene_state.wrapping_add(1);
        }
        let mut pixels = vec![0u8; pixel_count];
        for (i, pixel) in pixels.iter_mut().enumerate() {
            *pixel = ((i as u64 / 3 + self.frame_count + self.scene_state as u64 * 40) % 256) as u8;
        }
        pixels
    }
}

impl FrameSource for SyntheticSource {
    fn read_frame(&mut self) -> Result<Frame, ReadError> {
        if let Some(limit) = self.fail_after {
            if self.frame_count >= limit {
                return Err(ReadError::EndOfStream);
            }
        }
        self.frame_count += 1;
        let pixels = self.generate_pixels();
        Ok(Frame::from_rgb(self.width, self.height, pixels)?)
    }

    fn set_buffer_depth(&mut self, _frames: u32) {}
}

impl Drop for SyntheticSource {
    fn drop(&mut self) {
        log::debug!(
            "SyntheticSource: released {} after {} frames",
            self.url,
            self.frame_count
        );
    }
}
