//! Decoded frames and the single-slot frame store.
//!
//! - `Frame`: an RGB8 pixel buffer plus dimensions. Immutable once published.
//! - `FrameStore`: holds at most one frame, the latest. One producer (the
//!   capture loop) replaces it; any number of readers copy it out.
//!
//! Readers never receive a reference into the slot. `latest()` clones the
//! frame while the guard is held and returns the copy, so a reader can keep it
//! for as long as it likes without blocking the next publish and without ever
//! seeing a half-written buffer.

use std::sync::{Mutex, MutexGuard};

use crate::error::EncodeError;

/// One decoded image captured from a transport handle.
#[derive(Clone, Debug)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    /// Tightly packed RGB8 rows, `width * height * 3` bytes.
    pixels: Vec<u8>,
}

impl Frame {
    /// Wraps an RGB8 buffer, checking that its length matches the dimensions.
    pub fn from_rgb(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self, EncodeError> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|n| n.checked_mul(3));
        if width == 0 || height == 0 || expected != Some(pixels.len()) {
            return Err(EncodeError::InvalidBuffer {
                width,
                height,
                len: pixels.len(),
            });
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn byte_len(&self) -> usize {
        self.pixels.len()
    }
}

/// Single-slot, thread-safe holder for the current frame.
#[derive(Debug, Default)]
pub struct FrameStore {
    slot: Mutex<Option<Frame>>,
}

impl FrameStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current frame. Called only by the capture loop.
    pub fn publish(&self, frame: Frame) {
        let mut slot = self.lock();
        *slot = Some(frame);
    }

    /// Independent copy of the latest frame, or `None` before the first
    /// successful capture (and after a mid-stream drop).
    pub fn latest(&self) -> Option<Frame> {
        self.lock().clone()
    }

    /// Drop the retained frame so consumers fall back to "no frame".
    pub fn clear(&self) {
        self.lock().take();
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_none()
    }

    // Nothing inside the guard can panic halfway through a write, so a
    // poisoned slot still holds a whole frame or none.
    fn lock(&self) -> MutexGuard<'_, Option<Frame>> {
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
