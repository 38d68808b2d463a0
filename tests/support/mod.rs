//! Scripted transports shared by the integration tests.

#![allow(dead_code)]

use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use whosthat_camera::{CandidateUrl, Frame, FrameSource, ReadError, StopSignal, TransportOpener};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Behavior {
    RefuseOpen,
    /// Opens, then fails every read.
    FailRead,
    Serve,
}

/// Opener whose outcome per candidate path is scripted by the test.
///
/// `set_up(false)` simulates the camera dropping off the network: every open
/// is refused and every live handle starts failing reads.
pub struct ScriptedOpener {
    up: Arc<AtomicBool>,
    default: Mutex<Behavior>,
    rules: Mutex<HashMap<String, Behavior>>,
    attempts: Mutex<Vec<String>>,
    opened: AtomicUsize,
    released: Arc<AtomicUsize>,
    stop_on_attempt: Mutex<Option<(usize, Arc<StopSignal>)>>,
    read_delay: Arc<Mutex<Duration>>,
    reading: Arc<AtomicBool>,
}

impl ScriptedOpener {
    pub fn new(default: Behavior) -> Arc<Self> {
        Arc::new(Self {
            up: Arc::new(AtomicBool::new(true)),
            default: Mutex::new(default),
            rules: Mutex::new(HashMap::new()),
            attempts: Mutex::new(Vec::new()),
            opened: AtomicUsize::new(0),
            released: Arc::new(AtomicUsize::new(0)),
            stop_on_attempt: Mutex::new(None),
            read_delay: Arc::new(Mutex::new(Duration::ZERO)),
            reading: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn rule(self: &Arc<Self>, path: &str, behavior: Behavior) -> Arc<Self> {
        self.rules.lock().unwrap().insert(path.to_string(), behavior);
        self.clone()
    }

    pub fn set_default(&self, behavior: Behavior) {
        *self.default.lock().unwrap() = behavior;
    }

    pub fn set_up(&self, up: bool) {
        self.up.store(up, Ordering::SeqCst);
    }

    /// Raise `stop` while the `n`th (1-based) candidate is being opened.
    pub fn stop_on_attempt(&self, n: usize, stop: Arc<StopSignal>) {
        *self.stop_on_attempt.lock().unwrap() = Some((n, stop));
    }

    /// Make every read block for `delay` before answering, like a camera
    /// that stalls mid-stream.
    pub fn set_read_delay(&self, delay: Duration) {
        *self.read_delay.lock().unwrap() = delay;
    }

    /// True while some handle is blocked inside a read.
    pub fn reading(&self) -> bool {
        self.reading.load(Ordering::SeqCst)
    }

    pub fn attempts(&self) -> Vec<String> {
        self.attempts.lock().unwrap().clone()
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }
}

impl TransportOpener for ScriptedOpener {
    fn open(&self, candidate: &CandidateUrl) -> Result<Box<dyn FrameSource>> {
        let attempt = {
            let mut attempts = self.attempts.lock().unwrap();
            attempts.push(candidate.url.clone());
            attempts.len()
        };
        if let Some((n, stop)) = self.stop_on_attempt.lock().unwrap().as_ref() {
            if *n == attempt {
                stop.stop();
            }
        }

        if !self.up.load(Ordering::SeqCst) {
            return Err(anyhow!("connection refused"));
        }
        let behavior = self
            .rules
            .lock()
            .unwrap()
            .get(&candidate.path)
            .copied()
            .unwrap_or(*self.default.lock().unwrap());
        if behavior == Behavior::RefuseOpen {
            return Err(anyhow!("connection refused"));
        }

        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedSource {
            up: self.up.clone(),
            released: self.released.clone(),
            fail_reads: behavior == Behavior::FailRead,
            reads: 0,
            read_delay: self.read_delay.clone(),
            reading: self.reading.clone(),
        }))
    }
}

struct ScriptedSource {
    up: Arc<AtomicBool>,
    released: Arc<AtomicUsize>,
    fail_reads: bool,
    reads: u8,
    read_delay: Arc<Mutex<Duration>>,
    reading: Arc<AtomicBool>,
}

impl FrameSource for ScriptedSource {
    fn read_frame(&mut self) -> Result<Frame, ReadError> {
        let delay = *self.read_delay.lock().unwrap();
        if !delay.is_zero() {
            self.reading.store(true, Ordering::SeqCst);
            std::thread::sleep(delay);
            self.reading.store(false, Ordering::SeqCst);
        }
        if self.fail_reads {
            return Err(ReadError::EndOfStream);
        }
        if !self.up.load(Ordering::SeqCst) {
            return Err(ReadError::Transport("connection reset by peer".into()));
        }
        self.reads = self.reads.wrapping_add(1);
        Ok(Frame::from_rgb(8, 8, vec![self.reads; 8 * 8 * 3])?)
    }

    fn set_buffer_depth(&mut self, _frames: u32) {}
}

impl Drop for ScriptedSource {
    fn drop(&mut self) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn wait_for(deadline: Duration, mut check: impl FnMut() -> bool) -> bool {
    let started = Instant::now();
    while started.elapsed() < deadline {
        if check() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    check()
}
