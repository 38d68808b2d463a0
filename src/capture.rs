//! The capture subsystem.
//!
//! [`Camera`] is the single long-lived handle constructed at start-up and
//! shared (behind an `Arc`) with every consumer. It owns:
//!
//! - the capture thread, which drives the connection state machine
//! - the [`FrameStore`] the thread publishes into
//! - the replaceable [`CameraEndpoint`]
//! - the status flags polled by health callers
//!
//! State machine, one step per loop tick:
//!
//! ```text
//! Disconnected --connect ok--> Connected --read ok--> Connected (sleep frame interval)
//!      ^   \--connect err--> sleep reconnect interval --^
//!      \------------------- read err: release, clear store, sleep retry delay
//! ```
//!
//! Every sleep wakes on the stop signal, and the transport handle lives in
//! the state value itself, so leaving the loop on any path drops (and
//! releases) it.

use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::encode::{encode_jpeg, to_base64, DEFAULT_JPEG_QUALITY};
use crate::endpoint::{CameraEndpoint, CandidateUrl};
use crate::error::{ConnectError, ReadError};
use crate::frame::{Frame, FrameStore};
use crate::ingest::{DefaultOpener, FrameSource, TransportOpener, TransportOptions};
use crate::mjpeg::{FrameFeed, MjpegStream};
use crate::negotiate::{Connection, Negotiator};
use crate::signal::StopSignal;

pub const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_READ_RETRY_DELAY: Duration = Duration::from_secs(1);
pub const DEFAULT_FRAME_INTERVAL: Duration = Duration::from_millis(33);

/// Fixed retry and pacing intervals. No jitter, no exponential growth.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CapturePolicy {
    /// Wait after a negotiation that found no working candidate.
    pub reconnect_interval: Duration,
    /// Wait after a mid-stream read failure before renegotiating.
    pub read_retry_delay: Duration,
    /// Pause between successful reads; also the MJPEG cadence.
    pub frame_interval: Duration,
    pub jpeg_quality: u8,
}

impl Default for CapturePolicy {
    fn default() -> Self {
        Self {
            reconnect_interval: DEFAULT_RECONNECT_INTERVAL,
            read_retry_delay: DEFAULT_READ_RETRY_DELAY,
            frame_interval: DEFAULT_FRAME_INTERVAL,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Connected,
    /// The last negotiation exhausted every candidate.
    Failed,
}

#[derive(Clone, Debug, Serialize)]
pub struct CaptureStatus {
    #[serde(rename = "camera_connected")]
    pub connected: bool,
    pub state: ConnectionState,
    pub last_error: Option<String>,
    /// Redacted URL of the live handle.
    pub active_url: Option<String>,
    pub frames_captured: u64,
    pub reconnects: u64,
}

impl Default for CaptureStatus {
    fn default() -> Self {
        Self {
            connected: false,
            state: ConnectionState::Disconnected,
            last_error: None,
            active_url: None,
            frames_captured: 0,
            reconnects: 0,
        }
    }
}

struct Shared {
    frames: FrameStore,
    endpoint: RwLock<CameraEndpoint>,
    status: Mutex<CaptureStatus>,
    stop: StopSignal,
    policy: CapturePolicy,
    negotiator: Negotiator,
}

impl Shared {
    fn status(&self) -> MutexGuard<'_, CaptureStatus> {
        self.status.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn current_endpoint(&self) -> CameraEndpoint {
        match self.endpoint.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn on_connected(&self, candidate: &CandidateUrl) {
        let mut status = self.status();
        status.connected = true;
        status.state = ConnectionState::Connected;
        status.last_error = None;
        status.active_url = Some(candidate.redacted());
    }

    fn on_connect_failed(&self, err: &ConnectError) {
        let mut status = self.status();
        status.connected = false;
        status.state = ConnectionState::Failed;
        status.last_error = Some(err.to_string());
        status.active_url = None;
    }

    fn on_frame(&self, frame: Frame) {
        self.frames.publish(frame);
        self.status().frames_captured += 1;
    }

    fn on_read_failed(&self, err: &ReadError) {
        {
            let mut status = self.status();
            status.connected = false;
            status.state = ConnectionState::Disconnected;
            status.last_error = Some(format!("frame grab failed: {}", err));
            status.active_url = None;
            status.reconnects += 1;
        }
        self.frames.clear();
    }

    fn on_stopped(&self) {
        let mut status = self.status();
        status.connected = false;
        status.state = ConnectionState::Disconnected;
        status.active_url = None;
    }
}

impl FrameFeed for Shared {
    fn latest(&self) -> Option<Frame> {
        self.frames.latest()
    }

    fn last_error(&self) -> Option<String> {
        self.status().last_error.clone()
    }

    fn stop_signal(&self) -> &StopSignal {
        &self.stop
    }
}

struct Link {
    candidate: CandidateUrl,
    source: Box<dyn FrameSource>,
}

enum LinkState {
    Disconnected,
    Connected(Link),
}

fn capture_loop(shared: Arc<Shared>) {
    let policy = shared.policy.clone();
    let mut state = LinkState::Disconnected;

    while !shared.stop.is_stopped() {
        state = match state {
            LinkState::Disconnected => {
                let endpoint = shared.current_endpoint();
                match shared.negotiator.connect(&endpoint, &shared.stop) {
                    Ok(Connection {
                        candidate,
                        source,
                        first_frame,
                    }) => {
                        shared.on_connected(&candidate);
                        shared.on_frame(first_frame);
                        LinkState::Connected(Link { candidate, source })
                    }
                    Err(ConnectError::Cancelled) => break,
                    Err(err) => {
                        shared.on_connect_failed(&err);
                        if shared.stop.sleep(policy.reconnect_interval) {
                            break;
                        }
                        LinkState::Disconnected
                    }
                }
            }
            LinkState::Connected(mut link) => match link.source.read_frame() {
                Ok(frame) => {
                    shared.on_frame(frame);
                    if shared.stop.sleep(policy.frame_interval) {
                        drop(link);
                        break;
                    }
                    LinkState::Connected(link)
                }
                Err(err) => {
                    log::warn!(
                        "Camera: frame grab failed on {}, reconnecting: {}",
                        link.candidate,
                        err
                    );
                    drop(link);
                    shared.on_read_failed(&err);
                    if shared.stop.sleep(policy.read_retry_delay) {
                        break;
                    }
                    LinkState::Disconnected
                }
            },
        };
    }

    shared.on_stopped();
    log::info!("Camera: capture loop stopped");
}

/// Handle to the capture subsystem.
pub struct Camera {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Camera {
    pub fn new(
        endpoint: CameraEndpoint,
        policy: CapturePolicy,
        opener: Arc<dyn TransportOpener>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                frames: FrameStore::new(),
                endpoint: RwLock::new(endpoint),
                status: Mutex::new(CaptureStatus::default()),
                stop: StopSignal::new(),
                policy,
                negotiator: Negotiator::new(opener),
            }),
            worker: Mutex::new(None),
        }
    }

    /// Camera backed by the built-in RTSP/HTTP/stub transports.
    pub fn with_default_transports(
        endpoint: CameraEndpoint,
        policy: CapturePolicy,
        options: TransportOptions,
    ) -> Self {
        Self::new(endpoint, policy, Arc::new(DefaultOpener::new(options)))
    }

    /// Spawn the capture thread. Starting a running camera is a no-op.
    pub fn start(&self) -> Result<()> {
        let mut worker = self.worker();
        if worker.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return Ok(());
        }
        if let Some(stale) = worker.take() {
            let _ = stale.join();
        }
        self.shared.stop.reset();

        let shared = self.shared.clone();
        let handle = std::thread::Builder::new()
            .name("camera-capture".into())
            .spawn(move || capture_loop(shared))
            .context("spawn capture thread")?;
        *worker = Some(handle);
        log::info!("Camera: capture thread started");
        Ok(())
    }

    /// Raise the stop signal and wait for the capture thread to release its
    /// handle and exit. Open MJPEG streams end on their next tick.
    pub fn stop(&self) -> Result<()> {
        self.shared.stop.stop();
        // release the worker lock before joining
        let handle = self.worker().take();
        if let Some(handle) = handle {
            handle
                .join()
                .map_err(|_| anyhow!("capture thread panicked"))?;
        }
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.worker()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    pub fn status(&self) -> CaptureStatus {
        self.shared.status().clone()
    }

    pub fn is_connected(&self) -> bool {
        self.shared.status().connected
    }

    pub fn last_error(&self) -> Option<String> {
        self.shared.status().last_error.clone()
    }

    pub fn policy(&self) -> &CapturePolicy {
        &self.shared.policy
    }

    /// Independent copy of the current frame.
    pub fn latest_frame(&self) -> Option<Frame> {
        self.shared.frames.latest()
    }

    /// The current frame as JPEG, or `None` when no frame is available.
    /// Encode failures count as "no frame".
    pub fn snapshot_jpeg(&self, quality: u8) -> Option<Vec<u8>> {
        let frame = self.latest_frame()?;
        match encode_jpeg(&frame, quality) {
            Ok(jpeg) => Some(jpeg),
            Err(err) => {
                log::warn!("Camera: snapshot encode failed: {}", err);
                None
            }
        }
    }

    /// The current frame as base64 JPEG text, for JSON payloads.
    pub fn snapshot_base64(&self, quality: u8) -> Option<String> {
        self.snapshot_jpeg(quality).map(|jpeg| to_base64(&jpeg))
    }

    /// A fresh MJPEG chunk iterator at the capture cadence.
    pub fn mjpeg_stream(&self) -> MjpegStream {
        MjpegStream::new(
            self.shared.clone(),
            self.shared.policy.frame_interval,
            self.shared.policy.jpeg_quality,
        )
    }

    pub fn endpoint(&self) -> CameraEndpoint {
        self.shared.current_endpoint()
    }

    /// Replace the endpoint wholesale. The next negotiation uses it; an
    /// already-open handle is left alone.
    pub fn update_endpoint(&self, endpoint: CameraEndpoint) {
        let identity = endpoint.identity();
        match self.shared.endpoint.write() {
            Ok(mut guard) => *guard = endpoint,
            Err(poisoned) => *poisoned.into_inner() = endpoint,
        }
        log::info!(
            "Camera: endpoint updated to {}; applies to the next connection attempt",
            identity
        );
    }

    fn worker(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.worker.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for Camera {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            log::error!("Camera: {}", err);
        }
    }
}
