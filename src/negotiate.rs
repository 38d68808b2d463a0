//! Connection negotiation.
//!
//! Walks the endpoint's candidate list in priority order. A candidate wins
//! only when it both opens and yields one decoded frame: some cameras accept a
//! connection on any path and then never deliver a picture. Handles that fail
//! either step are dropped (and therefore released) before the next attempt.

use std::sync::Arc;

use crate::endpoint::{CameraEndpoint, CandidateUrl};
use crate::error::ConnectError;
use crate::frame::Frame;
use crate::ingest::{FrameSource, TransportOpener};
use crate::signal::StopSignal;

/// Buffer depth requested from a freshly negotiated handle.
pub const FRESH_BUFFER_DEPTH: u32 = 1;

/// A live, verified transport handle.
pub struct Connection {
    pub candidate: CandidateUrl,
    pub source: Box<dyn FrameSource>,
    /// The frame read while verifying the candidate.
    pub first_frame: Frame,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("candidate", &self.candidate.redacted())
            .field("first_frame", &(self.first_frame.width, self.first_frame.height))
            .finish()
    }
}

#[derive(Clone)]
pub struct Negotiator {
    opener: Arc<dyn TransportOpener>,
}

impl Negotiator {
    pub fn new(opener: Arc<dyn TransportOpener>) -> Self {
        Self { opener }
    }

    /// Try every candidate for `endpoint` until one opens and reads.
    ///
    /// The stop signal is checked before each candidate, so a stop issued
    /// mid-negotiation costs at most one open plus one read.
    pub fn connect(
        &self,
        endpoint: &CameraEndpoint,
        stop: &StopSignal,
    ) -> Result<Connection, ConnectError> {
        let host = endpoint.identity();
        let candidates = endpoint.candidates();
        if candidates.is_empty() {
            return Err(ConnectError::NoCandidates { host });
        }

        log::info!(
            "Negotiator: connecting to camera at {} ({} candidates)",
            host,
            candidates.len()
        );
        let mut attempts = 0;
        for candidate in candidates {
            if stop.is_stopped() {
                return Err(ConnectError::Cancelled);
            }
            attempts += 1;
            log::info!("Negotiator:   trying {} {}", candidate.transport, candidate);

            let mut source = match self.opener.open(&candidate) {
                Ok(source) => source,
                Err(err) => {
                    log::debug!("Negotiator:   {} failed to open: {:#}", candidate, err);
                    continue;
                }
            };

            match source.read_frame() {
                Ok(first_frame) => {
                    source.set_buffer_depth(FRESH_BUFFER_DEPTH);
                    log::info!("Negotiator: connected via {} {}", candidate.transport, candidate);
                    return Ok(Connection {
                        candidate,
                        source,
                        first_frame,
                    });
                }
                Err(err) => {
                    log::debug!("Negotiator:   {} opened but read failed: {}", candidate, err);
                    drop(source);
                }
            }
        }

        let err = ConnectError::Unreachable { host, attempts };
        log::warn!("Negotiator: {}", err);
        Err(err)
    }
}
