//! Who's That? camera kernel
//!
//! Live video capture for a household camera appliance: negotiates a working
//! stream from a network camera that advertises its paths inconsistently,
//! keeps the newest decoded frame available to any number of readers, and
//! relays it as JPEG snapshots or an MJPEG stream.
//!
//! # Module Structure
//!
//! - `endpoint`: camera identity and the prioritized candidate URL list
//! - `ingest`: transport handles (RTSP, HTTP MJPEG/JPEG, `stub://`)
//! - `negotiate`: candidate-by-candidate connection negotiation
//! - `capture`: the `Camera` subsystem and its capture thread
//! - `frame`: `Frame` and the single-slot `FrameStore`
//! - `encode`: JPEG/base64 encoding and the no-signal placeholder
//! - `mjpeg`: multipart stream emitter
//! - `api`: HTTP relay; `config`: start-up configuration

pub mod api;
pub mod capture;
pub mod config;
pub mod encode;
pub mod endpoint;
pub mod error;
pub mod frame;
pub mod ingest;
pub mod mjpeg;
pub mod negotiate;
pub mod signal;

pub use capture::{Camera, CapturePolicy, CaptureStatus, ConnectionState};
pub use encode::{encode_jpeg, no_signal_placeholder, to_base64};
pub use endpoint::{CameraEndpoint, CandidateOrigin, CandidateUrl, Transport};
pub use error::{ConnectError, EncodeError, ReadError};
pub use frame::{Frame, FrameStore};
pub use ingest::{DefaultOpener, FrameSource, TransportOpener, TransportOptions};
pub use mjpeg::{FrameFeed, MjpegStream};
pub use negotiate::{Connection, Negotiator};
pub use signal::StopSignal;
