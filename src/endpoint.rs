//! Camera identity and the prioritized candidate URL list.
//!
//! Camera firmware advertises stream paths inconsistently across vendors, so
//! the negotiator walks a fixed menu of well-known paths. The list order is a
//! policy invariant:
//!
//! 1. the override URL, if one is configured
//! 2. every RTSP path, in list order
//! 3. every HTTP path, in list order

use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use url::Url;

pub const DEFAULT_RTSP_PORT: u16 = 554;

pub const DEFAULT_RTSP_PATHS: &[&str] = &[
    "/stream1",
    "/stream2",
    "/live",
    "/h264",
    "/cam/realmonitor",
    "/",
];

pub const DEFAULT_HTTP_PATHS: &[&str] = &[
    "/video",
    "/mjpeg",
    "/stream",
    "/cam.mjpg",
    "/snapshot.jpg",
];

const REDACTED_PASSWORD: &str = "***";

/// Camera identity and credentials.
///
/// Immutable once built. A configuration update replaces the whole value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CameraEndpoint {
    pub host: String,
    pub username: String,
    pub password: String,
    pub url_override: Option<String>,
    pub rtsp_port: u16,
    pub rtsp_paths: Vec<String>,
    pub http_paths: Vec<String>,
}

impl CameraEndpoint {
    /// Endpoint with the default port and path menus.
    pub fn new(
        host: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            username: username.into(),
            password: password.into(),
            url_override: None,
            rtsp_port: DEFAULT_RTSP_PORT,
            rtsp_paths: DEFAULT_RTSP_PATHS.iter().map(|p| p.to_string()).collect(),
            http_paths: DEFAULT_HTTP_PATHS.iter().map(|p| p.to_string()).collect(),
        }
    }

    pub fn with_override(mut self, url: impl Into<String>) -> Self {
        let url = url.into();
        self.url_override = if url.trim().is_empty() {
            None
        } else {
            Some(url.trim().to_string())
        };
        self
    }

    /// Builds the ordered candidate list.
    ///
    /// Candidates whose URL cannot be formed (for example a host that is not a
    /// valid URL host) are skipped with a warning rather than failing the whole
    /// list; an unusable override is skipped the same way.
    pub fn candidates(&self) -> Vec<CandidateUrl> {
        let mut out = Vec::with_capacity(1 + self.rtsp_paths.len() + self.http_paths.len());

        if let Some(raw) = &self.url_override {
            match CandidateUrl::from_override(raw) {
                Ok(candidate) => out.push(candidate),
                Err(err) => log::warn!("Camera: ignoring override url: {:#}", err),
            }
        }

        if self.host.trim().is_empty() {
            return out;
        }

        for path in &self.rtsp_paths {
            match self.build(Transport::Rtsp, path) {
                Ok(candidate) => out.push(candidate),
                Err(err) => log::warn!("Camera: skipping rtsp path {}: {:#}", path, err),
            }
        }
        for path in &self.http_paths {
            match self.build(Transport::Http, path) {
                Ok(candidate) => out.push(candidate),
                Err(err) => log::warn!("Camera: skipping http path {}: {:#}", path, err),
            }
        }
        out
    }

    /// Human-readable identity for diagnostics: the host, or the override's
    /// host when no host is configured.
    pub fn identity(&self) -> String {
        if !self.host.trim().is_empty() {
            return self.host.clone();
        }
        self.url_override
            .as_deref()
            .and_then(|raw| Url::parse(raw).ok())
            .and_then(|url| url.host_str().map(str::to_string))
            .unwrap_or_else(|| "<unconfigured>".to_string())
    }

    fn build(&self, transport: Transport, path: &str) -> Result<CandidateUrl> {
        let base = match transport {
            Transport::Rtsp => format!("rtsp://{}:{}", self.host, self.rtsp_port),
            Transport::Http => format!("http://{}", self.host),
            Transport::Synthetic => return Err(anyhow!("synthetic transport has no path menu")),
        };
        let mut url = Url::parse(&base).with_context(|| format!("parse {} base url", transport))?;
        if !self.username.is_empty() {
            url.set_username(&self.username)
                .map_err(|_| anyhow!("url cannot carry credentials"))?;
            url.set_password(Some(&self.password))
                .map_err(|_| anyhow!("url cannot carry credentials"))?;
        }
        url.set_path(path);
        Ok(CandidateUrl {
            transport,
            origin: CandidateOrigin::PathMenu,
            path: path.to_string(),
            url: url.to_string(),
        })
    }
}

/// Transport family of a candidate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    Rtsp,
    Http,
    /// `stub://` URLs served by the in-process synthetic source.
    Synthetic,
}

impl Transport {
    pub fn from_scheme(scheme: &str) -> Option<Self> {
        match scheme.to_ascii_lowercase().as_str() {
            "rtsp" | "rtsps" => Some(Transport::Rtsp),
            "http" | "https" => Some(Transport::Http),
            "stub" => Some(Transport::Synthetic),
            _ => None,
        }
    }
}

impl std::fmt::Display for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Transport::Rtsp => "rtsp",
            Transport::Http => "http",
            Transport::Synthetic => "stub",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CandidateOrigin {
    Override,
    PathMenu,
}

/// One fully-formed connection string the negotiator may try.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CandidateUrl {
    pub transport: Transport,
    pub origin: CandidateOrigin,
    pub path: String,
    pub url: String,
}

impl CandidateUrl {
    pub fn from_override(raw: &str) -> Result<Self> {
        let url = Url::parse(raw.trim()).context("parse override url")?;
        let transport = Transport::from_scheme(url.scheme())
            .ok_or_else(|| anyhow!("unsupported override scheme '{}'", url.scheme()))?;
        Ok(Self {
            transport,
            origin: CandidateOrigin::Override,
            path: url.path().to_string(),
            url: raw.trim().to_string(),
        })
    }

    /// The URL with any password replaced, safe for logs and status output.
    pub fn redacted(&self) -> String {
        redact_url(&self.url)
    }
}

impl std::fmt::Display for CandidateUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.redacted())
    }
}

pub fn redact_url(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(mut url) => {
            if url.password().is_some() {
                let _ = url.set_password(Some(REDACTED_PASSWORD));
            }
            url.to_string()
        }
        Err(_) => raw.to_string(),
    }
}
