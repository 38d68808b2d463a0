use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::capture::CapturePolicy;
use crate::endpoint::{CameraEndpoint, DEFAULT_RTSP_PORT};
use crate::ingest::TransportOptions;

const DEFAULT_CAMERA_IP: &str = "192.168.68.55";
const DEFAULT_CAMERA_USER: &str = "FeederGuard";
const DEFAULT_API_ADDR: &str = "0.0.0.0:5000";

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct AppConfigFile {
    camera: Option<CameraConfigFile>,
    capture: Option<CaptureConfigFile>,
    api: Option<ApiConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct CameraConfigFile {
    ip: Option<String>,
    user: Option<String>,
    password: Option<String>,
    url_override: Option<String>,
    rtsp_port: Option<u16>,
    rtsp_paths: Option<Vec<String>>,
    http_paths: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct CaptureConfigFile {
    reconnect_interval_ms: Option<u64>,
    read_retry_delay_ms: Option<u64>,
    frame_interval_ms: Option<u64>,
    read_timeout_ms: Option<u64>,
    jpeg_quality: Option<u8>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ApiConfigFile {
    addr: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub api_addr: String,
    pub endpoint: CameraEndpoint,
    pub policy: CapturePolicy,
    pub transport: TransportOptions,
}

impl AppConfig {
    /// Load from the file named by `WHOSTHAT_CONFIG` (if any), then apply
    /// environment overrides and validate.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("WHOSTHAT_CONFIG")
            .ok()
            .filter(|path| !path.trim().is_empty());
        Self::load_from(config_path.as_deref().map(Path::new))
    }

    /// Like [`AppConfig::load`] but with an explicit file, as given by
    /// `--config`.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => read_config_file(path)?,
            None => AppConfigFile::default(),
        };
        let mut cfg = Self::from_file(file_cfg);
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: AppConfigFile) -> Self {
        let camera = file.camera.unwrap_or_default();
        let capture = file.capture.unwrap_or_default();

        let mut endpoint = CameraEndpoint::new(
            camera.ip.unwrap_or_else(|| DEFAULT_CAMERA_IP.to_string()),
            camera.user.unwrap_or_else(|| DEFAULT_CAMERA_USER.to_string()),
            camera.password.unwrap_or_default(),
        )
        .with_override(camera.url_override.unwrap_or_default());
        endpoint.rtsp_port = camera.rtsp_port.unwrap_or(DEFAULT_RTSP_PORT);
        if let Some(paths) = camera.rtsp_paths {
            endpoint.rtsp_paths = paths;
        }
        if let Some(paths) = camera.http_paths {
            endpoint.http_paths = paths;
        }

        let defaults = CapturePolicy::default();
        let policy = CapturePolicy {
            reconnect_interval: capture
                .reconnect_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.reconnect_interval),
            read_retry_delay: capture
                .read_retry_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.read_retry_delay),
            frame_interval: capture
                .frame_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.frame_interval),
            jpeg_quality: capture.jpeg_quality.unwrap_or(defaults.jpeg_quality),
        };
        let mut transport = TransportOptions::default();
        if let Some(ms) = capture.read_timeout_ms {
            transport.read_timeout = Duration::from_millis(ms);
        }

        Self {
            api_addr: file
                .api
                .and_then(|api| api.addr)
                .unwrap_or_else(|| DEFAULT_API_ADDR.to_string()),
            endpoint,
            policy,
            transport,
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(ip) = env_value("CAMERA_IP") {
            self.endpoint.host = ip;
        }
        if let Some(user) = env_value("CAMERA_USER") {
            self.endpoint.username = user;
        }
        if let Some(password) = env_value("CAMERA_PASSWORD") {
            self.endpoint.password = password;
        }
        if let Some(url) = env_value("CAMERA_URL_OVERRIDE") {
            self.endpoint.url_override = Some(url);
        }
        if let Some(addr) = env_value("WHOSTHAT_ADDR") {
            self.api_addr = addr;
        }
        if let Some(quality) = env_value("WHOSTHAT_JPEG_QUALITY") {
            self.policy.jpeg_quality = quality
                .parse()
                .map_err(|_| anyhow!("WHOSTHAT_JPEG_QUALITY must be an integer from 1 to 100"))?;
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        self.endpoint.host = self.endpoint.host.trim().to_string();
        check_host(&self.endpoint)?;
        if !(1..=100).contains(&self.policy.jpeg_quality) {
            return Err(anyhow!(
                "jpeg quality must be between 1 and 100, got {}",
                self.policy.jpeg_quality
            ));
        }
        if self.policy.frame_interval.is_zero() {
            return Err(anyhow!("frame interval must be greater than zero"));
        }
        if self.policy.reconnect_interval.is_zero() {
            return Err(anyhow!("reconnect interval must be greater than zero"));
        }
        if self.transport.read_timeout.is_zero() {
            return Err(anyhow!("read timeout must be greater than zero"));
        }
        if self.endpoint.candidates().is_empty() {
            return Err(anyhow!("camera configuration yields no candidate urls"));
        }
        Ok(())
    }
}

/// Body of a settings update. Absent fields keep their current value; an
/// empty `camera_url_override` clears the override.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SettingsUpdate {
    pub camera_url_override: Option<String>,
    pub camera_ip: Option<String>,
    pub camera_user: Option<String>,
    pub camera_password: Option<String>,
}

impl SettingsUpdate {
    /// Build the replacement endpoint from `current`.
    pub fn apply(&self, current: &CameraEndpoint) -> Result<CameraEndpoint> {
        let mut next = current.clone();
        if let Some(ip) = &self.camera_ip {
            next.host = ip.trim().to_string();
        }
        if let Some(user) = &self.camera_user {
            next.username = user.clone();
        }
        if let Some(password) = &self.camera_password {
            next.password = password.clone();
        }
        if let Some(url) = &self.camera_url_override {
            next = next.with_override(url.clone());
        }
        check_host(&next)?;
        if next.candidates().is_empty() {
            return Err(anyhow!("settings yield no usable candidate urls"));
        }
        Ok(next)
    }
}

/// Public view of the camera settings. The password is never included.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct SettingsView {
    pub camera_ip: String,
    pub camera_user: String,
    pub camera_url_override: String,
    pub password_set: bool,
}

impl From<&CameraEndpoint> for SettingsView {
    fn from(endpoint: &CameraEndpoint) -> Self {
        Self {
            camera_ip: endpoint.host.clone(),
            camera_user: endpoint.username.clone(),
            camera_url_override: endpoint
                .url_override
                .as_deref()
                .map(crate::endpoint::redact_url)
                .unwrap_or_default(),
            password_set: !endpoint.password.is_empty(),
        }
    }
}

/// The host is spliced into every candidate url, so it must be a bare name
/// or address. RTSP candidates need a port-free host to take `rtsp_port`.
fn check_host(endpoint: &CameraEndpoint) -> Result<()> {
    let host = endpoint.host.as_str();
    if host.is_empty() {
        if endpoint.url_override.is_none() {
            return Err(anyhow!("camera ip must be set unless a url override is configured"));
        }
        return Ok(());
    }
    if host.contains([':', '/', '@']) || host.contains(char::is_whitespace) {
        return Err(anyhow!(
            "camera ip '{}' must be a bare host without port or path; \
             set rtsp_port or use a url override instead",
            host
        ));
    }
    Ok(())
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn read_config_file(path: &Path) -> Result<AppConfigFile> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}
