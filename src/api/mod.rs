//! Minimal HTTP/1.1 relay for the camera.
//!
//! One accept thread polls a non-blocking listener and hands every connection
//! to its own thread, so a long-lived `/video_feed` response never blocks
//! snapshot or status callers. Every response closes the connection.

use anyhow::{anyhow, Context, Result};
use serde_json::json;
use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::capture::Camera;
use crate::config::{SettingsUpdate, SettingsView};
use crate::mjpeg;

const MAX_HEADER_BYTES: usize = 8 * 1024;
const MAX_BODY_BYTES: usize = 64 * 1024;
const READ_TIMEOUT: Duration = Duration::from_secs(2);
const ACCEPT_POLL: Duration = Duration::from_millis(50);

#[derive(Clone, Debug)]
pub struct ApiConfig {
    pub addr: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            addr: "0.0.0.0:5000".to_string(),
        }
    }
}

#[derive(Debug)]
pub struct ApiHandle {
    pub addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl ApiHandle {
    /// Stop accepting and end open streams on their next part.
    pub fn stop(mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("api server thread panicked"))?;
        }
        Ok(())
    }
}

pub struct ApiServer {
    cfg: ApiConfig,
    camera: Arc<Camera>,
}

impl ApiServer {
    pub fn new(cfg: ApiConfig, camera: Arc<Camera>) -> Self {
        Self { cfg, camera }
    }

    pub fn spawn(self) -> Result<ApiHandle> {
        let configured_addr: SocketAddr = self
            .cfg
            .addr
            .parse()
            .with_context(|| format!("invalid api address '{}'", self.cfg.addr))?;
        let listener = TcpListener::bind(configured_addr)
            .with_context(|| format!("bind api listener on {}", configured_addr))?;
        let addr = listener.local_addr()?;
        listener.set_nonblocking(true)?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_thread = shutdown.clone();
        let camera = self.camera;
        let join = std::thread::Builder::new()
            .name("camera-api".into())
            .spawn(move || {
                run_api(listener, camera, shutdown_thread);
                log::info!("camera api stopped");
            })
            .context("spawn api thread")?;
        log::info!("camera api listening on http://{}", addr);

        Ok(ApiHandle {
            addr,
            shutdown,
            join: Some(join),
        })
    }
}

/// Accept until the shutdown flag is raised. Accept errors never end the loop.
fn run_api<L: Accept>(listener: L, camera: Arc<Camera>, shutdown: Arc<AtomicBool>) {
    while !shutdown.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, peer)) => {
                let camera = camera.clone();
                let shutdown = shutdown.clone();
                let spawned = std::thread::Builder::new()
                    .name("camera-api-conn".into())
                    .spawn(move || {
                        if let Err(err) = handle_connection(stream, &camera, &shutdown) {
                            log::warn!("camera api request from {} rejected: {:#}", peer, err);
                        }
                    });
                if let Err(err) = spawned {
                    log::warn!("camera api could not spawn connection thread: {}", err);
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(ACCEPT_POLL);
            }
            Err(err) => {
                // aborted handshakes and fd exhaustion are transient
                log::warn!("camera api accept failed: {}", err);
                std::thread::sleep(ACCEPT_POLL);
            }
        }
    }
}

/// Listener seam for the accept loop.
trait Accept: Send {
    fn accept(&self) -> std::io::Result<(TcpStream, SocketAddr)>;
}

impl Accept for TcpListener {
    fn accept(&self) -> std::io::Result<(TcpStream, SocketAddr)> {
        TcpListener::accept(self)
    }
}

fn handle_connection(
    mut stream: TcpStream,
    camera: &Camera,
    shutdown: &AtomicBool,
) -> Result<()> {
    // accepted sockets inherit non-blocking mode on some platforms
    stream.set_nonblocking(false)?;

    let request = match read_request(&mut stream) {
        Ok(request) => request,
        Err(RequestError::TooLarge) => {
            write_json_response(&mut stream, 413, &json!({"error": "request_too_large"}))?;
            return Ok(());
        }
        Err(RequestError::Malformed(err)) => {
            write_json_response(&mut stream, 400, &json!({"error": "bad_request"}))?;
            return Err(err);
        }
    };

    match (request.method.as_str(), request.path.as_str()) {
        ("GET", "/health") => write_json_response(&mut stream, 200, &json!({"status": "ok"})),
        ("GET", "/status") => {
            write_json_response(&mut stream, 200, &serde_json::to_value(camera.status())?)
        }
        ("GET", "/snapshot") => serve_snapshot(&mut stream, camera, &request),
        ("GET", "/video_feed") => serve_video_feed(&mut stream, camera, shutdown),
        ("GET", "/settings") => {
            let view = SettingsView::from(&camera.endpoint());
            write_json_response(&mut stream, 200, &serde_json::to_value(view)?)
        }
        ("POST", "/settings") => update_settings(&mut stream, camera, &request),
        (_, "/health" | "/status" | "/snapshot" | "/video_feed" | "/settings") => {
            write_json_response(&mut stream, 405, &json!({"error": "method_not_allowed"}))
        }
        _ => write_json_response(&mut stream, 404, &json!({"error": "not_found"})),
    }
}

fn serve_snapshot(stream: &mut TcpStream, camera: &Camera, request: &HttpRequest) -> Result<()> {
    let quality = camera.policy().jpeg_quality;
    let Some(jpeg) = camera.snapshot_jpeg(quality) else {
        return write_json_response(
            stream,
            503,
            &json!({"error": "No camera frame available"}),
        );
    };
    if request.query_param("format") == Some("base64") {
        let body = json!({"image": crate::encode::to_base64(&jpeg)});
        return write_json_response(stream, 200, &body);
    }
    write_response(stream, 200, "image/jpeg", &jpeg)
}

fn serve_video_feed(stream: &mut TcpStream, camera: &Camera, shutdown: &AtomicBool) -> Result<()> {
    let header = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: {}\r\nCache-Control: no-store\r\nConnection: close\r\n\r\n",
        mjpeg::CONTENT_TYPE
    );
    stream.write_all(header.as_bytes())?;

    let mut parts = 0u64;
    for chunk in camera.mjpeg_stream() {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        if let Err(err) = stream.write_all(&chunk).and_then(|_| stream.flush()) {
            log::debug!("camera api: video feed client left after {} parts: {}", parts, err);
            return Ok(());
        }
        parts += 1;
    }
    log::debug!("camera api: video feed ended after {} parts", parts);
    Ok(())
}

fn update_settings(stream: &mut TcpStream, camera: &Camera, request: &HttpRequest) -> Result<()> {
    let update: SettingsUpdate = match serde_json::from_slice(&request.body) {
        Ok(update) => update,
        Err(err) => {
            let body = json!({"error": format!("invalid settings: {}", err)});
            return write_json_response(stream, 400, &body);
        }
    };
    let next = match update.apply(&camera.endpoint()) {
        Ok(next) => next,
        Err(err) => {
            let body = json!({"error": format!("{:#}", err)});
            return write_json_response(stream, 400, &body);
        }
    };
    let view = SettingsView::from(&next);
    camera.update_endpoint(next);
    write_json_response(stream, 200, &serde_json::to_value(view)?)
}

enum RequestError {
    TooLarge,
    Malformed(anyhow::Error),
}

impl From<anyhow::Error> for RequestError {
    fn from(err: anyhow::Error) -> Self {
        RequestError::Malformed(err)
    }
}

impl From<std::io::Error> for RequestError {
    fn from(err: std::io::Error) -> Self {
        RequestError::Malformed(err.into())
    }
}

fn read_request(stream: &mut TcpStream) -> Result<HttpRequest, RequestError> {
    stream.set_read_timeout(Some(READ_TIMEOUT))?;
    let mut buf = [0u8; 1024];
    let mut data = Vec::new();
    let header_end = loop {
        let n = stream.read(&mut buf)?;
        if n == 0 {
            return Err(anyhow!("connection closed before request headers ended").into());
        }
        data.extend_from_slice(&buf[..n]);
        if let Some(pos) = data.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos;
        }
        if data.len() > MAX_HEADER_BYTES {
            return Err(RequestError::TooLarge);
        }
    };
    if header_end > MAX_HEADER_BYTES {
        return Err(RequestError::TooLarge);
    }

    let text = String::from_utf8_lossy(&data[..header_end]);
    let mut lines = text.split("\r\n");
    let request_line = lines.next().ok_or_else(|| anyhow!("empty request"))?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next().ok_or_else(|| anyhow!("missing method"))?;
    let raw_path = parts.next().ok_or_else(|| anyhow!("missing path"))?;
    let mut headers = HashMap::new();
    for line in lines {
        if let Some((k, v)) = line.split_once(':') {
            headers.insert(k.trim().to_lowercase(), v.trim().to_string());
        }
    }

    let content_length = match headers.get("content-length") {
        Some(value) => value
            .parse::<usize>()
            .map_err(|_| anyhow!("invalid content-length '{}'", value))?,
        None => 0,
    };
    if content_length > MAX_BODY_BYTES {
        return Err(RequestError::TooLarge);
    }
    let mut body = data[header_end + 4..].to_vec();
    while body.len() < content_length {
        let n = stream.read(&mut buf)?;
        if n == 0 {
            return Err(anyhow!("connection closed before request body ended").into());
        }
        body.extend_from_slice(&buf[..n]);
    }
    body.truncate(content_length);

    let (path, query) = match raw_path.split_once('?') {
        Some((path, query)) => (path, query),
        None => (raw_path, ""),
    };
    Ok(HttpRequest {
        method: method.to_string(),
        path: path.to_string(),
        query: query.to_string(),
        body,
    })
}

fn write_json_response(
    stream: &mut TcpStream,
    status: u16,
    body: &serde_json::Value,
) -> Result<()> {
    let payload = serde_json::to_vec(body)?;
    write_response(stream, status, "application/json", &payload)
}

fn write_response(
    stream: &mut TcpStream,
    status: u16,
    content_type: &str,
    body: &[u8],
) -> Result<()> {
    let status_line = match status {
        200 => "HTTP/1.1 200 OK",
        400 => "HTTP/1.1 400 Bad Request",
        404 => "HTTP/1.1 404 Not Found",
        405 => "HTTP/1.1 405 Method Not Allowed",
        413 => "HTTP/1.1 413 Payload Too Large",
        503 => "HTTP/1.1 503 Service Unavailable",
        _ => "HTTP/1.1 500 Internal Server Error",
    };
    let header = format!(
        "{status_line}\r\nContent-Type: {content_type}\r\nContent-Length: {len}\r\nCache-Control: no-store\r\nConnection: close\r\n\r\n",
        status_line = status_line,
        content_type = content_type,
        len = body.len()
    );
    stream.write_all(header.as_bytes())?;
    stream.write_all(body)?;
    stream.flush()?;
    Ok(())
}

#[derive(Debug)]
struct HttpRequest {
    method: String,
    path: String,
    query: String,
    body: Vec<u8>,
}

impl HttpRequest {
    fn query_param(&self, name: &str) -> Option<&str> {
        self.query
            .split('&')
            .filter_map(|pair| pair.split_once('='))
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v)
    }
}
