//! whosthatd - camera capture daemon
//!
//! Loads configuration, starts the capture thread and serves the stream,
//! snapshots, status and settings over HTTP until Ctrl-C.

use anyhow::{anyhow, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use whosthat_camera::{
    api::{ApiConfig, ApiServer},
    config::AppConfig,
    Camera,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Capture a network camera and relay it over HTTP")]
struct Args {
    /// JSON or TOML configuration file.
    #[arg(long, env = "WHOSTHAT_CONFIG")]
    config: Option<PathBuf>,

    /// Listen address (overrides the configuration).
    #[arg(long)]
    addr: Option<String>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut cfg = AppConfig::load_from(args.config.as_deref())?;
    if let Some(addr) = args.addr {
        cfg.api_addr = addr;
    }
    log::info!(
        "whosthatd {} starting; camera {} ({} candidates)",
        env!("CARGO_PKG_VERSION"),
        cfg.endpoint.identity(),
        cfg.endpoint.candidates().len()
    );

    let camera = Arc::new(Camera::with_default_transports(
        cfg.endpoint.clone(),
        cfg.policy.clone(),
        cfg.transport.clone(),
    ));
    camera.start()?;

    let api_handle = ApiServer::new(
        ApiConfig {
            addr: cfg.api_addr.clone(),
        },
        camera.clone(),
    )
    .spawn()?;
    log::info!("video feed at http://{}/video_feed", api_handle.addr);

    let (tx, rx) = std::sync::mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .map_err(|e| anyhow!("error setting Ctrl-C handler: {}", e))?;

    log::info!("whosthatd waiting for shutdown signal (Ctrl-C)...");
    let _ = rx.recv();
    log::info!("shutdown signal received, stopping capture and API server...");
    camera.stop()?;
    api_handle.stop()?;

    Ok(())
}
