//! camera_probe - one-shot connection diagnostic
//!
//! Runs a single negotiation against the configured camera, prints the
//! winning candidate and optionally writes the first frame as a JPEG.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use whosthat_camera::{
    config::AppConfig, encode_jpeg, DefaultOpener, Negotiator, StopSignal,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Find the stream URL a camera actually serves")]
struct Args {
    /// JSON or TOML configuration file.
    #[arg(long, env = "WHOSTHAT_CONFIG")]
    config: Option<PathBuf>,

    /// Try only this URL before the path menu.
    #[arg(long)]
    url: Option<String>,

    /// Write the first frame here as a JPEG.
    #[arg(long)]
    out: Option<PathBuf>,

    /// JPEG quality for --out (1-100).
    #[arg(long)]
    quality: Option<u8>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let cfg = AppConfig::load_from(args.config.as_deref())?;
    let endpoint = match &args.url {
        Some(url) => cfg.endpoint.clone().with_override(url.clone()),
        None => cfg.endpoint.clone(),
    };

    println!("Candidates for {}:", endpoint.identity());
    for (i, candidate) in endpoint.candidates().iter().enumerate() {
        println!("  {:>2}. [{}] {}", i + 1, candidate.transport, candidate);
    }

    let negotiator = Negotiator::new(Arc::new(DefaultOpener::new(cfg.transport.clone())));
    let connection = negotiator.connect(&endpoint, &StopSignal::new())?;
    let frame = &connection.first_frame;
    println!(
        "Connected via {} {} ({}x{})",
        connection.candidate.transport, connection.candidate, frame.width, frame.height
    );

    if let Some(path) = &args.out {
        let quality = args.quality.unwrap_or(cfg.policy.jpeg_quality);
        let jpeg = encode_jpeg(frame, quality)?;
        std::fs::write(path, &jpeg)
            .with_context(|| format!("write snapshot to {}", path.display()))?;
        println!("Wrote {} bytes to {}", jpeg.len(), path.display());
    }
    Ok(())
}
