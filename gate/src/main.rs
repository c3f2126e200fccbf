//! Ticket gate command-line front end.
//!
//! `scan` runs a scanner view: each stdin line is held in front of the lens
//! camera and status changes are printed. `issue` generates codes and writes
//! a package.

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use ticket_gate::issuer::{ImageService, IssuerClient, IssuingDesk};
use ticket_gate::{
    AccessGate, Config, HttpVerificationClient, LensCamera, MountPoint, ScanDeduplicator,
    ScanEnvironment, ScanSession, StatusBroadcaster, StatusChannel,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Scan and redeem one-time ticket codes
#[derive(Debug, Parser)]
#[command(name = "ticket-gate", version, about)]
struct Cli {
    /// Verification service base URL (overrides `QR_API_URL`)
    #[arg(long, global = true)]
    api_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run a scanner view fed from stdin
    ///
    /// Each line is the payload in front of the camera; an empty line takes
    /// it away. `:start`, `:stop`, `:secret VALUE` and `:quit` are commands.
    Scan {
        /// Access secret; scanning starts immediately when given
        #[arg(long)]
        secret: Option<String>,
        /// Frames decoded per second (overrides `SCANNER_FPS`)
        #[arg(long)]
        fps: Option<f64>,
        /// Camera mount point (overrides `SCANNER_MOUNT_POINT`)
        #[arg(long)]
        mount_point: Option<String>,
        /// Let a held code through again after this many milliseconds
        #[arg(long)]
        duplicate_window_ms: Option<u64>,
    },

    /// Generate codes and export them as a package
    Issue {
        /// Access secret
        #[arg(long)]
        secret: String,
        /// Number of codes to generate
        #[arg(long, default_value_t = 1)]
        count: usize,
        /// Directory the package is written under (overrides `QR_EXPORT_DIR`)
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ticket_gate=info,ticket_gate_runtime=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let mut config = Config::from_env().context("loading configuration")?;
    if let Some(url) = cli.api_url {
        config.api.url = url;
    }

    match cli.command {
        Command::Scan {
            secret,
            fps,
            mount_point,
            duplicate_window_ms,
        } => {
            if let Some(fps) = fps {
                config.scanner.fps = fps;
            }
            if let Some(mount_point) = mount_point {
                config.scanner.mount_point = MountPoint::new(mount_point);
            }
            if let Some(ms) = duplicate_window_ms {
                config.scanner.duplicate_window = Some(Duration::from_millis(ms));
            }
            config.validate()?;
            run_scan(&config, secret).await
        },
        Command::Issue { secret, count, out } => {
            if let Some(out) = out {
                config.issuer.export_dir = out;
            }
            config.validate()?;
            run_issue(&config, &secret, count).await
        },
    }
}

async fn run_scan(config: &Config, secret: Option<String>) -> anyhow::Result<()> {
    let mount_point = config.scanner.mount_point.clone();
    let camera = LensCamera::with_mount_point(mount_point.clone());
    let verifier = HttpVerificationClient::new(config.api.url.clone(), config.api.timeout)?;

    let shared = StatusChannel::new();
    let env = ScanEnvironment::new(
        Arc::new(camera.clone()),
        Arc::new(verifier),
        Arc::new(StatusBroadcaster::new(shared.clone())),
    )
    .with_mount_point(mount_point.clone())
    .with_frame_interval(config.scanner.frame_interval());

    let dedup = config
        .scanner
        .duplicate_window
        .map_or_else(ScanDeduplicator::new, ScanDeduplicator::with_window);
    let session = ScanSession::new(env, AccessGate::new(config.secret.clone()), dedup);
    let store = session.store().clone();

    let mut status_rx = shared.subscribe();
    let printer = tokio::spawn(async move {
        while status_rx.changed().await.is_ok() {
            let record = status_rx.borrow_and_update().clone();
            if let Some(record) = record {
                println!("{record}");
            }
        }
    });

    info!(
        api_url = %config.api.url,
        %mount_point,
        fps = config.scanner.fps,
        "Scanner view mounted"
    );

    if let Some(secret) = secret {
        session.submit_secret(secret).await?;
        session.start().await?;
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        match line {
            ":quit" => break,
            ":start" => drop(session.start().await?),
            ":stop" => session.stop().await?,
            "" => camera.clear(&mount_point),
            _ => {
                if let Some(secret) = line.strip_prefix(":secret ") {
                    session.submit_secret(secret.trim()).await?;
                } else {
                    camera.present(&mount_point, line);
                }
            },
        }
    }

    session.close().await;
    if let Err(error) = store.shutdown(config.api.timeout).await {
        tracing::warn!(%error, "Pending work abandoned at exit");
    }
    printer.abort();
    Ok(())
}

async fn run_issue(config: &Config, secret: &str, count: usize) -> anyhow::Result<()> {
    let client = IssuerClient::new(config.api.url.clone(), config.api.timeout)?;
    let images = ImageService::new(
        config.issuer.image_service_url.clone(),
        config.issuer.image_size,
    );
    let mut desk = IssuingDesk::new(
        AccessGate::new(config.secret.clone()),
        client,
        images,
        StatusBroadcaster::new(StatusChannel::new()),
    );

    let grant = desk.verify_secret(secret);
    println!("{}", grant.status_record());
    if !grant.is_granted() {
        bail!("access denied");
    }

    for _ in 0..count {
        let result = desk.generate().await.map(|issued| issued.code.clone());
        if let Some(status) = desk.status() {
            println!("{status}");
        }
        let code = result?;
        info!(code = %code, "Generated");
    }

    let result = desk.export(&config.issuer.export_dir).await;
    if let Some(status) = desk.status() {
        println!("{status}");
    }
    let dir = result?;
    println!("{}", dir.display());
    Ok(())
}
