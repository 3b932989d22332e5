//! CLI command implementations

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Subcommand;
use tokio::io::{AsyncWrite, stdout};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use vidrelay_core::relay::WriterSink;
use vidrelay_core::selection::SelectionPolicy;
use vidrelay_core::{DownloadPipeline, ProxyForwarder, UrlValidator, VidrelayConfig};

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server
    Serve {
        /// Address to bind to
        #[arg(long)]
        host: Option<std::net::IpAddr>,
        /// Port to bind to
        #[arg(short, long)]
        port: Option<u16>,
        /// Directory served as the UI shell
        #[arg(long)]
        static_dir: Option<PathBuf>,
    },
    /// Check whether a URL is a supported video URL
    Validate {
        /// Candidate URL
        url: String,
    },
    /// Resolve a video and show its encodings and the selected one
    Resolve {
        /// Video URL
        url: String,
    },
    /// Download the selected encoding of a video
    Download {
        /// Video URL
        url: String,
        /// Output file, or `-` for stdout (default: `<video_id>.<container>`)
        #[arg(short, long)]
        output: Option<String>,
    },
    /// Ask the remote extraction API about a URL and print its JSON
    Proxy {
        /// URL forwarded to the remote API
        url: String,
    },
}

/// Handle the CLI command
///
/// # Errors
/// Returns the error of whichever stage the command ran failed
pub async fn handle_command(command: Commands, policy: Option<SelectionPolicy>) -> Result<()> {
    let mut config = VidrelayConfig::from_env().context("invalid configuration")?;
    if let Some(policy) = policy {
        config.relay.selection_policy = policy;
    }

    match command {
        Commands::Serve {
            host,
            port,
            static_dir,
        } => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            if static_dir.is_some() {
                config.server.static_dir = static_dir;
            }
            serve(config).await
        }
        Commands::Validate { url } => validate_url(&config, &url),
        Commands::Resolve { url } => resolve_video(&config, &url).await,
        Commands::Download { url, output } => download_video(&config, &url, output).await,
        Commands::Proxy { url } => proxy_url(&config, &url).await,
    }
}

/// Run the HTTP server until Ctrl-C
///
/// # Errors
/// - `ServerError` - Startup, bind or serve failure
pub async fn serve(config: VidrelayConfig) -> Result<()> {
    vidrelay_web::run_server(config).await?;
    Ok(())
}

/// Validate a URL without touching the network
///
/// # Errors
/// - `ValidationError` - URL is not a supported video URL
pub fn validate_url(config: &VidrelayConfig, url: &str) -> Result<()> {
    let validator = UrlValidator::with_extra_hosts(&config.source.extra_hosts);
    let video = validator.parse(url)?;
    println!("valid: video id {} ({:?})", video.video_id(), video.kind());
    Ok(())
}

/// Resolve a video and print its manifest as JSON
///
/// # Errors
/// - `PipelineError` - Validation or resolution failed
pub async fn resolve_video(config: &VidrelayConfig, url: &str) -> Result<()> {
    let pipeline = DownloadPipeline::from_config(config)?;
    let prepared = pipeline.prepare(url, &CancellationToken::new()).await?;

    let report = serde_json::json!({
        "manifest": &prepared.manifest,
        "selected": prepared.selected.index(),
        "content_type": prepared.content_type(),
        "policy": config.relay.selection_policy.to_string(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Download the selected encoding to a file or stdout
///
/// # Errors
/// - `PipelineError` - Any pipeline stage failed
/// - `std::io::Error` - Output file could not be created
pub async fn download_video(
    config: &VidrelayConfig,
    url: &str,
    output: Option<String>,
) -> Result<()> {
    let pipeline = DownloadPipeline::from_config(config)?;
    let cancel = CancellationToken::new();
    let prepared = pipeline.prepare(url, &cancel).await?;

    let ctrl_c_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted; stopping download");
            ctrl_c_cancel.cancel();
        }
    });

    let target = output.unwrap_or_else(|| prepared.file_name());
    let writer: Box<dyn AsyncWrite + Unpin + Send> = if target == "-" {
        Box::new(stdout())
    } else {
        let file = tokio::fs::File::create(&target)
            .await
            .with_context(|| format!("cannot create {target}"))?;
        Box::new(file)
    };

    let report = pipeline
        .relay(&prepared, WriterSink::new(writer), &cancel)
        .await?;
    info!(
        bytes = report.bytes_written,
        content_type = %report.content_type,
        output = %target,
        "Download complete"
    );
    Ok(())
}

/// Forward a URL to the remote extraction API once
///
/// # Errors
/// - `ForwardError` - Remote API failed
pub async fn proxy_url(config: &VidrelayConfig, url: &str) -> Result<()> {
    if !config.forwarder.has_credentials() {
        bail!("set VIDRELAY_PROXY_USER_ID and VIDRELAY_PROXY_SECRET_KEY first");
    }
    let forwarder = ProxyForwarder::new(config.forwarder.clone())?;
    let body = forwarder.forward(url).await?;
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}
