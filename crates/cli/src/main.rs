use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use relay::{RelayConfig, Server, StopSignal};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

#[derive(Parser)]
#[command(
    name = "hls-relay",
    version,
    about = "Transcode a file or RTSP stream to HLS with ffmpeg and serve it over HTTP"
)]
struct Args {
    /// TOML config file; command-line options override its values
    #[arg(long, short, env = "HLS_RELAY_CONFIG")]
    config: Option<PathBuf>,

    /// Bind address (host:port) [default: 0.0.0.0:8000]
    #[arg(long, short, env = "HLS_RELAY_BIND")]
    bind: Option<SocketAddr>,

    /// Directory served over HTTP [default: public]
    #[arg(long, short, env = "HLS_RELAY_ROOT")]
    root: Option<PathBuf>,

    /// Input file or rtsp:// URL [default: public/test-video.mp4]
    #[arg(long, short, env = "HLS_RELAY_INPUT")]
    input: Option<String>,

    /// Output playlist path [default: public/streams/stream.m3u8]
    #[arg(long, short, env = "HLS_RELAY_OUTPUT")]
    output: Option<PathBuf>,

    /// Transcoder binary [default: ffmpeg]
    #[arg(long, env = "HLS_RELAY_FFMPEG")]
    ffmpeg: Option<String>,

    /// Segment duration in seconds [default: 2]
    #[arg(long, env = "HLS_RELAY_SEGMENT_DURATION")]
    segment_duration: Option<u32>,

    /// Segments kept in the playlist window [default: 3]
    #[arg(long, env = "HLS_RELAY_LIST_SIZE")]
    list_size: Option<u32>,

    /// Seconds to wait after the stop signal before killing the transcoder
    #[arg(long, env = "HLS_RELAY_STOP_TIMEOUT")]
    stop_timeout: Option<u64>,

    /// Signal sent to the transcoder on shutdown [default: interrupt]
    #[arg(long, value_enum, env = "HLS_RELAY_STOP_SIGNAL")]
    stop_signal: Option<SignalArg>,
}

#[derive(Clone, Copy, ValueEnum)]
enum SignalArg {
    Interrupt,
    Terminate,
}

impl From<SignalArg> for StopSignal {
    fn from(arg: SignalArg) -> Self {
        match arg {
            SignalArg::Interrupt => StopSignal::Interrupt,
            SignalArg::Terminate => StopSignal::Terminate,
        }
    }
}

impl Args {
    fn into_config(self) -> relay::Result<RelayConfig> {
        let mut config = match &self.config {
            Some(path) => RelayConfig::load(path)?,
            None => RelayConfig::default(),
        };

        if let Some(bind) = self.bind {
            config.http.bind = bind;
        }
        if let Some(root) = self.root {
            config.http.root = root;
        }

        let transcoder = &mut config.transcoder;
        if let Some(input) = self.input {
            transcoder.input = input;
        }
        if let Some(output) = self.output {
            transcoder.output = output;
        }
        if let Some(binary) = self.ffmpeg {
            transcoder.binary = binary;
        }
        if let Some(secs) = self.segment_duration {
            transcoder.segment_duration = secs;
        }
        if let Some(size) = self.list_size {
            transcoder.list_size = size;
        }
        if let Some(secs) = self.stop_timeout {
            transcoder.stop_timeout_secs = Some(secs);
        }
        if let Some(signal) = self.stop_signal {
            transcoder.stop_signal = signal.into();
        }

        Ok(config)
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let config = match Args::parse().into_config() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "failed to load configuration");
            return ExitCode::FAILURE;
        }
    };

    let mut server = Server::new(config);
    if let Err(e) = server.run_until(shutdown_signal()).await {
        tracing::error!(error = %e, "failed to start server");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

/// Resolves on Ctrl-C, or SIGTERM on unix.
async fn shutdown_signal() {
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = interrupt => tracing::info!("received interrupt"),
        _ = terminate => tracing::info!("received SIGTERM"),
    }
}
