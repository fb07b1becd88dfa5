use std::future::Future;
use std::io;
use std::net::SocketAddr;

use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::RelayConfig;
use crate::error::{RelayError, Result};
use crate::http;
use crate::supervisor::Supervisor;
use crate::transcoder::LineSink;

/// High-level relay orchestrator.
///
/// Owns the HTTP front door task and the transcoder [`Supervisor`]. The two
/// never talk to each other; they only share the output directory on disk.
pub struct Server {
    config: RelayConfig,
    supervisor: Supervisor,
    shutdown: CancellationToken,
    http_task: Option<JoinHandle<io::Result<()>>>,
    local_addr: Option<SocketAddr>,
}

impl Server {
    pub fn new(config: RelayConfig) -> Self {
        let supervisor = Supervisor::new(config.transcoder.clone());
        Self::with_supervisor(config, supervisor)
    }

    /// Create a server whose transcoder output goes to a custom sink.
    pub fn with_sink(config: RelayConfig, sink: Box<dyn LineSink>) -> Self {
        let supervisor = Supervisor::with_sink(config.transcoder.clone(), sink);
        Self::with_supervisor(config, supervisor)
    }

    fn with_supervisor(config: RelayConfig, supervisor: Supervisor) -> Self {
        Self {
            config,
            supervisor,
            shutdown: CancellationToken::new(),
            http_task: None,
            local_addr: None,
        }
    }

    /// Bind the HTTP listener, then launch the transcoder.
    ///
    /// Only a bind failure is fatal. If the transcoder cannot be launched the
    /// failure is logged and the front door keeps serving whatever is already
    /// under the root directory.
    pub async fn start(&mut self) -> Result<SocketAddr> {
        if self.http_task.is_some() {
            return Err(RelayError::AlreadyStarted);
        }

        let listener = TcpListener::bind(self.config.http.bind).await?;
        let addr = listener.local_addr()?;
        tracing::info!(%addr, root = %self.config.http.root.display(), "HTTP server listening");

        self.http_task = Some(tokio::spawn(http::serve(
            listener,
            self.config.http.root.clone(),
            self.shutdown.clone(),
        )));
        self.local_addr = Some(addr);

        if let Err(e) = self.supervisor.start() {
            tracing::warn!(error = %e, "continuing without transcoder, HLS output will not be produced");
        }

        Ok(addr)
    }

    /// Ordered shutdown: signal the transcoder, close the listener, then wait
    /// for both to finish.
    ///
    /// Without a configured stop timeout this waits for as long as the
    /// transcoder takes to exit.
    pub async fn shutdown(&mut self) {
        tracing::info!("shutting down");

        self.supervisor.stop();
        self.shutdown.cancel();

        if let Some(task) = self.http_task.take() {
            match task.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::error!(error = %e, "HTTP server failed"),
                Err(e) => tracing::error!(error = %e, "HTTP server task panicked"),
            }
        }

        self.supervisor.wait_for_exit().await;
        tracing::info!("shutdown complete");
    }

    /// Start, wait for `signal`, then shut down.
    pub async fn run_until<F>(&mut self, signal: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        self.start().await?;
        signal.await;
        self.shutdown().await;
        Ok(())
    }

    /// Address the HTTP listener is bound to, once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn is_running(&self) -> bool {
        self.http_task.as_ref().is_some_and(|task| !task.is_finished())
    }

    pub fn supervisor(&self) -> &Supervisor {
        &self.supervisor
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }
}
