//! The proxy itself: listen socket, accept loop, and shutdown coordination.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::middleware::Chain;
use crate::session::{self, SessionCtx};
use crate::tee;

/// Shuttles wire messages between clients and the upstream MongoDB server,
/// dispatching every message through the middleware chain.
pub struct Proxy {
    proxy_addr: String,
    mongo_addr: String,
    ctx: Arc<SessionCtx>,
    shutdown: broadcast::Sender<()>,
    drain_tx: Option<mpsc::Sender<()>>,
    drain_rx: mpsc::Receiver<()>,
    local_addr: Option<SocketAddr>,
}

impl Proxy {
    pub fn new(cfg: &Config, chain: Chain) -> Self {
        let (shutdown, _) = broadcast::channel(1);
        let (drain_tx, drain_rx) = mpsc::channel(1);

        Self {
            proxy_addr: cfg.proxy_addr.clone(),
            mongo_addr: cfg.mongo_addr.clone(),
            ctx: Arc::new(SessionCtx {
                mongo_addr: cfg.mongo_addr.clone(),
                client_idle_timeout: cfg.client_idle_timeout(),
                message_timeout: cfg.message_timeout(),
                chain: Arc::new(chain),
            }),
            shutdown,
            drain_tx: Some(drain_tx),
            drain_rx,
            local_addr: None,
        }
    }

    /// Bind the listen socket and spawn the accept loop.
    pub async fn start(&mut self) -> Result<()> {
        let listener = TcpListener::bind(&self.proxy_addr).await?;
        self.local_addr = Some(listener.local_addr()?);
        tracing::info!(proxy = %self, "listening");

        let drain = self
            .drain_tx
            .clone()
            .ok_or_else(|| Error::Config("proxy already stopped".to_string()))?;
        tokio::spawn(accept_loop(
            listener,
            self.ctx.clone(),
            self.shutdown.clone(),
            drain,
        ));

        Ok(())
    }

    /// The bound address; useful when the configured port was 0.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Graceful stop: end the accept loop, unblock idle sessions, and wait
    /// for every in-flight session to drain.
    pub async fn stop(self) -> Result<()> {
        self.shutdown_and_wait(false).await
    }

    /// Like `stop`, but does not wait for in-flight sessions.
    pub async fn stop_hard(self) -> Result<()> {
        self.shutdown_and_wait(true).await
    }

    async fn shutdown_and_wait(mut self, hard: bool) -> Result<()> {
        // receivers may all be gone already; that just means nothing to stop
        let _ = self.shutdown.send(());
        self.drain_tx.take();

        if !hard {
            // every sender is held by the accept loop or a session; recv
            // yields None once the last one is dropped
            while self.drain_rx.recv().await.is_some() {}
        }

        tracing::info!(proxy = %self, "stopped");
        Ok(())
    }
}

impl fmt::Display for Proxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "proxy {} => mongo {}", self.proxy_addr, self.mongo_addr)
    }
}

async fn accept_loop(
    listener: TcpListener,
    ctx: Arc<SessionCtx>,
    shutdown: broadcast::Sender<()>,
    drain: mpsc::Sender<()>,
) {
    let mut stopping = shutdown.subscribe();

    loop {
        tokio::select! {
            _ = stopping.recv() => break,
            accepted = listener.accept() => match accepted {
                Ok((socket, peer)) => {
                    tracing::info!(peer = %peer, "client connected");
                    let client = tee::maybe_wrap(format!("client {}", peer), socket);
                    let ctx = ctx.clone();
                    let session_shutdown = shutdown.subscribe();
                    let drain = drain.clone();
                    tokio::spawn(async move {
                        // holds a drain slot for the session's whole lifetime
                        let _drain = drain;
                        match session::serve_client(ctx, client, peer, session_shutdown).await {
                            Ok(()) => {}
                            Err(e) => tracing::error!(peer = %peer, error = %e, "session failed"),
                        }
                        tracing::info!(peer = %peer, "client disconnected");
                    });
                }
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                    continue;
                }
            },
        }
    }
    // dropping the listener and our drain sender lets `stop` proceed
}
