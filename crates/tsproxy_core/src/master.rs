use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use hyper_util::server::graceful::GracefulShutdown;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};
use tsproxy_cache::{CacheStore, spawn_reclaimer};
use tsproxy_config::ProxyConfig;
use tsproxy_upstream::{Forward, HttpForwarder};

use crate::handler::DataApiHandler;
use crate::worker::{ConnLimits, spawn_connection};

mod accept;
mod shutdown;

use accept::{AcceptedConn, accept_with_permit, bind_listener};
pub use shutdown::shutdown_signal;

/// Pause after a failed accept so fd exhaustion does not spin the loop.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Owns the listener, the cache store and the upstream client.
pub struct Master {
    cfg: Arc<ProxyConfig>,
    cache: Option<Arc<CacheStore>>,
    handler: Arc<DataApiHandler>,
}

impl Master {
    /// Opens the cache (when enabled) and builds the upstream client.
    /// A cache that cannot be opened is fatal.
    pub fn new(cfg: ProxyConfig) -> anyhow::Result<Self> {
        let cache = if cfg.cache().enabled() {
            let store = CacheStore::open(cfg.cache().db_path(), cfg.cache().ttl())
                .with_context(|| format!("opening cache at {}", cfg.cache().db_path()))?;
            info!(
                target: "tsproxy::master",
                db_path = %cfg.cache().db_path(),
                ttl_days = cfg.cache().ttl_days(),
                "Cache store opened"
            );
            Some(Arc::new(store))
        } else {
            info!(target: "tsproxy::master", "Cache disabled, every request goes upstream");
            None
        };

        let upstream = HttpForwarder::new(cfg.upstream()).context("building upstream client")?;
        info!(target: "tsproxy::master", upstream = %upstream.url(), "Upstream configured");

        Ok(Self::with_parts(cfg, cache, Arc::new(upstream)))
    }

    pub fn with_parts(
        cfg: ProxyConfig,
        cache: Option<Arc<CacheStore>>,
        upstream: Arc<dyn Forward>,
    ) -> Self {
        let handler = Arc::new(DataApiHandler::new(
            cache.clone(),
            upstream,
            Duration::from_secs(cfg.server().read_timeout()),
        ));

        Self {
            cfg: Arc::new(cfg),
            cache,
            handler,
        }
    }

    /// Binds the configured address and serves until SIGINT/SIGTERM.
    pub async fn run(self) -> anyhow::Result<()> {
        self.run_until(shutdown_signal()).await
    }

    pub async fn run_until<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()>,
    {
        let listener = bind_listener(&self.cfg.server().listen_addr()).await?;
        self.serve(listener, shutdown).await
    }

    /// Accept loop plus the ordered teardown.
    ///
    /// On `shutdown`: stop accepting, drain in-flight connections for up to
    /// the grace period, stop the reclaimer, then close the store.
    #[instrument(skip_all, fields(
        max_connections = self.cfg.server().max_connections(),
        cache_enabled = self.cache.is_some(),
    ))]
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()>,
    {
        let server = self.cfg.server();
        let limits = ConnLimits {
            read_timeout: Duration::from_secs(server.read_timeout()),
            write_timeout: Duration::from_secs(server.write_timeout()),
        };
        let semaphore = Arc::new(Semaphore::new(server.max_connections()));
        let graceful = GracefulShutdown::new();

        let reclaim_stop = CancellationToken::new();
        let reclaimer = self.cache.as_ref().map(|store| {
            spawn_reclaimer(
                store.clone(),
                self.cfg.cache().reclaim_interval(),
                reclaim_stop.clone(),
            )
        });

        info!(
            target: "tsproxy::master",
            listen = %listener.local_addr().map(|a| a.to_string()).unwrap_or_default(),
            max_connections = server.max_connections(),
            "Proxy listening. Waiting for incoming connections (Ctrl+C to stop)..."
        );

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                biased;
                () = &mut shutdown => break,
                accepted = accept_with_permit(&listener, &semaphore) => match accepted {
                    Ok(AcceptedConn { stream, addr, permit }) => spawn_connection(
                        stream,
                        addr,
                        permit,
                        self.handler.clone(),
                        limits,
                        &graceful,
                    ),
                    Err(_) => tokio::time::sleep(ACCEPT_BACKOFF).await,
                },
            }
        }

        info!(target: "tsproxy::master", "Shutting down, no longer accepting connections");
        drop(listener);

        let grace = Duration::from_secs(server.shutdown_grace_secs());
        tokio::select! {
            () = graceful.shutdown() => {
                info!(target: "tsproxy::master", "All connections drained");
            }
            () = tokio::time::sleep(grace) => {
                warn!(
                    target: "tsproxy::master",
                    grace_secs = grace.as_secs(),
                    "Grace period elapsed with connections still open"
                );
            }
        }

        reclaim_stop.cancel();
        if let Some(handle) = reclaimer
            && let Err(e) = handle.await
        {
            error!(target: "tsproxy::master", error = ?e, "Reclamation task panicked");
        }

        if let Some(store) = &self.cache {
            store.close().await.context("closing cache store")?;
            info!(target: "tsproxy::master", "Cache store closed");
        }

        info!(target: "tsproxy::master", "Shutdown complete");
        Ok(())
    }
}
