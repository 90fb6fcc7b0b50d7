//! Server supervisor — listener lifecycle, session spawning, limits.
//!
//! The supervisor owns the listening socket and the set of live sessions.
//! Each accepted connection gets its own task and a semaphore permit; when
//! no permit is immediately available the connection is refused before the
//! TLS handshake starts. Graceful shutdown stops accepting, lets in-flight
//! sessions reach `Closed`, then releases the socket.

pub mod session;
pub mod tls;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::{Semaphore, broadcast};
use tokio_rustls::TlsAcceptor;
use tracing::{debug, info, warn};

use crate::authz::audit::{self, AuditEvent};
use crate::authz::{CredentialVerifier, PolicyEvaluator};
use crate::config::Config;
use crate::store::{FileStore, watcher::StoreWatcher};
use crate::{Error, Result};

pub use session::{Session, SessionContext, SessionState};

/// How long shutdown waits for in-flight sessions before giving up.
const DRAIN_GRACE: Duration = Duration::from_secs(30);

/// The authd server.
pub struct Supervisor {
    config: Config,
    store: Arc<FileStore>,
    listener: TcpListener,
    acceptor: TlsAcceptor,
    ctx: Arc<SessionContext>,
    shutdown_tx: broadcast::Sender<()>,
}

impl Supervisor {
    /// Validate config, open the store, build TLS material, and bind the
    /// listening socket. No connection is accepted until [`Supervisor::run`].
    pub async fn bind(config: Config) -> Result<Self> {
        config.validate()?;

        let store = Arc::new(FileStore::open(&config.store.path)?);
        let tls_config = Arc::new(tls::build_server_config(&config.tls)?);
        let acceptor = TlsAcceptor::from(tls_config);

        let addr = SocketAddr::new(
            config
                .server
                .host
                .parse()
                .map_err(|e| Error::Config(format!("Invalid host: {e}")))?,
            config.server.port,
        );
        let listener = TcpListener::bind(addr).await?;

        let ctx = Arc::new(SessionContext {
            verifier: CredentialVerifier::new(store.clone()),
            evaluator: PolicyEvaluator::new(store.clone()),
            limits: config.limits.clone(),
        });

        let (shutdown_tx, _) = broadcast::channel(1);

        Ok(Self {
            config,
            store,
            listener,
            acceptor,
            ctx,
            shutdown_tx,
        })
    }

    /// The bound address (useful when the configured port was 0).
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// A handle that triggers graceful shutdown when sent to.
    #[must_use]
    pub fn shutdown_handle(&self) -> broadcast::Sender<()> {
        self.shutdown_tx.clone()
    }

    /// Accept connections until shutdown, then drain in-flight sessions.
    pub async fn run(self) -> Result<()> {
        let addr = self.local_addr()?;

        info!("============================================================");
        info!("AUTHD v{}", env!("CARGO_PKG_VERSION"));
        info!("============================================================");
        info!(addr = %addr, sni = %self.config.tls.sni_hostname, "Listening");
        info!(
            max_sessions = self.config.limits.max_sessions,
            store = %self.config.store.path.display(),
            "Limits and store"
        );
        if self.config.tls.require_client_cert {
            info!("CLIENT CERTIFICATES required (mutual TLS)");
        } else {
            info!("Client certificates not required - clients authenticate with credentials");
        }
        info!("============================================================");

        // Hot-reload watcher keeps the policy snapshot current
        let _watcher = if self.config.store.watch {
            match StoreWatcher::start(self.store.clone(), self.shutdown_tx.subscribe()) {
                Ok(w) => Some(w),
                Err(e) => {
                    warn!(error = %e, "Failed to start store watcher, hot-reload disabled");
                    None
                }
            }
        } else {
            None
        };

        spawn_signal_task(self.shutdown_tx.clone());

        let limiter = Arc::new(Semaphore::new(self.config.limits.max_sessions as usize));
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            match Arc::clone(&limiter).try_acquire_owned() {
                                Ok(permit) => {
                                    let acceptor = self.acceptor.clone();
                                    let ctx = Arc::clone(&self.ctx);
                                    tokio::spawn(async move {
                                        let _permit = permit;
                                        let terminal = Session::new(peer)
                                            .run(stream, acceptor, ctx)
                                            .await;
                                        debug!(peer = %peer, state = ?terminal, "Session finished");
                                    });
                                }
                                Err(_) => {
                                    // Refused before the handshake; the peer
                                    // sees the disconnect, the server carries on
                                    let err = Error::ResourceExhausted(format!(
                                        "session limit {} reached",
                                        self.config.limits.max_sessions
                                    ));
                                    warn!(peer = %peer, "{err}");
                                    audit::emit(&AuditEvent::rejected(
                                        &peer.to_string(),
                                        err.to_string(),
                                    ));
                                    drop(stream);
                                }
                            }
                        }
                        Err(e) => {
                            warn!(error = %e, "Accept failed");
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        // Stop accepting, then wait for live sessions to reach Closed
        drop(self.listener);
        let max = self.config.limits.max_sessions;
        match tokio::time::timeout(DRAIN_GRACE, limiter.acquire_many(max)).await {
            Ok(Ok(_all_permits)) => info!("All sessions closed"),
            Ok(Err(_)) => {}
            Err(_) => warn!(
                grace = ?DRAIN_GRACE,
                "Drain grace elapsed with sessions still open"
            ),
        }

        Ok(())
    }
}

/// Forward SIGINT/SIGTERM into the shutdown channel.
fn spawn_signal_task(shutdown_tx: broadcast::Sender<()>) {
    tokio::spawn(async move {
        let ctrl_c = async {
            signal::ctrl_c()
                .await
                .expect("Failed to install Ctrl+C handler");
        };

        #[cfg(unix)]
        let terminate = async {
            signal::unix::signal(signal::unix::SignalKind::terminate())
                .expect("Failed to install SIGTERM handler")
                .recv()
                .await;
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            () = ctrl_c => {},
            () = terminate => {},
        }

        let _ = shutdown_tx.send(());
    });
}
