// =============================================================================
// OVERLAY COORDINATOR — listener.rs
// TCP accept loop: одна задача на соединение, graceful shutdown
// =============================================================================

use crate::constants::ACCEPT_BACKOFF_MS;
use crate::coordinator::Coordinator;
use crate::error::Result;
use crate::session::{CloseReason, Session};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, ToSocketAddrs};
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;

pub struct Listener {
    inner: TcpListener,
    coordinator: Arc<Coordinator>,
}

impl Listener {
    pub async fn bind<A: ToSocketAddrs>(addr: A, coordinator: Arc<Coordinator>) -> Result<Self> {
        let inner = TcpListener::bind(addr).await?;
        Ok(Listener { inner, coordinator })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.inner.local_addr()?)
    }

    /// Accepts until `shutdown` fires, then stops accepting, lets in-flight
    /// sessions finish within the grace period, cancels the stragglers and
    /// releases the port.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        let addr = self.local_addr()?;
        log::info!("🚀 Coordinator listening on {}", addr);

        let mut sessions: JoinSet<CloseReason> = JoinSet::new();
        let session_cancel = CancellationToken::new();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = self.inner.accept() => match accepted {
                    Ok((stream, peer)) => {
                        log::info!("📡 Incoming connection from {}", peer);
                        if let Err(e) = stream.set_nodelay(true) {
                            log::debug!("set_nodelay failed for {}: {}", peer, e);
                        }
                        let session = Session::new(stream, peer, Arc::clone(&self.coordinator));
                        sessions.spawn(session.run(session_cancel.clone()));
                    }
                    Err(e) => {
                        // EMFILE и подобные: не крутим accept в холостую
                        log::error!("❌ Accept error: {}", e);
                        if !pause_unless_shutdown(&shutdown, Duration::from_millis(ACCEPT_BACKOFF_MS)).await {
                            break;
                        }
                    }
                },
                Some(joined) = sessions.join_next(), if !sessions.is_empty() => reap(joined),
            }
        }

        let in_flight = sessions.len();
        log::info!("🛑 Stopped accepting on {}, {} session(s) in flight", addr, in_flight);

        let grace = self.coordinator.config().shutdown_grace;
        if !drain(&mut sessions, grace).await {
            log::warn!("⏱️ Grace period over, cancelling {} session(s)", sessions.len());
            session_cancel.cancel();
            if !drain(&mut sessions, grace).await {
                sessions.shutdown().await;
            }
        }

        drop(self.inner);
        log::info!("👋 Listener on {} released", addr);
        Ok(())
    }
}

/// Sleeps for `pause`; `false` if shutdown fired first.
async fn pause_unless_shutdown(shutdown: &CancellationToken, pause: Duration) -> bool {
    tokio::select! {
        _ = shutdown.cancelled() => false,
        _ = tokio::time::sleep(pause) => true,
    }
}

/// `true` when every session finished within `limit`.
async fn drain(sessions: &mut JoinSet<CloseReason>, limit: Duration) -> bool {
    let all = async {
        while let Some(joined) = sessions.join_next().await {
            reap(joined);
        }
    };
    tokio::time::timeout(limit, all).await.is_ok()
}

fn reap(joined: std::result::Result<CloseReason, JoinError>) {
    match joined {
        Ok(reason) => log::debug!("session finished: {}", reason),
        Err(e) if e.is_panic() => log::error!("❌ Session task panicked: {}", e),
        Err(e) => log::debug!("session task cancelled: {}", e),
    }
}
