//! TCP transport: one session per accepted connection.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::ReplError;
use crate::session::{Session, SessionId, SessionRegistry, SessionStreams};
use crate::Result;

/// A bound TCP listener feeding connections into a registry.
pub struct ListenerHandle {
    address: SocketAddr,
    closed: AtomicBool,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ListenerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.address
    }

    /// Stop accepting connections. Established sessions are unaffected.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let task = self.task.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(task) = task {
            task.abort();
            let _ = task.await;
        }
        info!("Listener {} closed", self.address);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Pause after a failed accept, so persistent errors such as running out of
/// file descriptors do not spin.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Bind `addr` and start accepting connections into `registry`.
///
/// Each connection becomes a session with id `listen#peer`, removed from the
/// registry again once the connection closes. The listener is registered
/// with the registry so that `close_all` stops it.
pub async fn bind(registry: &Arc<SessionRegistry>, addr: SocketAddr) -> Result<Arc<ListenerHandle>> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| ReplError::TransportBind {
            address: addr.to_string(),
            source,
        })?;
    let address = listener.local_addr()?;
    info!("REPL listening on {}", address);

    let task = tokio::spawn(accept_loop(listener, address, Arc::downgrade(registry)));
    let handle = Arc::new(ListenerHandle {
        address,
        closed: AtomicBool::new(false),
        task: Mutex::new(Some(task)),
    });
    registry.add_listener(Arc::clone(&handle));
    Ok(handle)
}

async fn accept_loop(listener: TcpListener, address: SocketAddr, registry: Weak<SessionRegistry>) {
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!("Accept on {} failed: {}", address, e);
                tokio::time::sleep(ACCEPT_BACKOFF).await;
                continue;
            }
        };
        let Some(registry) = registry.upgrade() else {
            debug!("Registry gone, listener {} stopping", address);
            return;
        };

        let _ = stream.set_nodelay(true);
        let id = SessionId::for_peer(&address, &peer);
        let (read, write) = stream.into_split();
        let streams = SessionStreams::new(read, write).with_address(address.to_string());

        match registry.use_session(Some(id.as_str()), streams).await {
            Ok(session) => {
                debug!("Accepted {} into session {}", peer, session.id());
                tokio::spawn(release_on_close(Arc::downgrade(&registry), session));
            }
            Err(e) => warn!("Failed to open session for {}: {}", peer, e),
        }
    }
}

async fn release_on_close(registry: Weak<SessionRegistry>, session: Arc<Session>) {
    session.closed().await;
    let Some(registry) = registry.upgrade() else {
        return;
    };
    if let Err(e) = registry.release(&session).await {
        warn!("{}", e);
    }
}
