//! Receiver engine: accepts senders and persists their files.
//!
//! ```text
//!            ┌──────── accept loop (1 task) ────────┐
//!  listener ─┤ accept, bounded by the accept poll   │
//!            │ spawn one tracked task per connection│
//!            └──────────────────────────────────────┘
//!                         │
//!                         ▼
//!   Handshaking ──► Authorizing ──► CommandLoop ──► Closed
//! ```
//!
//! Shutdown closes the listener first, then waits for every live
//! session to end on its own (EOF, idle timeout or the next read
//! deadline after cancellation).

mod session;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio_rustls::TlsAcceptor;
use tokio_rustls::server::TlsStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::codec::DEFAULT_MAX_RECORD_SIZE;
use crate::error::SpoolError;
use crate::spool::SpoolSink;
use crate::state::{EnginePhase, SessionPhase};
use crate::task::SessionPool;
use crate::tls::{AllowList, PeerIdentity};

use session::Session;

// ── Timings ──────────────────────────────────────────────────────

/// Deadlines used by the receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiverTimings {
    /// Upper bound for one accept call before shutdown is re-checked.
    pub accept_poll: Duration,
    /// Upper bound for the TLS handshake.
    pub handshake_timeout: Duration,
    /// Upper bound for one read before shutdown is re-checked.
    pub read_timeout: Duration,
    /// A session without any command for this long is closed.
    pub idle_timeout: Duration,
}

impl Default for ReceiverTimings {
    fn default() -> Self {
        Self {
            accept_poll: Duration::from_secs(1),
            handshake_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(60),
        }
    }
}

// ── TlsGate ──────────────────────────────────────────────────────

/// TLS acceptor plus the allow-list every client must pass.
#[derive(Clone)]
pub struct TlsGate {
    acceptor: TlsAcceptor,
    allow: Arc<AllowList>,
}

impl TlsGate {
    pub fn new(acceptor: TlsAcceptor, allow: AllowList) -> Self {
        Self {
            acceptor,
            allow: Arc::new(allow),
        }
    }

    pub fn allow_list(&self) -> &AllowList {
        &self.allow
    }

    /// Run the handshake and the allow-list check.
    ///
    /// Returns the stream and the allow-list entry that matched.
    pub async fn admit(
        &self,
        stream: TcpStream,
        peer: SocketAddr,
        handshake_timeout: Duration,
    ) -> Result<(TlsStream<TcpStream>, String), SpoolError> {
        let tls = tokio::time::timeout(handshake_timeout, self.acceptor.accept(stream))
            .await
            .map_err(|_| SpoolError::Timeout(handshake_timeout))??;

        let (_, conn) = tls.get_ref();
        let identity = PeerIdentity::from_connection(conn)?;
        debug!(
            "[{peer}] {}: client cert names {:?}",
            SessionPhase::Authorizing,
            identity.names()
        );
        let name = self.allow.check(&identity)?.to_string();
        Ok((tls, name))
    }
}

impl std::fmt::Debug for TlsGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsGate")
            .field("allow", &self.allow)
            .finish_non_exhaustive()
    }
}

// ── Receiver ─────────────────────────────────────────────────────

/// Per-connection settings shared by all sessions.
#[derive(Clone)]
struct SessionContext {
    sink: Arc<dyn SpoolSink>,
    tls: Option<TlsGate>,
    timings: ReceiverTimings,
    max_record_size: u64,
}

pub struct Receiver {
    bind: String,
    listener: Option<TcpListener>,
    context: SessionContext,
    shutdown: CancellationToken,
    phase: watch::Sender<EnginePhase>,
}

impl Receiver {
    /// A receiver that will listen on `bind` and write into `sink`.
    pub fn new(bind: impl Into<String>, sink: Arc<dyn SpoolSink>) -> Self {
        let (phase, _) = watch::channel(EnginePhase::Idle);
        Self {
            bind: bind.into(),
            listener: None,
            context: SessionContext {
                sink,
                tls: None,
                timings: ReceiverTimings::default(),
                max_record_size: DEFAULT_MAX_RECORD_SIZE,
            },
            shutdown: CancellationToken::new(),
            phase,
        }
    }

    /// Require mutual TLS and an allow-listed client certificate.
    pub fn with_tls(mut self, acceptor: TlsAcceptor, allow: AllowList) -> Self {
        if allow.is_empty() {
            warn!("allow-list is empty; every client will be refused");
        }
        self.context.tls = Some(TlsGate::new(acceptor, allow));
        self
    }

    pub fn with_timings(mut self, timings: ReceiverTimings) -> Self {
        self.context.timings = timings;
        self
    }

    pub fn with_max_record_size(mut self, max: u64) -> Self {
        self.context.max_record_size = max;
        self
    }

    /// Bind the listen address.
    pub async fn open(&mut self) -> Result<SocketAddr, SpoolError> {
        let listener = TcpListener::bind(&self.bind).await.map_err(|e| {
            SpoolError::Connection(std::io::Error::new(
                e.kind(),
                format!("could not listen on {}: {e}", self.bind),
            ))
        })?;
        let addr = listener.local_addr()?;
        self.listener = Some(listener);
        Ok(addr)
    }

    /// Bound address, once [`open`](Self::open) succeeded.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref().and_then(|l| l.local_addr().ok())
    }

    /// Token that stops [`serve`](Self::serve) when cancelled.
    pub fn shutdown_handle(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Ask the accept loop to stop. `serve` returns once drained.
    pub fn close(&self) {
        self.shutdown.cancel();
    }

    pub fn phase(&self) -> EnginePhase {
        *self.phase.borrow()
    }

    /// Watch phase changes from another task.
    pub fn subscribe(&self) -> watch::Receiver<EnginePhase> {
        self.phase.subscribe()
    }

    /// Accept connections until shut down, then drain.
    pub async fn serve(&mut self) -> Result<(), SpoolError> {
        let listener = self
            .listener
            .take()
            .ok_or_else(|| SpoolError::Config("receiver is not open".into()))?;
        let shutdown = self.shutdown.clone();
        let accept_poll = self.context.timings.accept_poll;

        if self.context.tls.is_none() {
            warn!("serving without TLS; peers are not authenticated");
        }
        self.phase.send_replace(EnginePhase::Running);
        let mut pool = SessionPool::new(shutdown.clone());

        loop {
            let accepted = tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = tokio::time::timeout(accept_poll, listener.accept()) => accepted,
            };

            let (stream, peer) = match accepted {
                Err(_) => continue,
                Ok(Err(e)) => {
                    warn!("failed to accept connection: {e}");
                    continue;
                }
                Ok(Ok(pair)) => pair,
            };

            let context = self.context.clone();
            pool.spawn(move |id, token| handle_connection(id, stream, peer, context, token));
        }

        info!("shutting down listener");
        drop(listener);
        self.phase.send_replace(EnginePhase::Draining);
        if !pool.is_empty() {
            info!("waiting for {} session(s) to finish", pool.len());
        }
        pool.drain().await;
        self.phase.send_replace(EnginePhase::Stopped);
        info!("receiver stopped");
        Ok(())
    }
}

impl std::fmt::Debug for Receiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Receiver")
            .field("bind", &self.bind)
            .field("phase", &self.phase())
            .field("tls", &self.context.tls)
            .finish_non_exhaustive()
    }
}

async fn handle_connection(
    id: u64,
    stream: TcpStream,
    peer: SocketAddr,
    context: SessionContext,
    shutdown: CancellationToken,
) {
    let timings = context.timings;

    let mut session = match &context.tls {
        None => Session::new(id, peer, Box::new(stream), &context),
        Some(gate) => {
            debug!("[{peer}] session {id}: {}", SessionPhase::Handshaking);
            let admitted = tokio::select! {
                _ = shutdown.cancelled() => return,
                admitted = gate.admit(stream, peer, timings.handshake_timeout) => admitted,
            };
            match admitted {
                Ok((tls, name)) => {
                    info!("[{peer}] client cert accepted with name {name}");
                    Session::new(id, peer, Box::new(tls), &context)
                }
                Err(SpoolError::Unauthorized { names }) => {
                    warn!(
                        "[{peer}] client cert names {names:?} did not match allow-list {:?}",
                        gate.allow_list().names()
                    );
                    return;
                }
                Err(e) => {
                    warn!("[{peer}] TLS handshake failed: {e}");
                    return;
                }
            }
        }
    };

    session.run(shutdown).await;
}
