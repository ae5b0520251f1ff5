//! Sender engine: pushes spooled files to a receiver over one
//! long-lived connection.
//!
//! ```text
//!  ┌─────────────── run loop ───────────────┐
//!  │ no session?   ──► reconnect, then sync │
//!  │ keepalive tick ─► KEEPALIVE            │
//!  │ file check tick ► scan + send each file│
//!  │ any failure   ──► reconnect            │
//!  └────────────────────────────────────────┘
//! ```
//!
//! A file is deleted from the source only after the receiver answers
//! `OK` for it.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use rustls::pki_types::ServerName;
use tokio::net::TcpStream;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_rustls::TlsConnector;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::codec::{DEFAULT_MAX_RECORD_SIZE, Frame, SpoolCodec};
use crate::error::SpoolError;
use crate::message::{Ack, Command};
use crate::network::{BoxedTransport, server_name_from_addr};
use crate::record::FileRecord;
use crate::spool::SpoolSource;
use crate::state::ConnectionPhase;

/// Deadlines and periods used by the sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SenderTimings {
    /// Upper bound for the TCP dial.
    pub connect_timeout: Duration,
    /// Upper bound for the TLS handshake.
    pub handshake_timeout: Duration,
    /// Upper bound for each write, flush and ack read.
    pub data_timeout: Duration,
    /// Period between `KEEPALIVE` commands.
    pub keepalive_interval: Duration,
    /// Period between scans of the source.
    pub file_check_interval: Duration,
}

impl Default for SenderTimings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            handshake_timeout: Duration::from_secs(5),
            data_timeout: Duration::from_secs(5),
            keepalive_interval: Duration::from_secs(10),
            file_check_interval: Duration::from_secs(5),
        }
    }
}

pub struct Sender {
    addr: String,
    source: Arc<dyn SpoolSource>,
    tls: Option<TlsConnector>,
    timings: SenderTimings,
    max_record_size: u64,
    session: Option<Framed<BoxedTransport, SpoolCodec>>,
    phase: ConnectionPhase,
    shutdown: CancellationToken,
}

impl Sender {
    /// A sender that will deliver files from `source` to `addr`.
    pub fn new(addr: impl Into<String>, source: Arc<dyn SpoolSource>) -> Self {
        Self {
            addr: addr.into(),
            source,
            tls: None,
            timings: SenderTimings::default(),
            max_record_size: DEFAULT_MAX_RECORD_SIZE,
            session: None,
            phase: ConnectionPhase::Disconnected,
            shutdown: CancellationToken::new(),
        }
    }

    /// Connect over TLS, presenting the connector's client certificate.
    pub fn with_tls(mut self, connector: TlsConnector) -> Self {
        self.tls = Some(connector);
        self
    }

    pub fn with_timings(mut self, timings: SenderTimings) -> Self {
        self.timings = timings;
        self
    }

    pub fn with_max_record_size(mut self, max: u64) -> Self {
        self.max_record_size = max;
        self
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub fn phase(&self) -> &ConnectionPhase {
        &self.phase
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_some() && self.phase.is_connected()
    }

    /// Token that stops [`run`](Self::run) when cancelled.
    pub fn stop_handle(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Ask the run loop to return at its next check.
    pub fn stop(&self) {
        self.shutdown.cancel();
    }

    // ── Connection ───────────────────────────────────────────────

    /// Dial the receiver and, when configured, complete the TLS
    /// handshake.
    pub async fn open(&mut self) -> Result<(), SpoolError> {
        if self.session.is_some() {
            return Ok(());
        }
        self.phase.begin_dial()?;
        match self.dial().await {
            Ok(transport) => {
                self.session = Some(Framed::new(
                    transport,
                    SpoolCodec::with_max_record_size(self.max_record_size),
                ));
                self.phase.established()?;
                info!("connected to {}", self.addr);
                Ok(())
            }
            Err(e) => {
                self.phase.reset();
                Err(e)
            }
        }
    }

    async fn dial(&mut self) -> Result<BoxedTransport, SpoolError> {
        let connect_timeout = self.timings.connect_timeout;
        let stream = tokio::time::timeout(connect_timeout, TcpStream::connect(&self.addr))
            .await
            .map_err(|_| SpoolError::Timeout(connect_timeout))??;
        stream.set_nodelay(true)?;

        let Some(connector) = &self.tls else {
            return Ok(Box::new(stream));
        };

        self.phase.begin_handshake()?;
        let server_name = ServerName::try_from(server_name_from_addr(&self.addr).to_string())
            .map_err(|e| SpoolError::Config(format!("invalid server name in {}: {e}", self.addr)))?;
        let handshake_timeout = self.timings.handshake_timeout;
        let tls = tokio::time::timeout(handshake_timeout, connector.connect(server_name, stream))
            .await
            .map_err(|_| SpoolError::Timeout(handshake_timeout))??;
        Ok(Box::new(tls))
    }

    /// Drop the current connection, if any.
    pub async fn close(&mut self) {
        let Some(mut framed) = self.session.take() else {
            self.phase.reset();
            return;
        };
        let uptime = self.phase.uptime().unwrap_or_default();
        if self.phase.begin_close().is_err() {
            self.phase.reset();
        }
        let _ = tokio::time::timeout(self.timings.data_timeout, framed.close()).await;
        drop(framed);
        if self.phase.closed().is_err() {
            self.phase.reset();
        }
        debug!("disconnected from {} after {uptime:?}", self.addr);
    }

    /// Tear down and dial again. Returns whether a session is up.
    pub async fn reconnect(&mut self) -> bool {
        self.close().await;
        match self.open().await {
            Ok(()) => true,
            Err(e) => {
                warn!("error connecting to server {}: {e}", self.addr);
                false
            }
        }
    }

    // ── Transfers ────────────────────────────────────────────────

    /// Send every pending file, deleting each one the receiver acked.
    ///
    /// Stops at the first failure; files not yet sent stay in the
    /// source for the next scan.
    pub async fn send_files(&mut self) -> Result<usize, SpoolError> {
        let records = self.source.scan().await?;
        let mut sent = 0;
        for record in records {
            if self.shutdown.is_cancelled() {
                break;
            }
            self.send_file(&record).await?;
            sent += 1;
        }
        Ok(sent)
    }

    /// Deliver one record and wait for its ack.
    pub async fn send_file(&mut self, record: &FileRecord) -> Result<(), SpoolError> {
        let data_timeout = self.timings.data_timeout;
        let framed = self.session.as_mut().ok_or(SpoolError::NotConnected)?;

        bounded(data_timeout, framed.feed(Frame::command(Command::SendFile))).await?;
        bounded(data_timeout, framed.feed(Frame::Record(record.clone()))).await?;
        bounded(data_timeout, framed.flush()).await?;

        let reply = tokio::time::timeout(data_timeout, framed.next())
            .await
            .map_err(|_| SpoolError::Timeout(data_timeout))?;
        let line = match reply {
            None => return Err(SpoolError::ChannelClosed),
            Some(Err(e)) => return Err(e),
            Some(Ok(Frame::Line(line))) => line,
            Some(Ok(Frame::Record(_))) => {
                return Err(SpoolError::UnexpectedAck("record".into()));
            }
        };

        match line.parse::<Ack>()? {
            Ack::Ok => {
                info!("sent file {} ({} bytes)", record.name(), record.size());
                self.source.delete(record.name()).await
            }
            Ack::Err => Err(SpoolError::UnexpectedAck(format!(
                "{} for file {}",
                Ack::Err,
                record.name()
            ))),
        }
    }

    pub async fn send_keepalive(&mut self) -> Result<(), SpoolError> {
        let data_timeout = self.timings.data_timeout;
        let framed = self.session.as_mut().ok_or(SpoolError::NotConnected)?;
        bounded(data_timeout, framed.send(Frame::command(Command::Keepalive))).await
    }

    /// Send pending files; on failure, log and reconnect.
    async fn sync(&mut self) {
        match self.send_files().await {
            Ok(0) => {}
            Ok(n) => debug!("sent {n} file(s)"),
            Err(e) => {
                warn!("error sending files: {e}");
                self.reconnect().await;
            }
        }
    }

    // ── Run loop ─────────────────────────────────────────────────

    /// One keepalive tick. Returns whether a keepalive went out; with
    /// no session nothing is sent and nothing is dialed.
    async fn keepalive_tick(&mut self) -> bool {
        if self.session.is_none() {
            return false;
        }
        match self.send_keepalive().await {
            Ok(()) => true,
            Err(e) => {
                warn!("error sending keepalive: {e}");
                self.reconnect().await;
                false
            }
        }
    }

    /// One file-check tick; a no-op while disconnected.
    async fn file_check_tick(&mut self) {
        if self.session.is_some() {
            self.sync().await;
        }
    }

    /// Run until [`stop`](Self::stop) is called, then disconnect.
    pub async fn run(&mut self) {
        let shutdown = self.shutdown.clone();
        let now = Instant::now();
        let mut keepalive = tokio::time::interval_at(
            now + self.timings.keepalive_interval,
            self.timings.keepalive_interval,
        );
        keepalive.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut file_check = tokio::time::interval_at(
            now + self.timings.file_check_interval,
            self.timings.file_check_interval,
        );
        file_check.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!("sending files to {}", self.addr);
        loop {
            if shutdown.is_cancelled() {
                break;
            }
            if self.session.is_none() && self.reconnect().await {
                self.sync().await;
            }

            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = keepalive.tick() => {
                    self.keepalive_tick().await;
                }
                _ = file_check.tick() => self.file_check_tick().await,
            }
        }

        self.close().await;
        info!("sender stopped");
    }
}

impl std::fmt::Debug for Sender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sender")
            .field("addr", &self.addr)
            .field("phase", &self.phase)
            .field("tls", &self.tls.is_some())
            .field("timings", &self.timings)
            .finish_non_exhaustive()
    }
}

async fn bounded<F>(limit: Duration, fut: F) -> Result<(), SpoolError>
where
    F: std::future::Future<Output = Result<(), SpoolError>>,
{
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| SpoolError::Timeout(limit))?
}
