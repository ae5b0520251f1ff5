//! One accepted connection: the receiver's command loop.

use std::net::SocketAddr;
use std::pin::pin;
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::time::Instant;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{ReceiverTimings, SessionContext};
use crate::codec::{Frame, SpoolCodec};
use crate::error::SpoolError;
use crate::message::{Ack, Command};
use crate::network::BoxedTransport;
use crate::record::FileRecord;
use crate::spool::SpoolSink;
use crate::state::{SessionEnd, SessionPhase};

pub(crate) struct Session {
    id: u64,
    peer: SocketAddr,
    framed: Framed<BoxedTransport, SpoolCodec>,
    sink: Arc<dyn SpoolSink>,
    timings: ReceiverTimings,
}

impl Session {
    pub(crate) fn new(
        id: u64,
        peer: SocketAddr,
        transport: BoxedTransport,
        context: &SessionContext,
    ) -> Self {
        Self {
            id,
            peer,
            framed: Framed::new(
                transport,
                SpoolCodec::with_max_record_size(context.max_record_size),
            ),
            sink: Arc::clone(&context.sink),
            timings: context.timings,
        }
    }

    /// Serve commands until the peer leaves, the session idles out,
    /// an error occurs, or `shutdown` fires.
    pub(crate) async fn run(&mut self, shutdown: CancellationToken) -> SessionEnd {
        let peer = self.peer;
        info!("[{peer}] accepted new connection (session {})", self.id);
        debug!("[{peer}] session {}: {}", self.id, SessionPhase::CommandLoop);

        let end = self.command_loop(&shutdown).await;
        debug!("[{peer}] session {}: {}", self.id, SessionPhase::Closed);

        match &end {
            SessionEnd::IdleTimeout => info!(
                "[{peer}] no data received in {:?}, disconnecting",
                self.timings.idle_timeout
            ),
            SessionEnd::Failed(reason) => warn!("[{peer}] {reason}"),
            SessionEnd::Eof | SessionEnd::Shutdown => {}
        }
        info!("[{peer}] closing connection: {end}");

        let _ = tokio::time::timeout(self.timings.read_timeout, self.framed.close()).await;
        end
    }

    async fn command_loop(&mut self, shutdown: &CancellationToken) -> SessionEnd {
        let idle_timeout = self.timings.idle_timeout;
        let read_timeout = self.timings.read_timeout;
        let mut idle = pin!(tokio::time::sleep(idle_timeout));

        loop {
            let next = tokio::select! {
                _ = shutdown.cancelled() => return SessionEnd::Shutdown,
                _ = &mut idle => return SessionEnd::IdleTimeout,
                next = tokio::time::timeout(read_timeout, self.framed.next()) => next,
            };

            let frame = match next {
                // Read deadline: loop around to observe shutdown.
                Err(_) => continue,
                Ok(None) => {
                    debug!("[{}] connection EOF", self.peer);
                    return SessionEnd::Eof;
                }
                Ok(Some(Err(e))) => {
                    return SessionEnd::Failed(format!("could not read from stream: {e}"));
                }
                Ok(Some(Ok(frame))) => frame,
            };

            let line = match frame {
                Frame::Line(line) => line,
                Frame::Record(record) => {
                    return SessionEnd::Failed(format!(
                        "record {} arrived without SEND_FILE",
                        record.name()
                    ));
                }
            };

            let command = match line.parse::<Command>() {
                Ok(command) => command,
                Err(_) => {
                    warn!("[{}] unknown command: {line:?}", self.peer);
                    continue;
                }
            };

            match command {
                Command::SendFile => {
                    if let Err(e) = self.handle_send_file().await {
                        return SessionEnd::Failed(e.to_string());
                    }
                }
                Command::Noop => {}
                Command::Keepalive => debug!("[{}] keepalive", self.peer),
            }
            idle.as_mut().reset(Instant::now() + idle_timeout);
        }
    }

    /// Decode the record that follows `SEND_FILE`, persist it and ack.
    async fn handle_send_file(&mut self) -> Result<(), SpoolError> {
        let record = self.read_record().await?;
        info!(
            "[{}] received file {} ({} bytes)",
            self.peer,
            record.name(),
            record.size()
        );

        match self.sink.write(&record).await {
            Ok(()) => self.reply(Ack::Ok).await,
            Err(e) => {
                if let Err(reply_err) = self.reply(Ack::Err).await {
                    warn!("[{}] could not write ERR response: {reply_err}", self.peer);
                }
                Err(SpoolError::Other(format!(
                    "could not write file {}: {e}",
                    record.name()
                )))
            }
        }
    }

    /// Wait for the record frame. A read deadline only fails the
    /// transfer when no bytes arrived during it.
    async fn read_record(&mut self) -> Result<FileRecord, SpoolError> {
        let read_timeout = self.timings.read_timeout;
        loop {
            let buffered = self.framed.read_buffer().len();
            match tokio::time::timeout(read_timeout, self.framed.next()).await {
                Err(_) if self.framed.read_buffer().len() > buffered => continue,
                Err(_) => return Err(SpoolError::Timeout(read_timeout)),
                Ok(None) => return Err(SpoolError::Decode("stream ended before record".into())),
                Ok(Some(Err(e))) => return Err(e),
                Ok(Some(Ok(Frame::Record(record)))) => return Ok(record),
                Ok(Some(Ok(Frame::Line(line)))) => {
                    return Err(SpoolError::Decode(format!(
                        "expected record, got line {line:?}"
                    )));
                }
            }
        }
    }

    async fn reply(&mut self, ack: Ack) -> Result<(), SpoolError> {
        let read_timeout = self.timings.read_timeout;
        tokio::time::timeout(read_timeout, self.framed.send(Frame::ack(ack)))
            .await
            .map_err(|_| SpoolError::Timeout(read_timeout))?
    }
}
