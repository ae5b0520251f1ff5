//! Framing for the filespool stream.
//!
//! One byte stream carries two kinds of frames:
//!
//! ```text
//! line:    ASCII text terminated by '\n'      (commands, acks)
//! record:  len: u64 big-endian (8)
//!          data: [u8] (bincode FileRecord, exactly `len` bytes)
//! ```
//!
//! A record frame only ever follows a `SEND_FILE` line. The decoder
//! switches into record mode as soon as it yields that line, so the
//! receiver never has to peek at the stream itself.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::SpoolError;
use crate::message::{Ack, Command};
use crate::record::FileRecord;

/// Longest accepted line, newline excluded.
pub const MAX_LINE_LENGTH: usize = 4096;

/// Default upper bound for one encoded record (1 GiB).
pub const DEFAULT_MAX_RECORD_SIZE: u64 = 1 << 30;

/// Length of the record frame prefix.
pub const RECORD_PREFIX_LEN: usize = 8;

/// Most buffer space reserved at once while a record is arriving; the
/// declared length is only a claim until the bytes show up.
const RESERVE_STEP: usize = 64 * 1024;

// ── Frame ────────────────────────────────────────────────────────

/// A single unit on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A trimmed text line.
    Line(String),
    /// A file record following `SEND_FILE`.
    Record(FileRecord),
}

impl Frame {
    pub fn command(cmd: Command) -> Self {
        Frame::Line(cmd.as_str().to_string())
    }

    pub fn ack(ack: Ack) -> Self {
        Frame::Line(ack.as_str().to_string())
    }
}

// ── SpoolCodec ───────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct SpoolCodec {
    max_record_size: u64,
    expect_record: bool,
}

impl SpoolCodec {
    pub fn new() -> Self {
        Self::with_max_record_size(DEFAULT_MAX_RECORD_SIZE)
    }

    pub fn with_max_record_size(max_record_size: u64) -> Self {
        Self {
            max_record_size,
            expect_record: false,
        }
    }

    pub fn max_record_size(&self) -> u64 {
        self.max_record_size
    }

    /// Whether the next frame must be a record.
    pub fn expects_record(&self) -> bool {
        self.expect_record
    }

    fn decode_record(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, SpoolError> {
        if src.len() < RECORD_PREFIX_LEN {
            src.reserve(RECORD_PREFIX_LEN - src.len());
            return Ok(None);
        }

        let mut prefix = [0u8; RECORD_PREFIX_LEN];
        prefix.copy_from_slice(&src[..RECORD_PREFIX_LEN]);
        let len = u64::from_be_bytes(prefix);
        if len > self.max_record_size {
            return Err(SpoolError::RecordTooLarge {
                size: len,
                max: self.max_record_size,
            });
        }
        let len = usize::try_from(len).map_err(|_| SpoolError::RecordTooLarge {
            size: len,
            max: usize::MAX as u64,
        })?;

        let total = RECORD_PREFIX_LEN + len;
        if src.len() < total {
            src.reserve((total - src.len()).min(RESERVE_STEP));
            return Ok(None);
        }

        src.advance(RECORD_PREFIX_LEN);
        let payload = src.split_to(len);
        self.expect_record = false;

        let record = FileRecord::from_bytes(&payload)?;
        Ok(Some(Frame::Record(record)))
    }

    fn decode_line(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, SpoolError> {
        let Some(newline) = src.iter().position(|b| *b == b'\n') else {
            if src.len() > MAX_LINE_LENGTH {
                return Err(SpoolError::LineTooLong {
                    max: MAX_LINE_LENGTH,
                });
            }
            return Ok(None);
        };
        if newline > MAX_LINE_LENGTH {
            return Err(SpoolError::LineTooLong {
                max: MAX_LINE_LENGTH,
            });
        }

        let raw = src.split_to(newline + 1);
        let line = String::from_utf8_lossy(&raw).trim().to_string();
        if line == Command::SendFile.as_str() {
            self.expect_record = true;
        }
        Ok(Some(Frame::Line(line)))
    }
}

impl Default for SpoolCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for SpoolCodec {
    type Item = Frame;
    type Error = SpoolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if self.expect_record {
            self.decode_record(src)
        } else {
            self.decode_line(src)
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(frame) = self.decode(src)? {
            return Ok(Some(frame));
        }
        if self.expect_record && !src.is_empty() {
            return Err(SpoolError::Decode(format!(
                "stream ended mid-record ({} bytes buffered)",
                src.len()
            )));
        }
        if self.expect_record {
            return Err(SpoolError::Decode("stream ended before record".into()));
        }
        // A line without its newline is dropped with the stream.
        src.clear();
        Ok(None)
    }
}

impl Encoder<Frame> for SpoolCodec {
    type Error = SpoolError;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            Frame::Line(line) => {
                if line.len() > MAX_LINE_LENGTH || line.contains('\n') {
                    return Err(SpoolError::InvalidCommand(line));
                }
                dst.reserve(line.len() + 1);
                dst.extend_from_slice(line.as_bytes());
                dst.put_u8(b'\n');
            }
            Frame::Record(record) => {
                let payload = record.to_bytes()?;
                let size = payload.len() as u64;
                if size > self.max_record_size {
                    return Err(SpoolError::RecordTooLarge {
                        size,
                        max: self.max_record_size,
                    });
                }
                dst.reserve(RECORD_PREFIX_LEN + payload.len());
                dst.put_u64(size);
                dst.extend_from_slice(&payload);
            }
        }
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────
