//! NDJSON line framing for the worker's byte streams.
//!
//! Wraps [`tokio_util::codec::LinesCodec`] with a fixed maximum line length
//! so an unterminated or maliciously large line from a misbehaving worker
//! cannot exhaust memory. A chunk ending mid-line is buffered until the
//! terminating `\n` (or EOF) arrives; emitted lines are never reprocessed.
//!
//! Oversized lines are a recoverable condition: the decoder logs the
//! violation, discards bytes up to the next `\n`, and keeps framing the
//! rest of the stream. The framed stream therefore never errors for a
//! too-long line — only genuine I/O failures surface as errors.
//!
//! Use [`LineCodec`] as the codec parameter for
//! [`tokio_util::codec::FramedRead`] (worker stdout) and
//! [`tokio_util::codec::FramedWrite`] (worker stdin).

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder, LinesCodec, LinesCodecError};
use tracing::warn;

use crate::{ClientError, Result};

/// Maximum accepted line length: 1 MiB.
pub const MAX_LINE_BYTES: usize = 1_048_576;

/// Newline-delimited UTF-8 framing with a [`MAX_LINE_BYTES`] limit.
#[derive(Debug)]
pub struct LineCodec(LinesCodec);

impl LineCodec {
    /// Create a codec with the default [`MAX_LINE_BYTES`] limit.
    #[must_use]
    pub fn new() -> Self {
        Self(LinesCodec::new_with_max_length(MAX_LINE_BYTES))
    }
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for LineCodec {
    type Item = String;
    type Error = ClientError;

    /// Extract the next complete line from `src`, or `Ok(None)` while the
    /// buffer holds only a partial line.
    ///
    /// A line exceeding [`MAX_LINE_BYTES`] is logged and discarded up to
    /// its terminating `\n`; decoding then continues with the following
    /// line. Returning `Err` would fuse the framed stream, so only I/O
    /// failures do.
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        loop {
            match self.0.decode(src) {
                Ok(item) => return Ok(item),
                Err(LinesCodecError::MaxLineLengthExceeded) => {
                    // LinesCodec is now in discard mode until the next
                    // newline; poll it again to frame the remainder.
                    warn!(limit = MAX_LINE_BYTES, "oversized line discarded");
                }
                Err(LinesCodecError::Io(io_err)) => {
                    return Err(ClientError::Io(io_err.to_string()));
                }
            }
        }
    }

    /// Flush a final unterminated line at EOF, with the same oversized-line
    /// tolerance as [`LineCodec::decode`].
    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        loop {
            match self.0.decode_eof(src) {
                Ok(item) => return Ok(item),
                Err(LinesCodecError::MaxLineLengthExceeded) => {
                    warn!(limit = MAX_LINE_BYTES, "oversized line discarded at EOF");
                }
                Err(LinesCodecError::Io(io_err)) => {
                    return Err(ClientError::Io(io_err.to_string()));
                }
            }
        }
    }
}

impl Encoder<String> for LineCodec {
    type Error = ClientError;

    /// Encode `item` as `item\n`. The length limit is a decode-side guard
    /// and is not enforced here.
    fn encode(&mut self, item: String, dst: &mut BytesMut) -> Result<()> {
        self.0.encode(item, dst).map_err(|e| match e {
            LinesCodecError::MaxLineLengthExceeded => {
                ClientError::Decode(format!("line too long: exceeded {MAX_LINE_BYTES} bytes"))
            }
            LinesCodecError::Io(io_err) => ClientError::Io(io_err.to_string()),
        })
    }
}
