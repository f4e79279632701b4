//! NDJSON codec for the MCP server's stdio streams.
//!
//! Wraps [`tokio_util::codec::LinesCodec`] with a maximum line length so a
//! misbehaving server cannot make the client buffer an unbounded reply.
//!
//! # Usage
//!
//! Use [`RpcCodec`] as the codec parameter for
//! [`tokio_util::codec::FramedRead`] over the server's stdout and
//! [`tokio_util::codec::FramedWrite`] over its stdin.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder, LinesCodec, LinesCodecError};

use crate::errors::TransportError;

/// Maximum line length accepted from the server: 4 MiB.
///
/// Session listings for large repositories are a single line, so the limit
/// is generous; lines beyond it decode as
/// [`TransportError::MalformedPayload`].
pub const MAX_LINE_BYTES: usize = 4 * 1_048_576;

/// Line-delimited JSON codec for the JSON-RPC stdio transport.
///
/// Each `\n`-terminated UTF-8 line is one complete JSON document. Trailing
/// `\r` is stripped on decode.
#[derive(Debug)]
pub struct RpcCodec {
    lines: LinesCodec,
    max_length: usize,
}

impl RpcCodec {
    /// Create a codec with the default [`MAX_LINE_BYTES`] limit.
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_length(MAX_LINE_BYTES)
    }

    /// Create a codec with a custom inbound line limit.
    #[must_use]
    pub fn with_max_length(max_length: usize) -> Self {
        Self {
            lines: LinesCodec::new_with_max_length(max_length),
            max_length,
        }
    }
}

impl Default for RpcCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for RpcCodec {
    type Item = String;
    type Error = TransportError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let max_length = self.max_length;
        self.lines
            .decode(src)
            .map_err(|e| map_codec_error(e, max_length))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let max_length = self.max_length;
        self.lines
            .decode_eof(src)
            .map_err(|e| map_codec_error(e, max_length))
    }
}

impl Encoder<String> for RpcCodec {
    type Error = TransportError;

    /// Encode `item` as one `\n`-terminated line.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::MalformedPayload`] if `item` contains a
    /// newline, since it would split into two frames on the wire.
    fn encode(&mut self, item: String, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if item.contains('\n') {
            return Err(TransportError::MalformedPayload(
                "outbound message contains an embedded newline".into(),
            ));
        }
        let max_length = self.max_length;
        self.lines
            .encode(item, dst)
            .map_err(|e| map_codec_error(e, max_length))
    }
}

fn map_codec_error(e: LinesCodecError, max_length: usize) -> TransportError {
    match e {
        LinesCodecError::MaxLineLengthExceeded => TransportError::MalformedPayload(format!(
            "line too long: exceeded {max_length} bytes"
        )),
        LinesCodecError::Io(io_err) => TransportError::Io(io_err.to_string()),
    }
}
