//! Frame packing and stream reassembly
//!
//! Wire format of one packet:
//!
//! ```text
//! +----------------------------------+---------------------------+
//! | ASCII header "<length>SEQ<seq>:" | <length> raw payload bytes |
//! +----------------------------------+---------------------------+
//! ```
//!
//! `length` and `seq` are variable-width, non-negative decimal integers.
//! There is no checksum and no end-of-stream marker; the connection closing
//! is the end of the stream.
//!
//! A single socket read may hold zero, one or many packets, so parsing is
//! driven against an accumulating [`BytesMut`] and [`try_parse`] has to be
//! called until it returns `Ok(None)`.

use crate::error::{CodecError, CodecResult};
use bytes::{Buf, Bytes, BytesMut};

/// Byte terminating the ASCII header
pub const HEADER_DELIMITER: u8 = b':';

/// Literal separating the length and sequence fields
pub const SEQ_SEPARATOR: &[u8] = b"SEQ";

/// Widest legal header: u32 digits + `SEQ` + u64 digits + `:`
pub const MAX_HEADER_LEN: usize = 10 + SEQ_SEPARATOR.len() + 20 + 1;

/// Default upper bound on a single payload (16MB)
pub const DEFAULT_MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// One reassembled packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Payload length as declared by the header
    pub length: u32,
    /// Sender-assigned sequence number
    pub sequence: u64,
    /// Exactly `length` payload bytes
    pub payload: Bytes,
}

/// Serialize `payload` into a packet carrying `sequence`
pub fn pack(payload: &[u8], sequence: u64) -> CodecResult<Bytes> {
    let mut out = BytesMut::with_capacity(MAX_HEADER_LEN + payload.len());
    pack_into(&mut out, payload, sequence)?;
    Ok(out.freeze())
}

/// Append the packet for `payload` to an existing buffer
pub fn pack_into(out: &mut BytesMut, payload: &[u8], sequence: u64) -> CodecResult<()> {
    let length = u32::try_from(payload.len()).map_err(|_| CodecError::PayloadTooLarge {
        size: payload.len(),
    })?;

    let header = format!("{}SEQ{}:", length, sequence);
    out.reserve(header.len() + payload.len());
    out.extend_from_slice(header.as_bytes());
    out.extend_from_slice(payload);
    Ok(())
}

/// Extract the next complete packet from the front of `buffer`
///
/// Returns `Ok(None)` while the header or the payload is still incomplete;
/// the buffer is left untouched in that case. On success the header and
/// exactly `length` payload bytes are removed and any trailing bytes stay
/// in place for the next call.
pub fn try_parse(buffer: &mut BytesMut) -> CodecResult<Option<Frame>> {
    try_parse_with_limit(buffer, DEFAULT_MAX_FRAME_LEN)
}

/// [`try_parse`] with an explicit payload size limit
pub fn try_parse_with_limit(
    buffer: &mut BytesMut,
    max_frame_len: usize,
) -> CodecResult<Option<Frame>> {
    let scan_len = buffer.len().min(MAX_HEADER_LEN);
    let delimiter = match buffer[..scan_len].iter().position(|&b| b == HEADER_DELIMITER) {
        Some(pos) => pos,
        None if buffer.len() >= MAX_HEADER_LEN => {
            return Err(CodecError::HeaderTooLong {
                limit: MAX_HEADER_LEN,
                buffered: buffer.len(),
            });
        }
        None => return Ok(None),
    };

    let (length, sequence) = parse_header(&buffer[..delimiter])?;
    let payload_len = length as usize;
    if payload_len > max_frame_len {
        return Err(CodecError::FrameTooLarge {
            size: payload_len,
            max: max_frame_len,
            sequence,
        });
    }

    if buffer.len() < delimiter + 1 + payload_len {
        return Ok(None);
    }

    buffer.advance(delimiter + 1);
    let payload = buffer.split_to(payload_len).freeze();

    Ok(Some(Frame {
        length,
        sequence,
        payload,
    }))
}

fn parse_header(header: &[u8]) -> CodecResult<(u32, u64)> {
    let separator = header
        .windows(SEQ_SEPARATOR.len())
        .position(|window| window == SEQ_SEPARATOR)
        .ok_or_else(|| CodecError::MissingSeparator {
            header: String::from_utf8_lossy(header).into_owned(),
        })?;

    let length = parse_decimal("length", &header[..separator])?;
    let sequence = parse_decimal("sequence", &header[separator + SEQ_SEPARATOR.len()..])?;
    Ok((length, sequence))
}

// `str::parse` accepts a leading '+', the wire format does not.
fn parse_decimal<T: std::str::FromStr>(field: &'static str, raw: &[u8]) -> CodecResult<T> {
    if raw.is_empty() || !raw.iter().all(u8::is_ascii_digit) {
        return Err(CodecError::invalid_field(field, raw));
    }

    std::str::from_utf8(raw)
        .ok()
        .and_then(|digits| digits.parse().ok())
        .ok_or_else(|| CodecError::invalid_field(field, raw))
}

/// Receive-side reassembly buffer
///
/// Owns the bytes read from one connection direction that have not yet
/// formed a complete packet.
#[derive(Debug)]
pub struct FrameParser {
    buffer: BytesMut,
    max_frame_len: usize,
}

impl FrameParser {
    pub fn new() -> Self {
        Self::with_max_frame_len(DEFAULT_MAX_FRAME_LEN)
    }

    pub fn with_max_frame_len(max_frame_len: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(64 * 1024),
            max_frame_len,
        }
    }

    /// Append freshly read bytes in arrival order
    pub fn extend_from_slice(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Pop the next complete packet, if one is buffered
    pub fn next_frame(&mut self) -> CodecResult<Option<Frame>> {
        try_parse_with_limit(&mut self.buffer, self.max_frame_len)
    }

    /// Receive buffer, for socket reads that append in place
    pub fn buffer_mut(&mut self) -> &mut BytesMut {
        &mut self.buffer
    }

    /// Drop any partial packet
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Bytes waiting for the rest of their packet
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn max_frame_len(&self) -> usize {
        self.max_frame_len
    }
}

impl Default for FrameParser {
    fn default() -> Self {
        Self::new()
    }
}
