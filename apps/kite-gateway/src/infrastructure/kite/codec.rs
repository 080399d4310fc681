//! Ticker Codec
//!
//! Encodes commands as JSON text frames and decodes the binary market data
//! frames of the Kite ticker.
//!
//! # Binary Frame Layout
//!
//! ```text
//! ┌──────────┬──────────┬──────────────┬──────────┬──────────────┬───
//! │ count:u16│ len:u16  │ packet[len]  │ len:u16  │ packet[len]  │ ...
//! └──────────┴──────────┴──────────────┴──────────┴──────────────┴───
//! ```
//!
//! All integers are big-endian. A frame of a single byte is a heartbeat.
//! Every packet starts with the instrument token; packets of eight bytes or
//! more carry the last traded price at offset 4, scaled by a per-segment
//! divisor.

use crate::application::ports::TickerCommand;
use crate::domain::ticker::{Tick, TickMode};
use crate::infrastructure::kite::messages::{ClientRequest, RawTextMessage, ServerMessage};

/// Exchange segment of currency derivatives (NSE).
const SEGMENT_CDS: u32 = 3;
/// Exchange segment of currency derivatives (BSE).
const SEGMENT_BCD: u32 = 6;
/// Exchange segment of indices.
const SEGMENT_INDICES: u32 = 9;

/// Codec errors.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// JSON encoding/decoding failed.
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// The frame ended before the declared data.
    #[error("truncated frame: needed {needed} bytes at offset {offset}, have {available}")]
    Truncated {
        /// Offset of the read.
        offset: usize,
        /// Bytes required.
        needed: usize,
        /// Bytes left.
        available: usize,
    },

    /// A packet too short to carry an instrument token.
    #[error("packet of {0} bytes has no instrument token")]
    ShortPacket(usize),
}

/// Decoded binary frame.
#[derive(Debug, Clone, PartialEq)]
pub enum BinaryFrame {
    /// Keep-alive.
    Heartbeat,
    /// Market data.
    Ticks(Vec<Tick>),
}

/// Codec for the Kite ticker.
#[derive(Debug, Default, Clone, Copy)]
pub struct TickerCodec;

impl TickerCodec {
    /// Create a codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Encode a command as a text frame.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn encode(&self, command: TickerCommand) -> Result<String, CodecError> {
        Ok(serde_json::to_string(&ClientRequest::from(command))?)
    }

    /// Decode a text frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame is not a JSON object with a `type`.
    pub fn decode_text(&self, text: &str) -> Result<ServerMessage, CodecError> {
        let raw: RawTextMessage = serde_json::from_str(text)?;
        Ok(raw.into())
    }

    /// Decode a binary frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame is truncated. A packet too short to
    /// carry an instrument token is logged and skipped; the other ticks in
    /// the frame are kept.
    pub fn decode_binary(&self, frame: &[u8]) -> Result<BinaryFrame, CodecError> {
        if frame.len() <= 1 {
            return Ok(BinaryFrame::Heartbeat);
        }

        let mut reader = Reader::new(frame);
        let count = reader.u16()?;
        let mut ticks = Vec::with_capacity(usize::from(count));
        for _ in 0..count {
            let length = usize::from(reader.u16()?);
            let packet = reader.take(length)?;
            match decode_packet(packet) {
                Ok(tick) => ticks.push(tick),
                Err(error) => tracing::warn!(%error, "Skipping malformed tick packet"),
            }
        }
        Ok(BinaryFrame::Ticks(ticks))
    }
}

fn decode_packet(packet: &[u8]) -> Result<Tick, CodecError> {
    let mut reader = Reader::new(packet);
    let instrument_token = reader
        .u32()
        .map_err(|_| CodecError::ShortPacket(packet.len()))?;
    let segment = instrument_token & 0xff;

    let last_price = if packet.len() >= 8 {
        let raw = reader.i32()?;
        Some(f64::from(raw) / price_divisor(segment))
    } else {
        None
    };

    Ok(Tick {
        instrument_token,
        mode: mode_for_length(packet.len()),
        tradable: segment != SEGMENT_INDICES,
        last_price,
    })
}

const fn price_divisor(segment: u32) -> f64 {
    match segment {
        SEGMENT_CDS => 10_000_000.0,
        SEGMENT_BCD => 10_000.0,
        _ => 100.0,
    }
}

const fn mode_for_length(length: usize) -> TickMode {
    match length {
        28 | 44 => TickMode::Quote,
        32 | 184 => TickMode::Full,
        _ => TickMode::Ltp,
    }
}

/// Big-endian cursor over a byte slice.
struct Reader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    const fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, offset: 0 }
    }

    fn take(&mut self, needed: usize) -> Result<&'a [u8], CodecError> {
        let available = self.bytes.len() - self.offset;
        if needed > available {
            return Err(CodecError::Truncated {
                offset: self.offset,
                needed,
                available,
            });
        }
        let slice = &self.bytes[self.offset..self.offset + needed];
        self.offset += needed;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u16(&mut self) -> Result<u16, CodecError> {
        Ok(u16::from_be_bytes(self.array()?))
    }

    fn u32(&mut self) -> Result<u32, CodecError> {
        Ok(u32::from_be_bytes(self.array()?))
    }

    fn i32(&mut self) -> Result<i32, CodecError> {
        Ok(i32::from_be_bytes(self.array()?))
    }
}

/// Build a binary frame from `(token, price in paise, packet length)`.
///
/// Test helper shared with the transport tests.
#[cfg(test)]
pub(crate) fn encode_frame(packets: &[(u32, i32, usize)]) -> Vec<u8> {
    let mut frame = Vec::new();
    frame.extend_from_slice(&u16::try_from(packets.len()).unwrap().to_be_bytes());
    for &(token, price, length) in packets {
        let mut packet = vec![0u8; length];
        packet[..4].copy_from_slice(&token.to_be_bytes());
        if length >= 8 {
            packet[4..8].copy_from_slice(&price.to_be_bytes());
        }
        frame.extend_from_slice(&u16::try_from(length).unwrap().to_be_bytes());
        frame.extend_from_slice(&packet);
    }
    frame
}
