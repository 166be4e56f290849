//! Packet envelope.
//!
//! Every unit on the wire is a packet with a 4-byte header:
//! ```text
//! ┌──────┬─────────────────┐
//! │ Type │ Body length     │
//! │ 1 B  │ 3 B, uint24 BE  │
//! └──────┴─────────────────┘
//! ```
//! followed by `body length` bytes of body.

use bytes::Bytes;

use crate::error::{Result, RoutewireError};

/// Header size in bytes (fixed, exactly 4).
pub const HEADER_SIZE: usize = 4;

/// Largest body a 24-bit length can describe.
pub const MAX_BODY_SIZE: usize = 0x00FF_FFFF;

/// Packet type byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketType {
    /// Client capabilities out, negotiated session parameters back.
    Handshake = 1,
    /// Client confirms the handshake response.
    HandshakeAck = 2,
    /// Keep-alive, either direction. Empty body.
    Heartbeat = 3,
    /// Carries one [`Message`](super::Message).
    Data = 4,
    /// Peer is closing the session; JSON body.
    Kick = 5,
}

impl TryFrom<u8> for PacketType {
    type Error = u8;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Handshake),
            2 => Ok(Self::HandshakeAck),
            3 => Ok(Self::Heartbeat),
            4 => Ok(Self::Data),
            5 => Ok(Self::Kick),
            other => Err(other),
        }
    }
}

/// Encode a packet header.
///
/// # Errors
///
/// `Protocol` if `body_len` does not fit in 24 bits.
///
/// # Example
///
/// ```
/// use routewire_client::protocol::{encode_header, PacketType};
///
/// assert_eq!(encode_header(PacketType::Data, 300).unwrap(), [4, 0, 1, 44]);
/// ```
pub fn encode_header(packet_type: PacketType, body_len: usize) -> Result<[u8; HEADER_SIZE]> {
    if body_len > MAX_BODY_SIZE {
        return Err(RoutewireError::Protocol(format!(
            "Packet body {body_len} exceeds maximum {MAX_BODY_SIZE}"
        )));
    }
    let len = (body_len as u32).to_be_bytes();
    Ok([packet_type as u8, len[1], len[2], len[3]])
}

/// Decode a raw header into `(type byte, body length)`.
///
/// Returns `None` if the buffer is too short. The type byte is returned
/// unvalidated so callers can skip unknown packet types.
pub fn decode_header(buf: &[u8]) -> Option<(u8, usize)> {
    if buf.len() < HEADER_SIZE {
        return None;
    }
    let len = u32::from_be_bytes([0, buf[1], buf[2], buf[3]]) as usize;
    Some((buf[0], len))
}

/// A complete packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub packet_type: PacketType,
    pub body: Bytes,
}

impl Packet {
    pub fn new(packet_type: PacketType, body: impl Into<Bytes>) -> Self {
        Self {
            packet_type,
            body: body.into(),
        }
    }

    /// A packet with no body (heartbeat, handshake ack).
    pub fn empty(packet_type: PacketType) -> Self {
        Self::new(packet_type, Bytes::new())
    }

    /// Header bytes for this packet.
    pub fn header(&self) -> Result<[u8; HEADER_SIZE]> {
        encode_header(self.packet_type, self.body.len())
    }

    /// Header and body as one contiguous buffer.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(HEADER_SIZE + self.body.len());
        buf.extend_from_slice(&self.header()?);
        buf.extend_from_slice(&self.body);
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_layout() {
        let header = encode_header(PacketType::Kick, 0x01_02_03).unwrap();
        assert_eq!(header, [5, 0x01, 0x02, 0x03]);
        assert_eq!(decode_header(&header), Some((5, 0x01_02_03)));
    }

    #[test]
    fn test_header_too_short() {
        assert_eq!(decode_header(&[4, 0, 0]), None);
    }

    #[test]
    fn test_body_too_large() {
        assert!(encode_header(PacketType::Data, MAX_BODY_SIZE).is_ok());
        let err = encode_header(PacketType::Data, MAX_BODY_SIZE + 1).unwrap_err();
        assert!(err.to_string().contains("exceeds maximum"));
    }

    #[test]
    fn test_packet_type_from_byte() {
        for t in [
            PacketType::Handshake,
            PacketType::HandshakeAck,
            PacketType::Heartbeat,
            PacketType::Data,
            PacketType::Kick,
        ] {
            assert_eq!(PacketType::try_from(t as u8), Ok(t));
        }
        assert_eq!(PacketType::try_from(0), Err(0));
        assert_eq!(PacketType::try_from(6), Err(6));
    }

    #[test]
    fn test_empty_packet_bytes() {
        let bytes = Packet::empty(PacketType::Heartbeat).to_bytes().unwrap();
        assert_eq!(bytes, [3, 0, 0, 0]);
    }
}
