//! Packet buffer for accumulating partial reads.
//!
//! A stream read may carry several packets or a fragment of one. The buffer
//! runs a small state machine:
//! - `WaitingForHeader`: need at least 4 bytes
//! - `WaitingForBody`: header parsed, need N more body bytes
//!
//! Packets with an unknown type byte are consumed and dropped.
//!
//! # Example
//!
//! ```
//! use routewire_client::protocol::{Packet, PacketBuffer, PacketType};
//!
//! let mut buffer = PacketBuffer::new();
//! let bytes = Packet::empty(PacketType::Heartbeat).to_bytes().unwrap();
//!
//! assert!(buffer.push(&bytes[..2]).unwrap().is_empty());
//! let packets = buffer.push(&bytes[2..]).unwrap();
//! assert_eq!(packets[0].packet_type, PacketType::Heartbeat);
//! ```

use bytes::BytesMut;
use tracing::warn;

use super::packet::{decode_header, Packet, PacketType, HEADER_SIZE, MAX_BODY_SIZE};
use crate::error::{Result, RoutewireError};

#[derive(Debug, Clone, Copy)]
enum State {
    WaitingForHeader,
    WaitingForBody {
        /// `None` for an unknown type byte; the body is discarded.
        packet_type: Option<PacketType>,
        remaining: usize,
    },
}

/// Accumulates inbound bytes and extracts complete packets.
pub struct PacketBuffer {
    buffer: BytesMut,
    state: State,
    max_body_size: usize,
}

impl PacketBuffer {
    /// Create a packet buffer with default settings.
    ///
    /// Default capacity: 16KB, max body: the 24-bit wire limit.
    pub fn new() -> Self {
        Self::with_capacity_and_max_body(16 * 1024, MAX_BODY_SIZE)
    }

    /// Create a packet buffer with a lower body limit.
    pub fn with_max_body(max_body_size: usize) -> Self {
        Self::with_capacity_and_max_body(16 * 1024, max_body_size)
    }

    pub fn with_capacity_and_max_body(capacity: usize, max_body_size: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(capacity),
            state: State::WaitingForHeader,
            max_body_size: max_body_size.min(MAX_BODY_SIZE),
        }
    }

    /// Push data into the buffer and extract all complete packets.
    ///
    /// Partial data stays buffered for the next push.
    ///
    /// # Errors
    ///
    /// `Protocol` if a header announces a body larger than the limit. The
    /// stream cannot be resynchronised after that.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<Packet>> {
        self.buffer.extend_from_slice(data);

        let mut packets = Vec::new();
        while let Some(next) = self.try_extract_one()? {
            if let Some(packet) = next {
                packets.push(packet);
            }
        }
        Ok(packets)
    }

    /// `Ok(Some(None))` means a packet was consumed but skipped.
    fn try_extract_one(&mut self) -> Result<Option<Option<Packet>>> {
        match self.state {
            State::WaitingForHeader => {
                let Some((raw_type, body_len)) = decode_header(&self.buffer) else {
                    return Ok(None);
                };

                if body_len > self.max_body_size {
                    return Err(RoutewireError::Protocol(format!(
                        "Packet body {} exceeds maximum {}",
                        body_len, self.max_body_size
                    )));
                }

                let packet_type = PacketType::try_from(raw_type).ok();
                if packet_type.is_none() {
                    warn!(packet_type = raw_type, body_len, "Skipping packet of unknown type");
                }

                let _ = self.buffer.split_to(HEADER_SIZE);
                self.state = State::WaitingForBody {
                    packet_type,
                    remaining: body_len,
                };
                self.try_extract_one()
            }

            State::WaitingForBody {
                packet_type,
                remaining,
            } => {
                if self.buffer.len() < remaining {
                    return Ok(None);
                }

                let body = self.buffer.split_to(remaining).freeze();
                self.state = State::WaitingForHeader;

                Ok(Some(packet_type.map(|packet_type| Packet { packet_type, body })))
            }
        }
    }

    /// Number of buffered bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Clear the buffer and reset state.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.state = State::WaitingForHeader;
    }

    #[cfg(test)]
    fn state_name(&self) -> &'static str {
        match self.state {
            State::WaitingForHeader => "WaitingForHeader",
            State::WaitingForBody { .. } => "WaitingForBody",
        }
    }
}

impl Default for PacketBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packet_bytes(packet_type: PacketType, body: &[u8]) -> Vec<u8> {
        Packet::new(packet_type, body.to_vec()).to_bytes().unwrap()
    }

    #[test]
    fn test_single_complete_packet() {
        let mut buffer = PacketBuffer::new();
        let packets = buffer.push(&packet_bytes(PacketType::Data, b"hello")).unwrap();

        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].packet_type, PacketType::Data);
        assert_eq!(&packets[0].body[..], b"hello");
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_multiple_packets_in_one_push() {
        let mut buffer = PacketBuffer::new();
        let mut combined = packet_bytes(PacketType::Heartbeat, b"");
        combined.extend(packet_bytes(PacketType::Data, b"second"));
        combined.extend(packet_bytes(PacketType::Kick, b"{}"));

        let packets = buffer.push(&combined).unwrap();
        let types: Vec<_> = packets.iter().map(|p| p.packet_type).collect();
        assert_eq!(
            types,
            vec![PacketType::Heartbeat, PacketType::Data, PacketType::Kick]
        );
    }

    #[test]
    fn test_fragmented_header_and_body() {
        let mut buffer = PacketBuffer::new();
        let bytes = packet_bytes(PacketType::Data, b"a longer body split in pieces");

        assert!(buffer.push(&bytes[..2]).unwrap().is_empty());
        assert_eq!(buffer.state_name(), "WaitingForHeader");

        assert!(buffer.push(&bytes[2..10]).unwrap().is_empty());
        assert_eq!(buffer.state_name(), "WaitingForBody");

        let packets = buffer.push(&bytes[10..]).unwrap();
        assert_eq!(&packets[0].body[..], b"a longer body split in pieces");
        assert_eq!(buffer.state_name(), "WaitingForHeader");
    }

    #[test]
    fn test_byte_at_a_time() {
        let mut buffer = PacketBuffer::new();
        let bytes = packet_bytes(PacketType::Data, b"hi");

        let mut all = Vec::new();
        for byte in &bytes {
            all.extend(buffer.push(&[*byte]).unwrap());
        }
        assert_eq!(all.len(), 1);
        assert_eq!(&all[0].body[..], b"hi");
    }

    #[test]
    fn test_unknown_type_is_skipped() {
        let mut buffer = PacketBuffer::new();
        let mut data = vec![9, 0, 0, 3, b'x', b'y', b'z'];
        data.extend(packet_bytes(PacketType::Heartbeat, b""));

        let packets = buffer.push(&data).unwrap();
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].packet_type, PacketType::Heartbeat);
    }

    #[test]
    fn test_max_body_validation() {
        let mut buffer = PacketBuffer::with_max_body(100);
        let result = buffer.push(&[4, 0, 0x03, 0xE8]);
        assert!(result.unwrap_err().to_string().contains("exceeds maximum"));
    }

    #[test]
    fn test_clear_resets_state() {
        let mut buffer = PacketBuffer::new();
        buffer.push(&[4, 0, 0, 9, 1, 2]).unwrap();
        assert_eq!(buffer.state_name(), "WaitingForBody");

        buffer.clear();
        assert_eq!(buffer.state_name(), "WaitingForHeader");
        assert!(buffer.is_empty());
    }
}
