//! Protocol module - packet framing, message envelope and handshake bodies.
//!
//! - 4-byte packet header encoding/decoding
//! - Packet buffer for accumulating partial reads
//! - Message envelope for DATA packets
//! - Handshake request/response JSON

mod handshake;
mod message;
mod packet;
mod packet_buffer;

pub use handshake::{
    ClientInfo, HandshakeRequest, HandshakeResponse, Protos, SessionInfo, CODE_OK,
    CODE_OLD_CLIENT,
};
pub use message::{Message, MessageType, Route, MAX_ROUTE_LEN};
pub use packet::{decode_header, encode_header, Packet, PacketType, HEADER_SIZE, MAX_BODY_SIZE};
pub use packet_buffer::PacketBuffer;
