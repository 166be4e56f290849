//! Message envelope carried in DATA packets.
//!
//! ```text
//! flag byte   (type << 1) | compress_route
//! id          varint            REQUEST, RESPONSE
//! route       u16 BE            REQUEST, NOTIFY, PUSH when compressed
//!             u8 len + UTF-8    REQUEST, NOTIFY, PUSH otherwise
//! body        rest of packet
//! ```

use bytes::Bytes;

use crate::codec::varint::{decode_varint, encode_varint};
use crate::error::{Result, RoutewireError};

/// Longest uncompressed route (length is a single byte).
pub const MAX_ROUTE_LEN: usize = 255;

const COMPRESS_FLAG: u8 = 0x01;

/// Message type, bits 1..=3 of the flag byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    Request = 0,
    Notify = 1,
    Response = 2,
    Push = 3,
}

impl MessageType {
    #[inline]
    fn has_id(self) -> bool {
        matches!(self, Self::Request | Self::Response)
    }

    #[inline]
    fn has_route(self) -> bool {
        matches!(self, Self::Request | Self::Notify | Self::Push)
    }
}

impl TryFrom<u8> for MessageType {
    type Error = RoutewireError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::Request),
            1 => Ok(Self::Notify),
            2 => Ok(Self::Response),
            3 => Ok(Self::Push),
            other => Err(RoutewireError::Protocol(format!(
                "Unknown message type {other}"
            ))),
        }
    }
}

/// Route as carried on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Name(String),
    /// Dictionary code; sets the compress flag.
    Code(u16),
}

/// A decoded message envelope. The body is still encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// 0 for notify and push.
    pub id: u32,
    pub message_type: MessageType,
    /// `None` for responses.
    pub route: Option<Route>,
    pub body: Bytes,
}

impl Message {
    pub fn request(id: u32, route: Route, body: impl Into<Bytes>) -> Self {
        Self {
            id,
            message_type: MessageType::Request,
            route: Some(route),
            body: body.into(),
        }
    }

    pub fn notify(route: Route, body: impl Into<Bytes>) -> Self {
        Self {
            id: 0,
            message_type: MessageType::Notify,
            route: Some(route),
            body: body.into(),
        }
    }

    pub fn response(id: u32, body: impl Into<Bytes>) -> Self {
        Self {
            id,
            message_type: MessageType::Response,
            route: None,
            body: body.into(),
        }
    }

    pub fn push(route: Route, body: impl Into<Bytes>) -> Self {
        Self {
            id: 0,
            message_type: MessageType::Push,
            route: Some(route),
            body: body.into(),
        }
    }

    /// Whether the route travels as a dictionary code.
    pub fn compress_route(&self) -> bool {
        matches!(self.route, Some(Route::Code(_)))
    }

    /// Encode the envelope and body.
    ///
    /// # Errors
    ///
    /// `Protocol` if the message type requires a route and has none, or the
    /// route name is longer than [`MAX_ROUTE_LEN`] bytes.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(8 + self.body.len());
        buf.push(((self.message_type as u8) << 1) | u8::from(self.compress_route()));

        if self.message_type.has_id() {
            encode_varint(u64::from(self.id), &mut buf);
        }

        if self.message_type.has_route() {
            match &self.route {
                Some(Route::Code(code)) => buf.extend_from_slice(&code.to_be_bytes()),
                Some(Route::Name(name)) => {
                    if name.len() > MAX_ROUTE_LEN {
                        return Err(RoutewireError::Protocol(format!(
                            "Route `{name}` longer than {MAX_ROUTE_LEN} bytes"
                        )));
                    }
                    buf.push(name.len() as u8);
                    buf.extend_from_slice(name.as_bytes());
                }
                None => {
                    return Err(RoutewireError::Protocol(format!(
                        "{:?} message needs a route",
                        self.message_type
                    )))
                }
            }
        }

        buf.extend_from_slice(&self.body);
        Ok(buf)
    }

    /// Decode an envelope from a DATA packet body.
    ///
    /// # Errors
    ///
    /// `Protocol` on a truncated envelope, an unknown message type, an id
    /// wider than 32 bits or a non-UTF-8 route.
    pub fn decode(data: &Bytes) -> Result<Self> {
        let flag = *data
            .first()
            .ok_or_else(|| RoutewireError::Protocol("Empty message".to_string()))?;
        let message_type = MessageType::try_from((flag >> 1) & 0x07)?;
        let compressed = flag & COMPRESS_FLAG != 0;
        let mut offset = 1;

        let mut id = 0;
        if message_type.has_id() {
            let (raw, read) = decode_varint(&data[offset..])
                .map_err(|e| RoutewireError::Protocol(format!("Bad message id: {e}")))?;
            id = u32::try_from(raw)
                .map_err(|_| RoutewireError::Protocol(format!("Message id {raw} out of range")))?;
            offset += read;
        }

        let mut route = None;
        if message_type.has_route() {
            if compressed {
                let bytes = data
                    .get(offset..offset + 2)
                    .ok_or_else(|| truncated("route code"))?;
                route = Some(Route::Code(u16::from_be_bytes([bytes[0], bytes[1]])));
                offset += 2;
            } else {
                let len = *data.get(offset).ok_or_else(|| truncated("route length"))? as usize;
                offset += 1;
                let bytes = data
                    .get(offset..offset + len)
                    .ok_or_else(|| truncated("route"))?;
                let name = std::str::from_utf8(bytes)
                    .map_err(|_| RoutewireError::Protocol("Route is not UTF-8".to_string()))?;
                route = Some(Route::Name(name.to_string()));
                offset += len;
            }
        }

        Ok(Self {
            id,
            message_type,
            route,
            body: data.slice(offset..),
        })
    }
}

fn truncated(what: &str) -> RoutewireError {
    RoutewireError::Protocol(format!("Message truncated in {what}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(message: Message) -> Message {
        let encoded = Bytes::from(message.encode().unwrap());
        Message::decode(&encoded).unwrap()
    }

    #[test]
    fn test_request_with_compressed_route() {
        let message = Message::request(1, Route::Code(1), &b"{}"[..]);
        let encoded = message.encode().unwrap();
        assert_eq!(encoded, [0x01, 0x01, 0x00, 0x01, b'{', b'}']);
        assert_eq!(roundtrip(message.clone()), message);
    }

    #[test]
    fn test_notify_with_named_route() {
        let message = Message::notify(Route::Name("chat.send".into()), &b"x"[..]);
        let encoded = message.encode().unwrap();
        assert_eq!(encoded[0], 0x02);
        assert_eq!(encoded[1], 9);
        assert_eq!(&encoded[2..11], b"chat.send");
        assert_eq!(roundtrip(message.clone()), message);
    }

    #[test]
    fn test_response_has_id_and_no_route() {
        let message = Message::response(300, &b"ok"[..]);
        let encoded = message.encode().unwrap();
        assert_eq!(encoded, [0x04, 0xAC, 0x02, b'o', b'k']);
        assert_eq!(roundtrip(message.clone()), message);
    }

    #[test]
    fn test_push() {
        let message = Message::push(Route::Code(0x0102), Bytes::new());
        assert_eq!(message.encode().unwrap(), [0x07, 0x01, 0x02]);
        let decoded = roundtrip(message);
        assert_eq!(decoded.id, 0);
        assert!(decoded.compress_route());
    }

    #[test]
    fn test_route_too_long() {
        let message = Message::notify(Route::Name("r".repeat(256)), Bytes::new());
        assert!(message.encode().is_err());
    }

    #[test]
    fn test_truncated_envelopes() {
        for raw in [&[][..], &[0x00, 0x80], &[0x01, 0x01, 0x00], &[0x06, 5, b'a']] {
            assert!(Message::decode(&Bytes::copy_from_slice(raw)).is_err());
        }
    }

    #[test]
    fn test_unknown_message_type() {
        assert!(Message::decode(&Bytes::from_static(&[0x0E])).is_err());
    }
}
