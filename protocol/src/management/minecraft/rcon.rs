//! Packet framing of the remote console (Source RCON) protocol.
//!
//! Every packet is `length: i32 LE` followed by `length` bytes of
//! `request_id: i32 LE`, `type: i32 LE`, the body and two NUL bytes.

use thiserror::Error;

pub const TYPE_RESPONSE: i32 = 0;
pub const TYPE_COMMAND: i32 = 2;
pub const TYPE_AUTH_RESPONSE: i32 = 2;
pub const TYPE_LOGIN: i32 = 3;

/// Request id the server answers a rejected login with.
pub const AUTH_FAILED_ID: i32 = -1;

/// Longest command body the server accepts.
pub const MAX_COMMAND_LEN: usize = 1446;
/// Responses are split into packets carrying at most this many body bytes.
pub const MAX_RESPONSE_BODY: usize = 4096;

const HEADER_LEN: usize = 8;
const MIN_PAYLOAD_LEN: usize = HEADER_LEN + 2;
const MAX_PAYLOAD_LEN: usize = MIN_PAYLOAD_LEN + MAX_RESPONSE_BODY;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RconPacketError {
    #[error("invalid packet length {0}")]
    InvalidLength(i32),
    #[error("packet body is not NUL terminated")]
    MissingTerminator,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RconPacket {
    pub request_id: i32,
    pub kind: i32,
    pub body: Vec<u8>,
}

impl RconPacket {
    pub fn new(request_id: i32, kind: i32, body: impl Into<Vec<u8>>) -> Self {
        Self {
            request_id,
            kind,
            body: body.into(),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let length = (HEADER_LEN + self.body.len() + 2) as i32;
        let mut data = Vec::with_capacity(4 + length as usize);
        data.extend_from_slice(&length.to_le_bytes());
        data.extend_from_slice(&self.request_id.to_le_bytes());
        data.extend_from_slice(&self.kind.to_le_bytes());
        data.extend_from_slice(&self.body);
        data.extend_from_slice(&[0, 0]);
        data
    }

    /// Decodes the bytes following the length prefix.
    pub fn decode_payload(payload: &[u8]) -> Result<Self, RconPacketError> {
        if payload.len() < MIN_PAYLOAD_LEN {
            return Err(RconPacketError::InvalidLength(payload.len() as i32));
        }
        let request_id = i32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]);
        let kind = i32::from_le_bytes([payload[4], payload[5], payload[6], payload[7]]);
        let body = &payload[HEADER_LEN..];
        // some servers omit the trailing padding byte, accept one or two NULs
        let body = match body {
            [rest @ .., 0, 0] => rest,
            [rest @ .., 0] => rest,
            _ => return Err(RconPacketError::MissingTerminator),
        };
        Ok(Self {
            request_id,
            kind,
            body: body.to_vec(),
        })
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Validates a length prefix and returns the number of payload bytes to read.
pub fn payload_length(prefix: [u8; 4]) -> Result<usize, RconPacketError> {
    let length = i32::from_le_bytes(prefix);
    if length < MIN_PAYLOAD_LEN as i32 || length > MAX_PAYLOAD_LEN as i32 {
        return Err(RconPacketError::InvalidLength(length));
    }
    Ok(length as usize)
}
