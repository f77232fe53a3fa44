//! Codec for the UDP Query protocol (`enable-query` in server.properties).
//!
//! A query is a two step exchange: a handshake returning a challenge token,
//! then a full stat request carrying that token. Only the full stat variant
//! is supported since it is the only one listing player names.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

const MAGIC: [u8; 2] = [0xFE, 0xFD];
const TYPE_HANDSHAKE: u8 = 0x09;
const TYPE_STAT: u8 = 0x00;
const KV_PADDING: &[u8] = b"splitnum\x00\x80\x00";
const PLAYER_PADDING: &[u8] = b"\x01player_\x00\x00";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueryError {
    #[error("response truncated")]
    Truncated,
    #[error("unexpected packet type 0x{0:02x}")]
    UnexpectedType(u8),
    #[error("session id mismatch (expected {expected}, got {actual})")]
    SessionMismatch { expected: i32, actual: i32 },
    #[error("invalid challenge token: {0}")]
    InvalidToken(String),
    #[error("malformed response: {0}")]
    Malformed(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct QueryStatus {
    pub motd: String,
    pub version: String,
    pub map: String,
    pub online: u32,
    pub max: u32,
    pub players: Vec<String>,
    /// Every key/value pair of the stat section, including the ones above.
    pub raw: HashMap<String, String>,
}

/// Only the low nibble of every byte is echoed back by the server.
pub fn mask_session_id(session_id: i32) -> i32 {
    session_id & 0x0F0F_0F0F
}

pub fn handshake_request(session_id: i32) -> Vec<u8> {
    let mut packet = Vec::with_capacity(7);
    packet.extend_from_slice(&MAGIC);
    packet.push(TYPE_HANDSHAKE);
    packet.extend_from_slice(&session_id.to_be_bytes());
    packet
}

pub fn full_stat_request(session_id: i32, token: i32) -> Vec<u8> {
    let mut packet = Vec::with_capacity(15);
    packet.extend_from_slice(&MAGIC);
    packet.push(TYPE_STAT);
    packet.extend_from_slice(&session_id.to_be_bytes());
    packet.extend_from_slice(&token.to_be_bytes());
    // padding selects the full stat variant
    packet.extend_from_slice(&[0, 0, 0, 0]);
    packet
}

pub fn parse_handshake_response(data: &[u8], session_id: i32) -> Result<i32, QueryError> {
    let body = check_header(data, TYPE_HANDSHAKE, session_id)?;
    let mut offset = 0;
    let token = read_cstring(body, &mut offset)?;
    token
        .trim()
        .parse::<i32>()
        .map_err(|_| QueryError::InvalidToken(token.clone()))
}

pub fn parse_full_stat(data: &[u8], session_id: i32) -> Result<QueryStatus, QueryError> {
    let body = check_header(data, TYPE_STAT, session_id)?;
    if !body.starts_with(KV_PADDING) {
        return Err(QueryError::Malformed("missing key/value section"));
    }
    let mut offset = KV_PADDING.len();

    let mut raw = HashMap::new();
    loop {
        let key = read_cstring(body, &mut offset)?;
        if key.is_empty() {
            break;
        }
        let value = read_cstring(body, &mut offset)?;
        raw.insert(key, value);
    }

    if !body[offset..].starts_with(PLAYER_PADDING) {
        return Err(QueryError::Malformed("missing player section"));
    }
    offset += PLAYER_PADDING.len();

    let mut players = vec![];
    while offset < body.len() {
        let name = read_cstring(body, &mut offset)?;
        if name.is_empty() {
            break;
        }
        players.push(name);
    }

    let field = |key: &str| raw.get(key).cloned().unwrap_or_default();
    let number = |key: &str| {
        raw.get(key)
            .and_then(|v| v.trim().parse::<u32>().ok())
            .unwrap_or(0)
    };

    Ok(QueryStatus {
        motd: field("hostname"),
        version: field("version"),
        map: field("map"),
        online: number("numplayers"),
        max: number("maxplayers"),
        players,
        raw,
    })
}

fn check_header(data: &[u8], expected_type: u8, session_id: i32) -> Result<&[u8], QueryError> {
    if data.len() < 5 {
        return Err(QueryError::Truncated);
    }
    if data[0] != expected_type {
        return Err(QueryError::UnexpectedType(data[0]));
    }
    let actual = i32::from_be_bytes([data[1], data[2], data[3], data[4]]);
    let expected = mask_session_id(session_id);
    if actual != expected {
        return Err(QueryError::SessionMismatch { expected, actual });
    }
    Ok(&data[5..])
}

// strings on the wire are NUL terminated latin-1
fn read_cstring(data: &[u8], offset: &mut usize) -> Result<String, QueryError> {
    let rest = data.get(*offset..).ok_or(QueryError::Truncated)?;
    let end = rest
        .iter()
        .position(|&b| b == 0)
        .ok_or(QueryError::Truncated)?;
    *offset += end + 1;
    Ok(rest[..end].iter().map(|&b| b as char).collect())
}
