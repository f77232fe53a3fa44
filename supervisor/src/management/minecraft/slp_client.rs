use crate::error::ProbeError;
use encoding::all::UTF_8;
use encoding::{DecoderTrap, Encoding};
use log::{debug, warn};
use mcsl_protocol::management::minecraft::{PingPayload, SlpStatus};
use std::marker::PhantomData;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::Instant;

const PROTOCOL_VERSION: i32 = 47;
const NEXT_STATE_STATUS: i32 = 1;
const MAX_PACKET_LEN: i32 = 2 * 1024 * 1024;

pub trait SlpClientState {}

pub struct Unconnected;
impl SlpClientState for Unconnected {}

/// Handshake sent, status state entered.
pub struct Connected;
impl SlpClientState for Connected {}

/// Server List Ping client. Only a connected client can request status.
pub struct SlpClient<TState: SlpClientState> {
    stream: Option<TcpStream>,
    buffer: Vec<u8>,
    _state: PhantomData<TState>,
}

impl SlpClient<Unconnected> {
    pub fn new() -> Self {
        SlpClient {
            stream: None,
            buffer: Vec::new(),
            _state: PhantomData,
        }
    }

    pub async fn handshake(self, host: &str, port: u16) -> Result<SlpClient<Connected>, ProbeError> {
        let stream = TcpStream::connect((host, port)).await?;
        stream.set_nodelay(true)?;
        let mut client = SlpClient {
            stream: Some(stream),
            buffer: self.buffer,
            _state: PhantomData::<Connected>,
        };

        client.write_varint(PROTOCOL_VERSION);
        client.write_string(host);
        client.write_short(port);
        client.write_varint(NEXT_STATE_STATUS);
        client.flush(0x00).await?;

        Ok(client)
    }
}

impl Default for SlpClient<Unconnected> {
    fn default() -> Self {
        Self::new()
    }
}

impl<TState: SlpClientState> SlpClient<TState> {
    fn write_short(&mut self, value: u16) {
        self.buffer.extend_from_slice(&value.to_be_bytes());
    }

    fn write_varint(&mut self, value: i32) {
        encode_varint(value, &mut self.buffer);
    }

    fn write_long(&mut self, value: i64) {
        self.buffer.extend_from_slice(&value.to_be_bytes());
    }

    fn write_string(&mut self, value: &str) {
        let data = value.as_bytes();
        self.write_varint(data.len() as i32);
        self.buffer.extend_from_slice(data);
    }

    /// Sends the buffered fields as one packet with the given id.
    async fn flush(&mut self, id: i32) -> Result<(), ProbeError> {
        let data = std::mem::take(&mut self.buffer);
        let mut packet_id = vec![];
        encode_varint(id, &mut packet_id);

        let mut packet = vec![];
        encode_varint((packet_id.len() + data.len()) as i32, &mut packet);
        packet.extend_from_slice(&packet_id);
        packet.extend_from_slice(&data);

        let stream = self.stream_mut()?;
        stream.write_all(&packet).await?;
        stream.flush().await?;
        Ok(())
    }

    async fn read_packet(&mut self) -> Result<(i32, Vec<u8>), ProbeError> {
        let stream = self.stream_mut()?;
        let mut length = 0i32;
        let mut shift = 0;
        loop {
            let b = stream.read_u8().await?;
            length |= ((b & 0x7F) as i32) << shift;
            if b & 0x80 == 0 {
                break;
            }
            shift += 7;
            if shift >= 35 {
                return Err(ProbeError::Protocol("packet length varint too long".into()));
            }
        }
        if length <= 0 || length > MAX_PACKET_LEN {
            return Err(ProbeError::Protocol(format!("invalid packet length {}", length)));
        }

        let mut data = vec![0u8; length as usize];
        stream.read_exact(&mut data).await?;
        let mut offset = 0;
        let packet_id = read_varint(&data, &mut offset)?;
        debug!(
            "Received packetId 0x{:02x} with a length of {}",
            packet_id, length
        );
        Ok((packet_id, data.split_off(offset)))
    }

    fn stream_mut(&mut self) -> Result<&mut TcpStream, ProbeError> {
        self.stream
            .as_mut()
            .ok_or_else(|| ProbeError::Protocol("stream not initialized".into()))
    }
}

impl SlpClient<Connected> {
    pub async fn get_status(&mut self) -> Result<SlpStatus, ProbeError> {
        self.flush(0x00).await?;
        let (packet_id, data) = self.read_packet().await?;
        if packet_id != 0x00 {
            return Err(ProbeError::Protocol(format!(
                "expected status response, got packet 0x{:02x}",
                packet_id
            )));
        }

        let mut offset = 0;
        let json_length = read_varint(&data, &mut offset)?;
        let json = read_string(&data, json_length, &mut offset)?;
        let payload = serde_json::from_str::<PingPayload>(&json)
            .map_err(|e| ProbeError::Protocol(format!("failed to parse status payload: {}", e)))?;
        let latency = self.get_latency().await?;
        Ok(SlpStatus { payload, latency })
    }

    pub async fn get_latency(&mut self) -> Result<Duration, ProbeError> {
        let send_time = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or_default();
        let started = Instant::now();
        self.write_long(send_time);
        self.flush(0x01).await?;

        let (packet_id, data) = self.read_packet().await?;
        let latency = started.elapsed();
        if packet_id != 0x01 {
            return Err(ProbeError::Protocol(format!(
                "expected pong, got packet 0x{:02x}",
                packet_id
            )));
        }

        let mut offset = 0;
        let echo = read_long(&data, &mut offset)?;
        if echo != send_time {
            warn!("Received echo time is not equal to send time");
        }
        Ok(latency)
    }
}

fn encode_varint(value: i32, out: &mut Vec<u8>) {
    let mut value = value as u32;
    while value >= 0x80 {
        out.push((value as u8) | 0x80);
        value >>= 7;
    }
    out.push(value as u8);
}

fn read_varint(data: &[u8], offset: &mut usize) -> Result<i32, ProbeError> {
    let mut result = 0;
    let mut shift = 0;
    loop {
        let b = *data
            .get(*offset)
            .ok_or_else(|| ProbeError::Protocol("unexpected end of data".into()))?;
        *offset += 1;
        result |= ((b & 0x7F) as i32) << shift;
        if (b & 0x80) == 0 {
            return Ok(result);
        }
        shift += 7;
        if shift >= 35 {
            return Err(ProbeError::Protocol("varint too long".into()));
        }
    }
}

fn read_long(data: &[u8], offset: &mut usize) -> Result<i64, ProbeError> {
    let bytes: [u8; 8] = data
        .get(*offset..*offset + 8)
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| ProbeError::Protocol("not enough data for long".into()))?;
    *offset += 8;
    Ok(i64::from_be_bytes(bytes))
}

fn read_string(data: &[u8], length: i32, offset: &mut usize) -> Result<String, ProbeError> {
    let end = *offset + length.max(0) as usize;
    let bytes = data
        .get(*offset..end)
        .ok_or_else(|| ProbeError::Protocol("not enough data for string".into()))?;
    let text = UTF_8
        .decode(bytes, DecoderTrap::Replace)
        .map_err(|e| ProbeError::Protocol(e.into_owned()))?;
    *offset = end;
    Ok(text)
}
