use crate::config::ConsoleEndpoint;
use crate::error::ConsoleError;
use async_trait::async_trait;
use log::debug;
use mcsl_protocol::management::minecraft::motd::strip_codes;
use mcsl_protocol::management::minecraft::rcon::{
    payload_length, RconPacket, AUTH_FAILED_ID, MAX_COMMAND_LEN, MAX_RESPONSE_BODY,
    TYPE_AUTH_RESPONSE, TYPE_COMMAND, TYPE_LOGIN, TYPE_RESPONSE,
};
use std::future::Future;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// How long to wait for a continuation after a full-sized response body.
/// A body of exactly the maximum size may also be a complete answer.
const FRAGMENT_WAIT: Duration = Duration::from_millis(250);

/// Opens authenticated admin sessions to the server.
#[async_trait]
pub trait RemoteConsole: Send + Sync {
    async fn open(
        &self,
        endpoint: &ConsoleEndpoint,
        timeout: Duration,
    ) -> Result<Box<dyn ConsoleSession>, ConsoleError>;
}

#[async_trait]
pub trait ConsoleSession: Send {
    /// Runs one command and returns its textual output.
    async fn send(&mut self, command: &str) -> Result<String, ConsoleError>;

    async fn close(&mut self) -> Result<(), ConsoleError>;
}

/// Remote console over the Source RCON protocol.
#[derive(Debug, Default, Clone, Copy)]
pub struct McRcon;

#[async_trait]
impl RemoteConsole for McRcon {
    async fn open(
        &self,
        endpoint: &ConsoleEndpoint,
        timeout: Duration,
    ) -> Result<Box<dyn ConsoleSession>, ConsoleError> {
        let session = RconSession::connect(endpoint, timeout).await?;
        Ok(Box::new(session))
    }
}

pub struct RconSession {
    stream: TcpStream,
    addr: String,
    timeout: Duration,
    last_id: i32,
}

impl RconSession {
    pub async fn connect(endpoint: &ConsoleEndpoint, timeout: Duration) -> Result<Self, ConsoleError> {
        let addr = endpoint.addr();
        let stream = with_timeout(timeout, TcpStream::connect((endpoint.host.as_str(), endpoint.port)))
            .await?
            .map_err(|source| ConsoleError::Connect {
                addr: addr.clone(),
                source,
            })?;
        let mut session = Self {
            stream,
            addr,
            timeout,
            last_id: 0,
        };
        session.login(&endpoint.password).await?;
        debug!("rcon session to {} authenticated", session.addr);
        Ok(session)
    }

    async fn login(&mut self, password: &str) -> Result<(), ConsoleError> {
        let id = self.next_id();
        self.write_packet(&RconPacket::new(id, TYPE_LOGIN, password))
            .await?;
        loop {
            let reply = self.read_packet().await?;
            if reply.request_id == AUTH_FAILED_ID {
                return Err(ConsoleError::Auth(self.addr.clone()));
            }
            match reply.kind {
                TYPE_AUTH_RESPONSE if reply.request_id == id => return Ok(()),
                // some servers send an empty response value ahead of the auth response
                TYPE_RESPONSE => continue,
                kind => {
                    return Err(ConsoleError::Protocol(format!(
                        "unexpected packet type {} (id {}) during login",
                        kind, reply.request_id
                    )))
                }
            }
        }
    }

    fn next_id(&mut self) -> i32 {
        self.last_id = self.last_id.wrapping_add(1).max(1);
        self.last_id
    }

    async fn write_packet(&mut self, packet: &RconPacket) -> Result<(), ConsoleError> {
        let data = packet.encode();
        with_timeout(self.timeout, self.stream.write_all(&data)).await??;
        Ok(())
    }

    async fn read_packet(&mut self) -> Result<RconPacket, ConsoleError> {
        self.read_packet_within(self.timeout).await
    }

    async fn read_packet_within(&mut self, timeout: Duration) -> Result<RconPacket, ConsoleError> {
        let stream = &mut self.stream;
        let payload = with_timeout(timeout, async {
            let mut prefix = [0u8; 4];
            stream.read_exact(&mut prefix).await?;
            let length = payload_length(prefix)
                .map_err(|e| ConsoleError::Protocol(e.to_string()))?;
            let mut payload = vec![0u8; length];
            stream.read_exact(&mut payload).await?;
            Ok::<_, ConsoleError>(payload)
        })
        .await??;
        RconPacket::decode_payload(&payload).map_err(|e| ConsoleError::Protocol(e.to_string()))
    }
}

#[async_trait]
impl ConsoleSession for RconSession {
    async fn send(&mut self, command: &str) -> Result<String, ConsoleError> {
        if command.len() > MAX_COMMAND_LEN {
            return Err(ConsoleError::CommandTooLong(command.len()));
        }
        let id = self.next_id();
        self.write_packet(&RconPacket::new(id, TYPE_COMMAND, command))
            .await?;

        let mut body = vec![];
        let mut reply = self.read_packet().await?;
        loop {
            if reply.request_id != id {
                return Err(ConsoleError::Protocol(format!(
                    "response id {} does not match request id {}",
                    reply.request_id, id
                )));
            }
            let fragmented = reply.body.len() == MAX_RESPONSE_BODY;
            body.extend_from_slice(&reply.body);
            if !fragmented {
                break;
            }
            reply = match self.read_packet_within(FRAGMENT_WAIT).await {
                Ok(next) => next,
                Err(ConsoleError::Timeout(_)) => break,
                Err(err) => return Err(err),
            };
        }
        Ok(strip_codes(&String::from_utf8_lossy(&body)))
    }

    async fn close(&mut self) -> Result<(), ConsoleError> {
        self.stream.shutdown().await?;
        Ok(())
    }
}

async fn with_timeout<F: Future>(timeout: Duration, future: F) -> Result<F::Output, ConsoleError> {
    tokio::time::timeout(timeout, future)
        .await
        .map_err(|_| ConsoleError::Timeout(timeout))
}
