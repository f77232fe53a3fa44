use crate::error::ProbeError;
use log::debug;
use mcsl_protocol::management::minecraft::query::{
    full_stat_request, handshake_request, mask_session_id, parse_full_stat,
    parse_handshake_response, QueryStatus,
};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::net::{lookup_host, UdpSocket};

const MAX_DATAGRAM: usize = 65_535;

/// Runs a handshake + full stat exchange against the query port.
pub async fn query_full_stat(host: &str, port: u16) -> Result<QueryStatus, ProbeError> {
    let addr = lookup_host((host, port))
        .await?
        .next()
        .ok_or_else(|| ProbeError::Protocol(format!("could not resolve {}", host)))?;
    let socket = UdpSocket::bind(if addr.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" }).await?;
    socket.connect(addr).await?;

    let session_id = mask_session_id(
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.subsec_nanos() as i32)
            .unwrap_or(1),
    );
    let mut buffer = vec![0u8; MAX_DATAGRAM];

    socket.send(&handshake_request(session_id)).await?;
    let n = socket.recv(&mut buffer).await?;
    let token = parse_handshake_response(&buffer[..n], session_id)
        .map_err(|e| ProbeError::Protocol(e.to_string()))?;
    debug!("query handshake with {} accepted", addr);

    socket.send(&full_stat_request(session_id, token)).await?;
    let n = socket.recv(&mut buffer).await?;
    parse_full_stat(&buffer[..n], session_id).map_err(|e| ProbeError::Protocol(e.to_string()))
}
