use super::query_client::query_full_stat;
use super::slp_client::SlpClient;
use crate::config::GameEndpoint;
use crate::error::ProbeError;
use async_trait::async_trait;
use mcsl_protocol::management::minecraft::query::QueryStatus;
use std::time::Duration;

/// Network readiness check of the game port. Succeeds only once the server
/// has finished booting.
#[async_trait]
pub trait StatusProbe: Send + Sync {
    /// Round trip latency of a status ping.
    async fn ping(&self, endpoint: &GameEndpoint, timeout: Duration) -> Result<Duration, ProbeError>;

    /// Server information including the names of online players.
    async fn query(
        &self,
        endpoint: &GameEndpoint,
        timeout: Duration,
    ) -> Result<QueryStatus, ProbeError>;
}

/// Server List Ping for `ping`, the UDP query protocol for `query`.
#[derive(Debug, Default, Clone, Copy)]
pub struct MinecraftProbe;

#[async_trait]
impl StatusProbe for MinecraftProbe {
    async fn ping(&self, endpoint: &GameEndpoint, timeout: Duration) -> Result<Duration, ProbeError> {
        let exchange = async {
            let mut client = SlpClient::new()
                .handshake(&endpoint.host, endpoint.port)
                .await?;
            client.get_status().await
        };
        let status = tokio::time::timeout(timeout, exchange)
            .await
            .map_err(|_| ProbeError::Timeout(timeout))??;
        Ok(status.latency)
    }

    async fn query(
        &self,
        endpoint: &GameEndpoint,
        timeout: Duration,
    ) -> Result<QueryStatus, ProbeError> {
        tokio::time::timeout(timeout, query_full_stat(&endpoint.host, endpoint.query_port))
            .await
            .map_err(|_| ProbeError::Timeout(timeout))?
    }
}
