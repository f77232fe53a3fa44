use serde::{Deserialize, Serialize};
use std::fmt;

/// Live status of a supervised server, derived from the process table and
/// the network on every query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerStatus {
    /// No matching process is alive.
    Offline,
    /// A process is alive but not yet answering status pings.
    Starting,
    /// A process has been alive longer than its start window without
    /// answering status pings.
    Anomaly,
    /// A process is alive and answering status pings.
    Online,
}

impl ServerStatus {
    pub fn is_running(&self) -> bool {
        matches!(self, ServerStatus::Starting | ServerStatus::Online)
    }
}

impl fmt::Display for ServerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ServerStatus::Offline => "Offline",
            ServerStatus::Starting => "Starting",
            ServerStatus::Anomaly => "Anomaly",
            ServerStatus::Online => "Online",
        };
        f.write_str(name)
    }
}
