use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetType {
    /// Target is a Java jar, run through `java_path -jar`.
    Jar,

    /// Target is a start script (bat, sh, ...).
    Script,

    /// Target is a native executable.
    Executable,
}

/// On-disk description of the server to supervise.
///
/// Every field except `working_directory` and `target` has a default, so a
/// minimal config file only names the server directory and what to launch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_name")]
    pub name: String,
    pub working_directory: PathBuf,
    pub target: String,
    #[serde(default = "default_target_type")]
    pub target_type: TargetType,

    #[serde(default = "default_java_path")]
    pub java_path: String,
    #[serde(default)]
    pub arguments: Vec<String>,
    /// Executable name fragment identifying server processes.
    #[serde(default = "default_process_name")]
    pub process_name: String,

    #[serde(default = "default_server_ip")]
    pub server_ip: String,
    #[serde(default = "default_server_port")]
    pub server_port: u16,
    /// Falls back to `server_port`, as the server itself does.
    #[serde(default)]
    pub query_port: Option<u16>,
    #[serde(default = "default_rcon_port")]
    pub rcon_port: u16,
    #[serde(default)]
    pub rcon_password: String,

    #[serde(default = "default_max_start_secs")]
    pub max_start_secs: u64,
    #[serde(default = "default_connection_timeout_secs")]
    pub connection_timeout_secs: u64,
}

impl ServerConfig {
    pub fn new(working_directory: impl Into<PathBuf>, target: impl Into<String>) -> Self {
        Self {
            name: default_name(),
            working_directory: working_directory.into(),
            target: target.into(),
            target_type: default_target_type(),
            java_path: default_java_path(),
            arguments: vec![],
            process_name: default_process_name(),
            server_ip: default_server_ip(),
            server_port: default_server_port(),
            query_port: None,
            rcon_port: default_rcon_port(),
            rcon_password: String::new(),
            max_start_secs: default_max_start_secs(),
            connection_timeout_secs: default_connection_timeout_secs(),
        }
    }

    pub fn effective_query_port(&self) -> u16 {
        self.query_port.unwrap_or(self.server_port)
    }
}

pub const DEFAULT_SERVER_PORT: u16 = 25565;
pub const DEFAULT_RCON_PORT: u16 = 25575;

fn default_name() -> String {
    "Java Server".to_owned()
}

fn default_target_type() -> TargetType {
    TargetType::Jar
}

fn default_java_path() -> String {
    "java".to_owned()
}

fn default_process_name() -> String {
    "java".to_owned()
}

fn default_server_ip() -> String {
    "127.0.0.1".to_owned()
}

fn default_server_port() -> u16 {
    DEFAULT_SERVER_PORT
}

fn default_rcon_port() -> u16 {
    DEFAULT_RCON_PORT
}

fn default_max_start_secs() -> u64 {
    180
}

fn default_connection_timeout_secs() -> u64 {
    5
}
