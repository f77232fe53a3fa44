use crate::error::ConfigError;
use crate::storage::ServerProperties;
use log::debug;
use mcsl_protocol::management::instance::{
    ServerConfig, TargetType, DEFAULT_RCON_PORT, DEFAULT_SERVER_PORT,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const SERVER_PROPERTIES: &str = "server.properties";

/// Game port side of the server: target of status pings and queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameEndpoint {
    pub host: String,
    pub port: u16,
    pub query_port: u16,
}

/// Admin side of the server: remote console address and secret.
#[derive(Clone, PartialEq, Eq)]
pub struct ConsoleEndpoint {
    pub host: String,
    pub port: u16,
    pub password: String,
}

impl ConsoleEndpoint {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// keep the secret out of debug logs
impl std::fmt::Debug for ConsoleEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsoleEndpoint")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("password", &"***")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchCommand {
    pub program: String,
    pub args: Vec<String>,
    pub target_type: TargetType,
    /// File that has to exist for the launch to make sense.
    pub target: PathBuf,
}

/// Fully resolved configuration of the supervised server.
///
/// Immutable once built; the working directory is canonicalized so it can be
/// compared with the cwd of discovered processes.
#[derive(Debug, Clone)]
pub struct ServerInstance {
    pub name: String,
    pub working_directory: PathBuf,
    pub process_name: String,
    pub launch_command: LaunchCommand,
    pub game: GameEndpoint,
    pub console: ConsoleEndpoint,
    pub max_start_duration: Duration,
    pub connection_timeout: Duration,
}

impl ServerInstance {
    pub fn from_config(config: ServerConfig) -> Result<Self, ConfigError> {
        let working_directory = fs::canonicalize(&config.working_directory)
            .ok()
            .filter(|p| p.is_dir())
            .ok_or_else(|| ConfigError::WorkingDirectory(config.working_directory.clone()))?;
        if config.target.trim().is_empty() {
            return Err(ConfigError::MissingField("target"));
        }

        let launch_command = launch_command(&config, &working_directory);
        let instance = Self {
            name: config.name.clone(),
            process_name: config.process_name.clone(),
            launch_command,
            game: GameEndpoint {
                host: config.server_ip.clone(),
                port: config.server_port,
                query_port: config.effective_query_port(),
            },
            console: ConsoleEndpoint {
                host: config.server_ip.clone(),
                port: config.rcon_port,
                password: config.rcon_password.clone(),
            },
            max_start_duration: Duration::from_secs(config.max_start_secs),
            connection_timeout: Duration::from_secs(config.connection_timeout_secs),
            working_directory,
        };
        debug!("server instance resolved: {:?}", instance);
        Ok(instance)
    }

    /// Resolves `config` after replacing its address, ports and console
    /// secret with the values of `<working_directory>/server.properties`.
    ///
    /// Fails when the properties file disables the remote console, since the
    /// supervisor could then never stop the server gracefully.
    pub fn from_server_properties(mut config: ServerConfig) -> Result<Self, ConfigError> {
        let path = config.working_directory.join(SERVER_PROPERTIES);
        let properties = ServerProperties::load(&path)?;
        if !properties.get_bool("enable-rcon")? {
            return Err(ConfigError::RemoteConsoleDisabled(path));
        }

        if let Some(ip) = properties.get("server-ip").filter(|ip| !ip.trim().is_empty()) {
            config.server_ip = ip.trim().to_owned();
        }
        config.server_port = properties
            .get_port("server-port")?
            .unwrap_or(DEFAULT_SERVER_PORT);
        config.query_port = properties.get_port("query.port")?;
        config.rcon_port = properties.get_port("rcon.port")?.unwrap_or(DEFAULT_RCON_PORT);
        config.rcon_password = properties.get("rcon.password").unwrap_or_default().to_owned();

        Self::from_config(config)
    }
}

fn launch_command(config: &ServerConfig, working_directory: &Path) -> LaunchCommand {
    let target = working_directory.join(&config.target);
    match config.target_type {
        TargetType::Jar => {
            let mut args = vec![];
            args.extend_from_slice(config.arguments.as_slice());
            args.push("-jar".into());
            args.push(config.target.clone());
            args.push("nogui".into());
            LaunchCommand {
                program: config.java_path.clone(),
                args,
                target_type: TargetType::Jar,
                target,
            }
        }
        target_type @ (TargetType::Script | TargetType::Executable) => LaunchCommand {
            program: target.to_string_lossy().to_string(),
            args: config.arguments.clone(),
            target_type,
            target,
        },
    }
}

pub struct ServerConfigBuilder {
    name: Option<String>,
    working_directory: Option<PathBuf>,
    target: Option<String>,
    target_type: Option<TargetType>,
    java_path: Option<String>,
    arguments: Option<Vec<String>>,
    process_name: Option<String>,
    server_ip: Option<String>,
    server_port: Option<u16>,
    query_port: Option<u16>,
    rcon_port: Option<u16>,
    rcon_password: Option<String>,
    max_start_secs: Option<u64>,
    connection_timeout_secs: Option<u64>,
}

#[allow(dead_code)]
impl ServerConfigBuilder {
    pub fn new() -> Self {
        Self {
            name: None,
            working_directory: None,
            target: None,
            target_type: None,
            java_path: None,
            arguments: None,
            process_name: None,
            server_ip: None,
            server_port: None,
            query_port: None,
            rcon_port: None,
            rcon_password: None,
            max_start_secs: None,
            connection_timeout_secs: None,
        }
    }

    pub fn name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn working_directory<P: Into<PathBuf>>(mut self, working_directory: P) -> Self {
        self.working_directory = Some(working_directory.into());
        self
    }

    pub fn target<S: Into<String>>(mut self, target: S) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn target_type(mut self, target_type: TargetType) -> Self {
        self.target_type = Some(target_type);
        self
    }

    pub fn java_path<S: Into<String>>(mut self, java_path: S) -> Self {
        self.java_path = Some(java_path.into());
        self
    }

    pub fn arguments(mut self, arguments: Vec<String>) -> Self {
        self.arguments = Some(arguments);
        self
    }

    pub fn process_name<S: Into<String>>(mut self, process_name: S) -> Self {
        self.process_name = Some(process_name.into());
        self
    }

    pub fn server_ip<S: Into<String>>(mut self, server_ip: S) -> Self {
        self.server_ip = Some(server_ip.into());
        self
    }

    pub fn server_port(mut self, server_port: u16) -> Self {
        self.server_port = Some(server_port);
        self
    }

    pub fn query_port(mut self, query_port: u16) -> Self {
        self.query_port = Some(query_port);
        self
    }

    pub fn rcon_port(mut self, rcon_port: u16) -> Self {
        self.rcon_port = Some(rcon_port);
        self
    }

    pub fn rcon_password<S: Into<String>>(mut self, rcon_password: S) -> Self {
        self.rcon_password = Some(rcon_password.into());
        self
    }

    pub fn max_start_secs(mut self, max_start_secs: u64) -> Self {
        self.max_start_secs = Some(max_start_secs);
        self
    }

    pub fn connection_timeout_secs(mut self, connection_timeout_secs: u64) -> Self {
        self.connection_timeout_secs = Some(connection_timeout_secs);
        self
    }

    pub fn build(self) -> Result<ServerConfig, ConfigError> {
        let working_directory = self
            .working_directory
            .ok_or(ConfigError::MissingField("working_directory"))?;
        let target = self.target.ok_or(ConfigError::MissingField("target"))?;

        let mut config = ServerConfig::new(working_directory, target);
        if let Some(name) = self.name {
            config.name = name;
        }
        if let Some(target_type) = self.target_type {
            config.target_type = target_type;
        }
        if let Some(java_path) = self.java_path {
            config.java_path = java_path;
        }
        config.arguments = self.arguments.unwrap_or_default();
        if let Some(process_name) = self.process_name {
            config.process_name = process_name;
        }
        if let Some(server_ip) = self.server_ip {
            config.server_ip = server_ip;
        }
        if let Some(server_port) = self.server_port {
            config.server_port = server_port;
        }
        config.query_port = self.query_port;
        if let Some(rcon_port) = self.rcon_port {
            config.rcon_port = rcon_port;
        }
        config.rcon_password = self.rcon_password.unwrap_or_default();
        if let Some(max_start_secs) = self.max_start_secs {
            config.max_start_secs = max_start_secs;
        }
        if let Some(connection_timeout_secs) = self.connection_timeout_secs {
            config.connection_timeout_secs = connection_timeout_secs;
        }
        Ok(config)
    }

    /// Shorthand for `build` followed by [`ServerInstance::from_config`].
    pub fn resolve(self) -> Result<ServerInstance, ConfigError> {
        ServerInstance::from_config(self.build()?)
    }
}

impl Default for ServerConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
