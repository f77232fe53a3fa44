use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Invalid or unusable configuration. Raised while constructing a
/// supervisor, never afterwards.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("working directory {0} does not exist or is not a directory")]
    WorkingDirectory(PathBuf),
    #[error("remote console is not enabled in {0} (enable-rcon=false)")]
    RemoteConsoleDisabled(PathBuf),
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: String, value: String },
    #[error("{0} not set")]
    MissingField(&'static str),
}

/// Failure of a status probe. Never escapes the supervisor, probes that fail
/// simply mean "not network ready".
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("no response within {0:?}")]
    Timeout(Duration),
    #[error("protocol error: {0}")]
    Protocol(String),
}

/// Failure of a remote console round trip.
#[derive(Debug, Error)]
pub enum ConsoleError {
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("authentication rejected by {0}")]
    Auth(String),
    #[error("no response within {0:?}")]
    Timeout(Duration),
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("command is {0} bytes long, the limit is 1446")]
    CommandTooLong(usize),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("start target {0} does not exist")]
    MissingTarget(PathBuf),
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
}
