//! Supervision of a single Minecraft-style game server installation: status
//! derived from the process table and the network, lifecycle control and
//! administrative commands over the remote console.

pub mod config;
pub mod error;
pub mod management;
pub mod storage;

pub use config::{ServerConfigBuilder, ServerInstance};
pub use management::{Collaborators, Outcome, ServerSupervisor};
pub use mcsl_protocol::management::instance::{ServerConfig, ServerStatus, TargetType};
