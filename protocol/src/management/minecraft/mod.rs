pub mod motd;
pub mod query;
pub mod rcon;
mod slp;

pub use slp::*;
