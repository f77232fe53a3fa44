mod probe;
mod query_client;
mod rcon_client;
mod slp_client;

pub use probe::*;
pub use query_client::query_full_stat;
pub use rcon_client::*;
pub use slp_client::{Connected, SlpClient, Unconnected};
