mod config;
mod status;

pub use config::*;
pub use status::*;
