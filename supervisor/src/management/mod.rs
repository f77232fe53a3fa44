pub mod comm;
pub mod minecraft;
mod status;
mod supervisor;
#[cfg(test)]
pub(crate) mod testing;
pub mod watchdog;

pub use status::reconcile;
pub use supervisor::*;
