mod launcher;
mod locator;
mod process;
mod process_helper;

pub use launcher::*;
pub use locator::*;
pub use process::*;
pub use process_helper::ProcessHelper;
