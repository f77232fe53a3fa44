pub use file::*;
pub use properties::*;

mod file;
mod properties;
