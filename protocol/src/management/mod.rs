pub mod instance;
pub mod minecraft;
