pub mod config;
pub mod error;
pub mod secrets;

pub use config::AppConfig;
pub use error::{ClipError, Result};
