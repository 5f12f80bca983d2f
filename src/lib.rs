#![deny(warnings, rust_2018_idioms)]

pub mod app;
pub mod buffer;
pub mod dispatch;
pub mod encoder;
pub mod forwarder;
pub mod record;
pub mod scrub;

// Re-export main types for easy access
pub use app::{Config, ConfigError};
pub use forwarder::{Forwarder, ForwarderError};
pub use record::{FieldValue, LogRecord};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
