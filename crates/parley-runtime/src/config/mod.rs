//! Configuration module for the Parley runtime.
//!
//! TOML- and environment-based configuration for logging, lock tuning,
//! listener limits, and the HTTP front end.

pub mod error;
pub mod loader;
pub mod schema;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, load_config, load_config_from_file};
pub use schema::{
    HttpSettings, ListenerSettings, LockSettings, LogFormat, LoggingConfig, ParleyConfig,
};
