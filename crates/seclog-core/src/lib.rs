pub mod config;
pub mod error;
pub mod types;

pub use error::{SeclogError, SeclogResult};
pub use types::{
    CacheLimits, ConfigureOptionError, ConfigureOptions, ConfigureResult, LogLevel, LogRecord,
};
