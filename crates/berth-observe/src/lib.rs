//! Process-level logging bootstrap for berth binaries.

mod config;
pub use config::{LoggerConfig, LoggerFormat};

mod error;
pub use error::LoggerError;

mod init;
pub use init::logger_init;
