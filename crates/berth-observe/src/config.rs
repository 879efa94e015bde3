use std::{fmt, io::IsTerminal, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::LoggerError;

/// Filter directive variable, `RUST_LOG` syntax.
pub const LOG_ENV: &str = "BERTH_LOG";
/// Output format variable: `text`, `json` or `journald`.
pub const LOG_FORMAT_ENV: &str = "BERTH_LOG_FORMAT";

/// Dependencies that are chatty at `debug` and below.
const QUIET_DEPS: &[(&str, &str)] = &[("hyper", "warn"), ("hyper_util", "warn"), ("h2", "warn")];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoggerFormat {
    Text,
    Json,
    #[serde(alias = "journal")]
    Journald,
}

impl LoggerFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoggerFormat::Text => "text",
            LoggerFormat::Json => "json",
            LoggerFormat::Journald => "journald",
        }
    }
}

impl fmt::Display for LoggerFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LoggerFormat {
    type Err = LoggerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(LoggerFormat::Text),
            "json" => Ok(LoggerFormat::Json),
            "journald" | "journal" => {
                if cfg!(all(target_os = "linux", feature = "journald")) {
                    Ok(LoggerFormat::Journald)
                } else {
                    Err(LoggerError::JournaldNotSupported)
                }
            }
            _ => Err(LoggerError::InvalidFormat(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    pub format: LoggerFormat,
    /// `EnvFilter` directives, e.g. `info` or `info,berth.exec=debug`.
    pub level: String,
    pub with_targets: bool,
    pub use_color: bool,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            format: LoggerFormat::Text,
            level: "info".to_string(),
            with_targets: true,
            use_color: std::io::stdout().is_terminal(),
        }
    }
}

impl LoggerConfig {
    /// Defaults overridden by `BERTH_LOG` and `BERTH_LOG_FORMAT`.
    pub fn from_env() -> Result<Self, LoggerError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, LoggerError> {
        let mut cfg = Self::default();
        if let Some(level) = lookup(LOG_ENV).filter(|l| !l.trim().is_empty()) {
            cfg.level = level;
        }
        if let Some(format) = lookup(LOG_FORMAT_ENV) {
            cfg.format = format.parse()?;
        }
        if cfg.format != LoggerFormat::Text {
            cfg.use_color = false;
        }
        Ok(cfg)
    }

    /// Filter directives with quiet defaults for noisy dependencies,
    /// unless the configured level already names them.
    pub fn directives(&self) -> String {
        let mut out = self.level.trim().to_string();
        for (target, level) in QUIET_DEPS {
            let named = out
                .split(',')
                .any(|d| d.trim().split('=').next() == Some(*target));
            if !named {
                out.push_str(&format!(",{target}={level}"));
            }
        }
        out
    }
}
