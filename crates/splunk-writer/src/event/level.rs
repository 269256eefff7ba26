use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("unknown log level: {0}")]
pub struct LevelParseError(pub String);

/// Syslog-ordered severity. Lower is more severe, so a record passes a
/// minimum level when `record.level <= minimum`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
#[serde(try_from = "String")]
pub enum Level {
    Fatal,
    Alert,
    Critical,
    Error,
    Warning,
    Notice,
    Informational,
    Debug,
    Verbose,
}

impl Level {
    /// Severity name as shown in Splunk.
    pub fn severity(self) -> &'static str {
        match self {
            Level::Debug => "Debug",
            Level::Informational => "Information",
            Level::Notice | Level::Warning => "Warning",
            Level::Critical | Level::Error => "Error",
            Level::Alert | Level::Fatal => "Fatal",
            Level::Verbose => "Verbose",
        }
    }
}

impl FromStr for Level {
    type Err = LevelParseError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "fatal" | "emergency" => Ok(Level::Fatal),
            "alert" => Ok(Level::Alert),
            "critical" => Ok(Level::Critical),
            "error" => Ok(Level::Error),
            "warning" | "warn" => Ok(Level::Warning),
            "notice" => Ok(Level::Notice),
            "informational" | "information" | "info" => Ok(Level::Informational),
            "debug" => Ok(Level::Debug),
            "verbose" => Ok(Level::Verbose),
            _ => Err(LevelParseError(raw.to_owned())),
        }
    }
}

impl TryFrom<String> for Level {
    type Error = LevelParseError;

    fn try_from(raw: String) -> Result<Self, LevelParseError> {
        raw.parse()
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Level::Fatal => "fatal",
            Level::Alert => "alert",
            Level::Critical => "critical",
            Level::Error => "error",
            Level::Warning => "warning",
            Level::Notice => "notice",
            Level::Informational => "informational",
            Level::Debug => "debug",
            Level::Verbose => "verbose",
        };
        f.write_str(name)
    }
}
