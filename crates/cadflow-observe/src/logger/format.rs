use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::LoggerError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoggerFormat {
    #[default]
    Text,
    Json,
    #[serde(alias = "journal")]
    Journald,
}

impl FromStr for LoggerFormat {
    type Err = LoggerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(LoggerFormat::Text),
            "json" => Ok(LoggerFormat::Json),
            "journald" | "journal" => Ok(LoggerFormat::Journald),
            _ => Err(LoggerError::InvalidFormat(s.to_string())),
        }
    }
}
