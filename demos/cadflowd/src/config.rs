use std::{fs, path::Path};

use anyhow::Context;
use serde::Deserialize;

use cadflow_core::CoreConfig;
use cadflow_observe::LoggerConfig;

/// Daemon configuration file. Every section is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CadflowConfig {
    pub core: CoreConfig,
    pub logger: LoggerConfig,
}

impl CadflowConfig {
    /// Read `path`, or defaults when no path is given.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use cadflow_observe::LoggerFormat;

    use super::*;

    #[test]
    fn nested_sections_override_defaults() {
        let cfg: CadflowConfig = serde_json::from_str(
            r#"{
                "core": {"jobs": {"namespace": "cad-prod"}, "sweeper": {"interval_ms": 1000}},
                "logger": {"format": "json"}
            }"#,
        )
        .unwrap();

        assert_eq!(cfg.core.jobs.namespace, "cad-prod");
        assert_eq!(cfg.core.sweeper.interval_ms, 1_000);
        assert_eq!(cfg.core.lock.max_attempts, 30);
        assert_eq!(cfg.logger.format, LoggerFormat::Json);
    }

    #[test]
    fn missing_path_means_defaults() {
        let cfg = CadflowConfig::load(None).unwrap();
        assert_eq!(cfg.logger.level, "info");
    }
}
