mod config;
mod error;
mod format;
mod init;

pub use config::LoggerConfig;
pub use error::LoggerError;
pub use format::LoggerFormat;

/// Install the global subscriber described by `cfg`. Fails if one is already set.
pub fn logger_init(cfg: &LoggerConfig) -> Result<(), LoggerError> {
    if tracing::dispatcher::has_been_set() {
        return Err(LoggerError::AlreadyInitialized);
    }
    match cfg.format {
        LoggerFormat::Text => init::text(cfg),
        LoggerFormat::Json => init::json(cfg),
        LoggerFormat::Journald => init::journald(cfg),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_init_is_rejected() {
        let cfg = LoggerConfig {
            level: "warn".into(),
            ..LoggerConfig::default()
        };
        let _ = logger_init(&cfg);
        assert!(matches!(
            logger_init(&cfg),
            Err(LoggerError::AlreadyInitialized)
        ));
    }
}
