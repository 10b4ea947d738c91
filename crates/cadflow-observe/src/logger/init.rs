use time::{UtcOffset, format_description::well_known::Rfc3339};
use tracing::Subscriber;
use tracing_subscriber::{
    EnvFilter, fmt, fmt::time::OffsetTime, layer::SubscriberExt, util::SubscriberInitExt,
};

use super::{config::LoggerConfig, error::LoggerError};

pub(super) fn text(cfg: &LoggerConfig) -> Result<(), LoggerError> {
    let layer = fmt::layer()
        .with_ansi(cfg.use_color)
        .with_target(cfg.with_targets)
        .with_timer(local_timer());

    install(tracing_subscriber::registry().with(filter(&cfg.level)?).with(layer))
}

pub(super) fn json(cfg: &LoggerConfig) -> Result<(), LoggerError> {
    let layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_ansi(false)
        .with_target(cfg.with_targets)
        .with_timer(local_timer());

    install(tracing_subscriber::registry().with(filter(&cfg.level)?).with(layer))
}

#[cfg(all(target_os = "linux", feature = "journald"))]
pub(super) fn journald(cfg: &LoggerConfig) -> Result<(), LoggerError> {
    let layer = tracing_journald::layer()
        .map_err(|e| LoggerError::InitializationFailed(format!("journald: {e}")))?
        .with_syslog_identifier("cadflow".to_string());

    install(tracing_subscriber::registry().with(filter(&cfg.level)?).with(layer))
}

#[cfg(not(all(target_os = "linux", feature = "journald")))]
pub(super) fn journald(_cfg: &LoggerConfig) -> Result<(), LoggerError> {
    Err(LoggerError::JournaldNotSupported)
}

pub(super) fn filter(directives: &str) -> Result<EnvFilter, LoggerError> {
    EnvFilter::try_new(directives).map_err(|e| LoggerError::InvalidLogLevel(format!("{directives}: {e}")))
}

/// RFC 3339 timestamps in the local offset, UTC when the offset cannot be determined.
fn local_timer() -> OffsetTime<Rfc3339> {
    let offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);
    OffsetTime::new(offset, Rfc3339)
}

fn install<S>(subscriber: S) -> Result<(), LoggerError>
where
    S: Subscriber + Send + Sync + 'static,
{
    subscriber
        .try_init()
        .map_err(|e| LoggerError::InitializationFailed(e.to_string()))
}
