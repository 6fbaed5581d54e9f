use anyhow::{Context, Result, anyhow};
use tracing_subscriber::{EnvFilter, fmt};

use crate::settings::Settings;

/// Логи идут в stderr, чтобы не смешиваться с выводом команд.
pub fn init_logging(settings: &Settings) -> Result<()> {
    fmt()
        .with_env_filter(log_filter(&settings.log_level)?)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .try_init()
        .map_err(|e| anyhow!("failed to init logging: {e}"))?;

    Ok(())
}

fn log_filter(directives: &str) -> Result<EnvFilter> {
    EnvFilter::try_new(directives)
        .with_context(|| format!("invalid LOG_LEVEL directives `{directives}`"))
}
