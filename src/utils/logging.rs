use clap::ValueEnum;
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::settings::{LogFormat, LoggingConfig};
use crate::config::sources::ServiceConfig;

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogLevel {
    TRACE,
    DEBUG,
    INFO,
    WARN,
    ERROR,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match *self {
            LogLevel::TRACE => "trace",
            LogLevel::DEBUG => "debug",
            LogLevel::INFO => "info",
            LogLevel::WARN => "warn",
            LogLevel::ERROR => "error",
        }
    }
}

/// Scoped stderr subscriber for startup, before the configured one can be
/// built. Config loading and validation log through it; drop the guard
/// before calling [`run`].
pub fn bootstrap(arg_log_level: Option<LogLevel>) -> DefaultGuard {
    bootstrap_with_writer(arg_log_level, std::io::stderr)
}

pub fn bootstrap_with_writer<W>(arg_log_level: Option<LogLevel>, writer: W) -> DefaultGuard
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let level = arg_log_level.map(|level| level.as_str()).unwrap_or("info");
    let subscriber = tracing_subscriber::registry()
        .with(EnvFilter::new(level))
        .with(fmt::layer().compact().with_writer(writer).with_ansi(false));
    tracing::subscriber::set_default(subscriber)
}

/// CLI level wins over the configured one.
pub fn run(service_config: &ServiceConfig, arg_log_level: Option<LogLevel>) {
    let configured = service_config.settings.logging.clone();
    let format = configured
        .as_ref()
        .map(|config| config.format.clone())
        .unwrap_or_else(LogFormat::from_env);
    let level = arg_log_level
        .map(|level| level.as_str().to_owned())
        .or(configured.map(|config| config.level))
        .unwrap_or_else(|| "info".to_owned());

    init_logging(&LoggingConfig::new(level, format));
}

/// Install the global subscriber. Later calls are no-ops, so tests may call
/// it repeatedly.
pub fn init_logging(logging: &LoggingConfig) {
    let filter = EnvFilter::try_new(&logging.level).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    let installed = match logging.format {
        // one flat JSON object per line, no colors, for log collectors
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_timer(UtcTime::rfc_3339())
                    .flatten_event(true)
                    .with_ansi(false),
            )
            .try_init(),
        LogFormat::Compact => registry
            .with(fmt::layer().compact().with_timer(UtcTime::rfc_3339()).with_ansi(true))
            .try_init(),
    };

    if installed.is_ok() {
        tracing::debug!("logging initialised at '{}'", logging.level);
    }
}
