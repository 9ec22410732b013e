use std::env;
use std::io::IsTerminal;

use secrecy::ExposeSecret;
use sentry::integrations::tracing as sentry_tracing;
use tracing::Level;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{EnvFilter, Layer, prelude::*};

use crate::config::{Config, LogFormat};

/// The full release name including the package version.
pub const RELEASE: &str = concat!("ingest@", env!("CARGO_PKG_VERSION"));

pub fn init_sentry(config: &Config) -> Option<sentry::ClientInitGuard> {
    let config = &config.sentry;
    let dsn = config.dsn.as_ref()?;

    let guard = sentry::init(sentry::ClientOptions {
        dsn: dsn.expose_secret().as_str().parse().ok(),
        release: Some(RELEASE.into()),
        environment: config.environment.clone(),
        server_name: config.server_name.clone(),
        sample_rate: config.sample_rate,
        traces_sample_rate: config.traces_sample_rate,
        debug: config.debug,
        enable_logs: true,
        ..Default::default()
    });

    sentry::configure_scope(|scope| {
        for (key, value) in &config.tags {
            scope.set_tag(key, value);
        }
    });

    Some(guard)
}

pub fn init_tracing(config: &Config) {
    // Same as the default filter, except it converts warnings into events
    // and also sends everything at or above INFO as logs instead of breadcrumbs.
    let sentry_layer = config.sentry.is_enabled().then(|| {
        sentry_tracing::layer().event_filter(|metadata| match *metadata.level() {
            Level::ERROR | Level::WARN => {
                sentry_tracing::EventFilter::Event | sentry_tracing::EventFilter::Log
            }
            Level::INFO => sentry_tracing::EventFilter::Log,
            Level::DEBUG | Level::TRACE => sentry_tracing::EventFilter::Ignore,
        })
    });

    let format = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true);

    let format = match (config.logging.format, std::io::stderr().is_terminal()) {
        (LogFormat::Auto, true) | (LogFormat::Pretty, _) => format.pretty().boxed(),
        (LogFormat::Auto, false) | (LogFormat::Simplified, _) => {
            format.with_ansi(false).compact().boxed()
        }
        (LogFormat::Json, _) => format
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .boxed(),
    };

    let (level, env_filter) = parse_rust_log(config.logging.level);

    tracing_subscriber::registry()
        .with(format.with_filter(level))
        .with(sentry_layer)
        .with(env_filter)
        .init();
}

/// Resolves the effective level and per-crate filter from `RUST_LOG` and the configured level.
pub fn parse_rust_log(configured: LevelFilter) -> (LevelFilter, EnvFilter) {
    // Try to parse RUST_LOG as a simple level filter and apply default levels internally.
    // Otherwise, use it literally if the user knows which overrides they want to run.
    let level = match env::var(EnvFilter::DEFAULT_ENV) {
        Ok(value) => match value.parse::<LevelFilter>() {
            Ok(level) => level,
            Err(_) => return (LevelFilter::TRACE, EnvFilter::new(value)),
        },
        Err(_) => configured,
    };

    // This is the maximum verbosity that will be logged, we filter this down to `level`.
    let env_filter = EnvFilter::new(
        "INFO,\
        tower_http=TRACE,\
        ingest=TRACE,\
        ingest_server=TRACE,\
        ingest_service=TRACE,\
        ",
    );

    (level, env_filter)
}
