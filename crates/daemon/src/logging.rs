//! Logging setup
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: filter directives (default: `event_consumer=info,lapin=warn`)
//! - `EVENT_CONSUMER_LOG_FORMAT`: `json` for structured output, anything else is pretty
//! - `EVENT_CONSUMER_LOG_DIR`: also write JSON logs to a daily-rolling file there
//!
//! # Example
//!
//! ```text
//! EVENT_CONSUMER_LOG_FORMAT=json \
//! EVENT_CONSUMER_LOG_DIR=/var/log/event-consumer \
//!     ./event-consumer
//! ```

use anyhow::Result;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_FILTER: &str = "event_consumer=info,lapin=warn";
const LOG_FILE_PREFIX: &str = "event-consumer.log";

/// Install the global subscriber.
///
/// Keep the returned guard alive for the whole process, or buffered file
/// lines are lost on exit.
pub fn init_logging() -> Result<Option<WorkerGuard>> {
    let log_format =
        std::env::var("EVENT_CONSUMER_LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());

    let env_filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(DEFAULT_FILTER))?;

    let (file_writer, guard) = match std::env::var("EVENT_CONSUMER_LOG_DIR") {
        Ok(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(writer), Some(guard))
        }
        Err(_) => (None, None),
    };

    match log_format.as_str() {
        "json" => {
            // Production: JSON structured logging
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json())
                .with(file_writer.map(|w| fmt::layer().json().with_ansi(false).with_writer(w)))
                .try_init()?;
        }
        _ => {
            // Development: Pretty formatting with colors
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().pretty())
                .with(file_writer.map(|w| fmt::layer().json().with_ansi(false).with_writer(w)))
                .try_init()?;
        }
    }

    Ok(guard)
}
