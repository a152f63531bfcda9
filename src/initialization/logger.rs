//! Logger initialization.

use std::io::Write;

use chrono::{SecondsFormat, Utc};
use colored::*;
use log::{Level, LevelFilter};

use crate::config::LogFormat;
use crate::error_handling::InitializationError;

/// Initializes the logger with the specified level and format.
///
/// `RUST_LOG` is read first; `level` then overrides it for this crate, so
/// `RUST_LOG=trace_sessions::session=trace` still narrows what gets printed.
/// HTTP stack chatter is capped at `info`.
///
/// Plain output is colored and prefixed with a millisecond wall-clock time,
/// which makes the interleaving of lookups and commits readable. JSON output
/// writes one object per line with an RFC 3339 timestamp.
///
/// # Errors
///
/// Returns `InitializationError::LoggerError` if a global logger is already
/// installed.
///
/// # Examples
///
/// ```bash
/// RUST_LOG=debug trace_sessions hops.jsonl --dest-ip 8.8.8.8
/// trace_sessions hops.jsonl --dest-ip 8.8.8.8 --log-level trace --log-format json
/// ```
pub fn init_logger_with(level: LevelFilter, format: LogFormat) -> Result<(), InitializationError> {
    colored::control::set_override(true);

    let mut builder = env_logger::Builder::from_default_env();
    builder.filter_level(level);
    for noisy in ["reqwest", "hyper", "hyper_util"] {
        builder.filter_module(noisy, LevelFilter::Info.min(level));
    }
    builder.filter_module("trace_sessions", level);

    match format {
        LogFormat::Json => {
            builder.format(|buf, record| {
                let line = serde_json::json!({
                    "ts": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
                    "level": record.level().as_str(),
                    "target": record.target(),
                    "msg": record.args().to_string(),
                });
                writeln!(buf, "{}", line)
            });
        }
        LogFormat::Plain => {
            builder.format(|buf, record| {
                let level = record.level();
                let label = format!("{:<5}", level);
                let label = match level {
                    Level::Error => label.red().bold(),
                    Level::Warn => label.yellow(),
                    Level::Info => label.green(),
                    Level::Debug => label.blue(),
                    Level::Trace => label.purple(),
                };
                let marker = match level {
                    Level::Error => "❌",
                    Level::Warn => "⚠️",
                    _ => " ",
                };

                writeln!(
                    buf,
                    "{} {} {} [{}] {}",
                    Utc::now().format("%H:%M:%S%.3f").to_string().dimmed(),
                    marker,
                    label,
                    record.target().cyan(),
                    record.args()
                )
            });
        }
    }

    builder.try_init()?;
    Ok(())
}
