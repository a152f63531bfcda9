//! Main application entry point (CLI binary).
//!
//! This is a thin wrapper around the `trace_sessions` library that handles:
//! - Command-line argument parsing
//! - Logger initialization
//! - User-facing output formatting
//!
//! All core functionality is implemented in the library crate.

use anyhow::{Context, Result};
use clap::Parser;
use std::process;

use trace_sessions::initialization::init_logger_with;
use trace_sessions::{replay, Opt};

#[tokio::main]
async fn main() -> Result<()> {
    let opt = Opt::parse();
    let (config, session, file) = opt.into_parts();

    init_logger_with(config.log_level.clone().into(), config.log_format.clone())
        .context("Failed to initialize logger")?;

    match replay(config, session, &file).await {
        Ok(report) => {
            let json =
                serde_json::to_string_pretty(&report).context("Failed to serialize session")?;
            println!("{}", json);
            eprintln!(
                "✅ Session '{}' finished: {} hop{} ({} located) in {:.1}s",
                report.session.name,
                report.total_hops,
                if report.total_hops == 1 { "" } else { "s" },
                report.located_hops,
                report.elapsed_seconds
            );
            if let Some(condition) = &report.last_condition {
                eprintln!("⚠️ {}", condition.message());
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("trace_sessions error: {:#}", e);
            process::exit(1);
        }
    }
}
