//! Structured logging setup and a closed `Operation` enum for
//! structured log events emitted by the storage engine.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize logging with the default (non-verbose, non-quiet) level.
pub fn init_logging() -> Result<()> {
    init_logging_with_level(false, false)
}

/// Initialize logging with configurable verbosity.
///
/// `quiet` takes precedence over `verbose` and over `RUST_LOG`: it
/// always suppresses everything but errors.
pub fn init_logging_with_level(verbose: bool, quiet: bool) -> Result<()> {
    let filter_level = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("xdbi=debug,info")
    } else {
        EnvFilter::new("xdbi=warn,error")
    };

    let env_filter = if quiet {
        EnvFilter::new("error")
    } else if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::try_from_default_env().unwrap_or(filter_level)
    } else {
        filter_level
    };

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(!quiet)
        .with_thread_ids(!quiet)
        .with_line_number(!quiet)
        .with_file(!quiet)
        .with_ansi(true);

    match tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
    {
        Ok(()) => {
            if !quiet {
                info!("xdbi observability initialized");
            }
            Ok(())
        }
        Err(_) => Ok(()), // already initialized; fine in tests
    }
}

/// Structured log events for the storage engine's operation set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Operation {
    Load { graph: String, uri: String },
    Find { graph: String, classname: String },
    Add { graph: String, count: usize },
    Update { graph: String, count: usize },
    Remove { graph: String, uri: String },
    Clear { graph: String },
    EdgesFrom { graph: String, count: usize },
    EdgesTo { graph: String, count: usize },
    RemoveEdgesTo { graph: String, count: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_filter_strings_parse() {
        assert!(EnvFilter::try_new("xdbi=warn,error").is_ok());
        assert!(EnvFilter::try_new("xdbi=debug,info").is_ok());
        assert!(EnvFilter::try_new("error").is_ok());
    }

    #[test]
    fn operation_debug_formats() {
        let op = Operation::Load {
            graph: "g".into(),
            uri: "u1".into(),
        };
        assert!(format!("{op:?}").contains("Load"));
    }
}
