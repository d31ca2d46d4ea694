//! Process configuration.
//!
//! Every flag can also come from the environment so the host application can
//! spawn the sidecar without building a command line.

use crate::db::SchemaMode;
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub const DEFAULT_INSTITUTION: &str = "AVSEC Institute of Technology";

/// Filter used when `NODUESD_LOG` is unset.
const DEFAULT_LOG_FILTER: &str = "noduesd=info";

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "No-due certificate sidecar speaking JSON lines on stdio", long_about = None)]
pub struct Config {
    /// Workspace to open on startup instead of waiting for `workspace.select`.
    #[arg(long, env = "NODUESD_WORKSPACE")]
    pub workspace: Option<PathBuf>,

    /// Whether opening a workspace may add missing columns.
    #[arg(long, env = "NODUESD_SCHEMA_MODE", value_enum, default_value_t = SchemaMode::Migrate)]
    pub schema_mode: SchemaMode,

    /// Institution name printed in the certificate header.
    #[arg(long, env = "NODUESD_INSTITUTION", default_value = DEFAULT_INSTITUTION)]
    pub institution: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workspace: None,
            schema_mode: SchemaMode::Migrate,
            institution: DEFAULT_INSTITUTION.to_string(),
        }
    }
}

/// Logs go to stderr; stdout carries responses.
pub fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_env("NODUESD_LOG")
        .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
