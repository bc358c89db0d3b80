//! Command line arguments.
//!
//! Priority for every setting: CLI flag > environment variable > config
//! file > built-in default.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Rearm: disarm now, rearm later.
#[derive(Parser, Debug)]
#[command(name = "rearm", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config", global = true)]
    pub config: Option<PathBuf>,

    /// API server port.
    #[arg(short = 'p', long = "port", global = true)]
    pub port: Option<u16>,

    /// Directory for the SQLite database and API token.
    #[arg(short = 'd', long = "data-dir", global = true)]
    pub data_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level", global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run the queue worker and the HTTP API (default).
    Serve,
    /// Store a refresh token for a user.
    Register { user_id: String, token: String },
    /// Issue a four-digit register code for a user.
    Pending { user_id: String },
    /// List users with a credential record.
    Users,
}

impl CliArgs {
    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Serve)
    }

    /// --config > REARM_CONFIG > ~/.rearm/config.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("REARM_CONFIG") {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    /// --port > REARM_PORT > config file > 3040.
    pub fn resolve_port(&self, config_port: u16) -> u16 {
        if let Some(p) = self.port {
            return p;
        }
        if let Some(p) = std::env::var("REARM_PORT")
            .ok()
            .and_then(|v| v.parse::<u16>().ok())
        {
            return p;
        }
        if config_port != 0 {
            return config_port;
        }
        3040
    }

    pub fn resolve_data_dir(&self, config_dir: &str) -> PathBuf {
        match self.data_dir {
            Some(ref p) => p.clone(),
            None => expand_home(config_dir),
        }
    }

    /// Tracing filter directive: `--log-level`, then `RUST_LOG` (passed in as
    /// `env_filter`), then the config file's level.
    pub fn resolve_log_filter(&self, env_filter: Option<&str>, config_level: &str) -> String {
        self.log_level
            .as_deref()
            .or(env_filter.filter(|directive| !directive.trim().is_empty()))
            .unwrap_or(config_level)
            .to_string()
    }
}

fn home_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    let home = std::env::var("USERPROFILE");
    #[cfg(not(target_os = "windows"))]
    let home = std::env::var("HOME");
    home.ok().map(PathBuf::from)
}

/// Expand a leading `~/` to the home directory.
pub fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix("~/").or_else(|| path.strip_prefix("~\\")) {
        Some(rest) => home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(rest),
        None => PathBuf::from(path),
    }
}

fn default_config_path() -> PathBuf {
    match home_dir() {
        Some(home) => home.join(".rearm").join("config.toml"),
        None => PathBuf::from("config.toml"),
    }
}
