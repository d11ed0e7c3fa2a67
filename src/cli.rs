//! Command-line interface parsing for the Ledgerline client
//!
//! Handles parsing of CLI arguments using clap and resolves where credentials
//! and cached results are kept on disk.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use directories::ProjectDirs;
use thiserror::Error;

use crate::cache::{CacheableEndpoint, LENDING_INSIGHTS, SUBSCRIPTION_INSIGHTS};
use crate::config::{ClientConfig, DEFAULT_BASE_URL};

/// Error types for CLI argument handling
#[derive(Debug, Error)]
pub enum CliError {
    /// The API URL is not an http(s) URL
    #[error("Invalid API URL: '{0}'. Expected an http:// or https:// URL")]
    InvalidApiUrl(String),

    /// No state directory was given and none could be derived from the home directory
    #[error("Could not determine a state directory; pass --state-dir")]
    NoStateDirectory,
}

/// Ledgerline - authenticated access to your personal finance backend
#[derive(Parser, Debug)]
#[command(name = "ledgerline")]
#[command(about = "Authenticated client for the Ledgerline finance API")]
#[command(version)]
pub struct Cli {
    /// Base URL of the backend API
    #[arg(long, env = "LEDGERLINE_API_URL", default_value = DEFAULT_BASE_URL, global = true)]
    pub api_url: String,

    /// Directory for stored credentials and cached results
    #[arg(long, env = "LEDGERLINE_STATE_DIR", value_name = "DIR", global = true)]
    pub state_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Log in and store the issued credentials
    Login {
        #[arg(long)]
        username: String,
        #[arg(long, env = "LEDGERLINE_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Forget stored credentials and cached results
    Logout,
    /// Show session and cache state
    Status,
    /// Fetch an API path and print the JSON response
    Get {
        /// Path relative to the API URL, e.g. /lending/transactions/
        path: String,
    },
    /// Show AI-generated insights, served from cache when recent
    Insights {
        #[arg(value_enum)]
        feature: InsightFeature,
        /// Bypass the cache and quiet hours
        #[arg(long)]
        force: bool,
    },
}

/// Features with cached insights
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsightFeature {
    Lending,
    Subscriptions,
}

impl InsightFeature {
    pub fn endpoint(&self) -> CacheableEndpoint {
        match self {
            InsightFeature::Lending => LENDING_INSIGHTS,
            InsightFeature::Subscriptions => SUBSCRIPTION_INSIGHTS,
        }
    }
}

/// Filesystem locations derived from CLI arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatePaths {
    pub credentials: PathBuf,
    pub cache_dir: PathBuf,
}

impl StatePaths {
    /// Uses `--state-dir` when given, otherwise the XDG data and cache directories
    pub fn from_cli(cli: &Cli) -> Result<Self, CliError> {
        if let Some(dir) = &cli.state_dir {
            return Ok(Self {
                credentials: dir.join("credentials.json"),
                cache_dir: dir.join("cache"),
            });
        }
        let project_dirs =
            ProjectDirs::from("", "", "ledgerline").ok_or(CliError::NoStateDirectory)?;
        Ok(Self {
            credentials: project_dirs.data_dir().join("credentials.json"),
            cache_dir: project_dirs.cache_dir().to_path_buf(),
        })
    }
}

/// Validates an API URL argument
pub fn parse_api_url(s: &str) -> Result<String, CliError> {
    let trimmed = s.trim();
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        Ok(trimmed.to_string())
    } else {
        Err(CliError::InvalidApiUrl(s.to_string()))
    }
}

impl Cli {
    /// Client configuration for these arguments
    pub fn client_config(&self) -> Result<ClientConfig, CliError> {
        Ok(ClientConfig::new(parse_api_url(&self.api_url)?))
    }
}
