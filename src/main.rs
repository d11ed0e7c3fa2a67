//! Ledgerline CLI - talk to the Ledgerline finance API from a terminal
//!
//! Logs in, keeps credentials on disk, renews them transparently and caches
//! AI insights between runs.

use std::process::ExitCode;
use std::sync::Arc;

use chrono::Utc;
use clap::Parser;
use serde_json::Value;
use tracing::Level;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use ledgerline::cache::{FileCacheStore, LENDING_INSIGHTS, SUBSCRIPTION_INSIGHTS};
use ledgerline::cli::{Cli, Command, StatePaths};
use ledgerline::session::FileCredentialStore;
use ledgerline::{ApiClient, CacheOutcome, Refresh, ResultCache, Session, SystemClock};

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(Level::WARN.into())
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();
}

fn print_json(value: &Value) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = cli.client_config()?;
    let paths = StatePaths::from_cli(&cli)?;

    let session = Session::new(FileCredentialStore::new(paths.credentials));
    let store = Arc::new(FileCacheStore::with_dir(paths.cache_dir));
    let client = ApiClient::builder(config)
        .session(session.clone())
        .local_cache(store.clone())
        .build()?;
    let insights = ResultCache::new(client.clone(), store, Arc::new(SystemClock));

    match cli.command {
        Command::Login { username, password } => {
            client.login(&username, &password).await?;
            println!("Logged in as {}", username);
        }
        Command::Logout => {
            client.logout();
            println!("Logged out");
        }
        Command::Status => {
            let state = if session.is_authenticated() {
                "authenticated"
            } else {
                "not logged in"
            };
            println!("Session: {}", state);
            println!("Quiet hours: {}", if insights.is_quiet_now() { "yes" } else { "no" });
            for endpoint in [LENDING_INSIGHTS, SUBSCRIPTION_INSIGHTS] {
                match insights.peek(endpoint.key) {
                    Some(entry) => {
                        let age = entry.age(Utc::now());
                        let freshness = if entry.is_fresh(Utc::now(), insights.policy().ttl) {
                            "fresh"
                        } else {
                            "expired"
                        };
                        println!(
                            "{}: cached {}h{:02}m ago ({})",
                            endpoint.key,
                            age.num_hours(),
                            age.num_minutes() % 60,
                            freshness
                        );
                    }
                    None => println!("{}: not cached", endpoint.key),
                }
            }
        }
        Command::Get { path } => {
            let value: Value = client.get_json(&path).await?;
            print_json(&value)?;
        }
        Command::Insights { feature, force } => {
            let refresh = if force { Refresh::Forced } else { Refresh::Auto };
            match insights.fetch::<Value>(&feature.endpoint(), refresh).await? {
                CacheOutcome::Fresh(value) | CacheOutcome::Cached(value) => print_json(&value)?,
                CacheOutcome::Skipped => {
                    println!("Insights are paused during quiet hours; use --force to refresh now");
                }
            }
        }
    }

    Ok(())
}
