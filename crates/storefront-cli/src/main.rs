//! Storefront CLI - sign in to the storefront backend and call its API with
//! a persistent, automatically refreshed session.

mod commands;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use storefront_core::auth::StorageKind;
use storefront_core::{Config, Navigator, SessionStore};

#[derive(Parser, Debug)]
#[command(name = "storefront", version, about = "Storefront API client with persistent sessions")]
struct Cli {
    /// Backend base URL (overrides config and STOREFRONT_API_URL)
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Where the session is kept: file, keyring or memory
    #[arg(long, global = true)]
    storage: Option<StorageKind>,

    /// Also write logs to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sign in with email and password
    Login {
        #[arg(long)]
        email: Option<String>,
    },
    /// Create an account and sign in
    Register {
        #[arg(long)]
        email: String,
        #[arg(long)]
        firstname: String,
        #[arg(long)]
        lastname: String,
    },
    /// End the session here and on the server
    Logout,
    /// Show the local session state
    Status,
    /// Fetch the current profile from the server
    Whoami,
    /// Mint a new access token now
    Refresh,
    /// Fetch one or more API paths, e.g. `storefront get /api/cart /api/orders`
    Get {
        #[arg(required = true)]
        paths: Vec<String>,
    },
    /// Send authenticated requests, e.g. `storefront request GET /api/cart`
    Request {
        method: String,
        #[arg(required = true)]
        paths: Vec<String>,
        /// JSON body sent with every request
        #[arg(long)]
        data: Option<String>,
    },
    /// Print session events until the session ends
    Watch,
}

/// Terminal stand-in for browser navigation
struct TerminalNavigator;

impl Navigator for TerminalNavigator {
    fn navigate(&self, location: &str) {
        eprintln!("-> {} (run `storefront login` to sign in)", location);
    }
}

/// Initialize the tracing subscriber for logging
fn init_tracing(log_file: Option<&PathBuf>) -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("."));
            let name = path
                .file_name()
                .map(|n| n.to_os_string())
                .unwrap_or_else(|| "storefront.log".into());
            let appender = tracing_appender::rolling::never(dir, name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_ansi(false).with_writer(writer)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

fn load_config(cli: &Cli) -> Config {
    let mut config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            warn!(error = %e, "Failed to load config, using defaults");
            Config::default()
        }
    };
    config.apply_env_overrides();
    if let Some(ref url) = cli.api_url {
        config.api_base_url = url.clone();
    }
    if let Some(kind) = cli.storage {
        config.storage = kind;
    }
    config
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let _log_guard = init_tracing(cli.log_file.as_ref());
    info!("Storefront CLI starting");

    let mut config = load_config(&cli);
    let session = SessionStore::from_config(&config, Arc::new(TerminalNavigator))?;

    match cli.command {
        Command::Login { email } => commands::login(&session, &mut config, email).await,
        Command::Register {
            email,
            firstname,
            lastname,
        } => commands::register(&session, &mut config, email, firstname, lastname).await,
        Command::Logout => commands::logout(&session).await,
        Command::Status => commands::status(&session, &config),
        Command::Whoami => commands::whoami(&session).await,
        Command::Refresh => commands::refresh(&session).await,
        Command::Get { paths } => commands::request(&session, "GET", &paths, None).await,
        Command::Request {
            method,
            paths,
            data,
        } => commands::request(&session, &method, &paths, data.as_deref()).await,
        Command::Watch => commands::watch(&session).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_get_with_multiple_paths() {
        let cli = Cli::try_parse_from(["storefront", "get", "/api/cart", "/api/orders"]).unwrap();
        match cli.command {
            Command::Get { paths } => assert_eq!(paths, vec!["/api/cart", "/api/orders"]),
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_get_requires_a_path() {
        assert!(Cli::try_parse_from(["storefront", "get"]).is_err());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "storefront",
            "status",
            "--storage",
            "memory",
            "--api-url",
            "http://shop.test",
        ])
        .unwrap();
        assert_eq!(cli.storage, Some(StorageKind::Memory));
        assert_eq!(cli.api_url.as_deref(), Some("http://shop.test"));
    }

    #[test]
    fn test_unknown_storage_rejected() {
        assert!(Cli::try_parse_from(["storefront", "status", "--storage", "cloud"]).is_err());
    }

    #[test]
    fn test_request_with_body() {
        let cli = Cli::try_parse_from([
            "storefront",
            "request",
            "post",
            "/api/cart",
            "--data",
            r#"{"product_id":1}"#,
        ])
        .unwrap();
        match cli.command {
            Command::Request { method, paths, data } => {
                assert_eq!(method, "post");
                assert_eq!(paths, vec!["/api/cart"]);
                assert!(data.is_some());
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
