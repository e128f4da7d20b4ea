//! authkeeper - a command-line client for a token-authenticated auth API.
//!
//! Logs in, inspects and refreshes the stored session, and issues
//! authenticated requests that transparently recover from an expired
//! access token.

use std::io;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use authkeeper_core::api::{api_error_message, LoginBasicPayload};
use authkeeper_core::auth::decode_claims;
use authkeeper_core::{is_token_valid, ApiError, ApiRequest, AuthClient, AuthConfig, TokenStore};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Environment variable read before prompting for a password
const PASSWORD_ENV: &str = "AUTHKEEPER_PASSWORD";

/// Log file name prefix inside `--log-dir`
const LOG_FILE_PREFIX: &str = "authkeeper.log";

#[derive(Parser)]
#[command(name = "authkeeper", version, about = "Token-authenticated API client")]
struct Cli {
    /// Also write logs to a daily rolling file in this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    /// Override the configured API base URL
    #[arg(long, global = true)]
    api_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Log in with a login and password and store the tokens
    Login { login: String },
    /// Show whether a usable session is stored
    Status,
    /// Exchange the stored refresh token for a new token pair
    Refresh,
    /// Fetch the current user, refreshing the session if needed
    Me,
    /// Authenticated GET of a path relative to the API base URL
    Get { path: String },
    /// Remove the stored tokens
    Logout,
}

/// Initialize the tracing subscriber for logging.
/// The returned guard must be held for the file writer to flush.
fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_writer(writer).with_ansi(false)), Some(guard))
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

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let _log_guard = init_tracing(cli.log_dir.as_deref());

    let mut config = AuthConfig::load()?;
    config.apply_env();
    if let Some(url) = cli.api_url {
        config.api_base_url = url;
    }
    info!(api = %config.api_base_url, storage = ?config.storage, "authkeeper starting");

    let tokens = config.open_token_store();
    let client = build_client(config, tokens.clone())?;

    match cli.command {
        Command::Login { login } => login_command(&client, login).await,
        Command::Status => {
            status_command(&tokens);
            Ok(())
        }
        Command::Refresh => refresh_command(&client).await,
        Command::Me => {
            let me = client.get_me().await.map_err(describe)?;
            println!("{}", serde_json::to_string_pretty(&me.user)?);
            Ok(())
        }
        Command::Get { path } => {
            let response = client
                .authenticated_with_refresh()
                .send(ApiRequest::get(client.url(&path)))
                .await
                .map_err(describe)?;
            println!("{}", response.body);
            Ok(())
        }
        Command::Logout => {
            client.logout().context("Failed to clear stored tokens")?;
            println!("Logged out");
            Ok(())
        }
    }
}

fn build_client(config: AuthConfig, tokens: TokenStore) -> Result<AuthClient> {
    let session = tokens.clone();
    AuthClient::builder(config)
        .token_store(tokens)
        .on_unauthorized(move || {
            warn!("Session expired, clearing stored tokens");
            if let Err(e) = session.clear() {
                warn!(error = %e, "Failed to clear stored tokens");
            }
        })
        .build()
        .context("Failed to create auth client (is api_base_url configured?)")
}

async fn login_command(client: &AuthClient, login: String) -> Result<()> {
    let password = match std::env::var(PASSWORD_ENV) {
        Ok(password) if !password.is_empty() => password,
        _ => rpassword::prompt_password("Password: ").context("Failed to read password")?,
    };

    client
        .login_basic(&LoginBasicPayload::new(login, password))
        .await
        .map_err(describe)?;
    println!("Logged in");
    Ok(())
}

fn status_command(tokens: &TokenStore) {
    let access = tokens.access_token();
    match access.as_deref().and_then(decode_claims) {
        Some(claims) => {
            let expires = DateTime::<Utc>::from_timestamp(claims.expires_at_epoch_seconds, 0);
            let minutes = (claims.expires_at_epoch_seconds - Utc::now().timestamp()) / 60;
            match expires {
                Some(at) if is_token_valid(access.as_deref()) => {
                    println!("Access token: valid until {} ({}m remaining)", at, minutes.max(0));
                }
                Some(at) => println!("Access token: expired at {}", at),
                None => println!("Access token: unreadable expiry"),
            }
        }
        None if access.is_some() => println!("Access token: present but not decodable"),
        None => println!("Access token: none"),
    }

    let refresh = if tokens.refresh_token().is_some() { "stored" } else { "none" };
    println!("Refresh token: {}", refresh);
}

async fn refresh_command(client: &AuthClient) -> Result<()> {
    let pair = client.refresh_token(None).await.map_err(describe)?;
    if pair.access().is_some() {
        println!("Session refreshed");
        Ok(())
    } else if client.token_store().refresh_token().is_none() {
        Err(anyhow!("No refresh token stored; log in first"))
    } else {
        Err(anyhow!("Refresh response did not include an access token"))
    }
}

/// Prefer the server's own error message over the raw status line
fn describe(error: ApiError) -> anyhow::Error {
    let fallback = error.to_string();
    anyhow!(api_error_message(&error, &fallback))
}
