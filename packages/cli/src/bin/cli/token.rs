// ABOUTME: CLI commands for the OAuth authorization flow and token inspection
// ABOUTME: Supports authorize, exchange, token, refresh, and status against the encrypted store

use anyhow::Context;
use chrono::Utc;
use clap::Subcommand;
use colored::*;
use std::sync::Arc;
use tokenvault_auth::{AuthError, EncryptedTokenStore, TokenManager};
use tokenvault_cli::format::{format_remaining, format_timestamp_ms};
use tokenvault_config::Settings;
use tracing::debug;

#[derive(Subcommand)]
pub enum TokenCommands {
    /// Print an authorization URL with a fresh PKCE challenge
    Authorize {
        /// Open the URL in the default browser
        #[arg(long)]
        open: bool,
    },

    /// Exchange an authorization code for tokens and store them
    Exchange {
        /// Authorization code from the redirect
        #[arg(long)]
        code: String,

        /// PKCE code verifier printed by `authorize`
        #[arg(long)]
        verifier: String,
    },

    /// Print a valid access token, refreshing it if needed
    Token,

    /// Force a single token refresh
    Refresh,

    /// Show stored token status
    Status,
}

impl TokenCommands {
    pub async fn execute(&self) -> anyhow::Result<()> {
        let settings = Settings::from_env().context("Invalid configuration")?;

        match self {
            TokenCommands::Authorize { open } => authorize_command(&settings, *open),
            TokenCommands::Exchange { code, verifier } => {
                exchange_command(&settings, code, verifier).await
            }
            TokenCommands::Token => token_command(&settings).await,
            TokenCommands::Refresh => refresh_command(&settings).await,
            TokenCommands::Status => status_command(&settings).await,
        }
    }
}

async fn load_manager(settings: &Settings) -> anyhow::Result<TokenManager> {
    debug!(path = %settings.token_store_path.display(), "Loading token state");
    let store = EncryptedTokenStore::from_settings(settings);
    TokenManager::load(settings, Arc::new(store))
        .await
        .context("Failed to load token state")
}

fn authorize_command(settings: &Settings, open_browser: bool) -> anyhow::Result<()> {
    // Authorization never reads the store
    let store = EncryptedTokenStore::from_settings(settings);
    let manager = TokenManager::new(settings, Arc::new(store))?;
    let request = manager.generate_authorization_request()?;

    println!("{}", "🔐 Authorize Tokenvault".bold().cyan());
    println!();
    println!("Visit this URL and approve access:");
    println!("  {}", request.url);
    println!();
    println!("Code verifier: {}", request.code_verifier.yellow());
    println!("State:         {}", request.state.dimmed());
    println!();
    println!(
        "Then run {}",
        "tokenvault exchange --code <code> --verifier <verifier>".yellow()
    );

    if open_browser {
        if let Err(e) = open::that(&request.url) {
            eprintln!("{} Could not open browser automatically: {}", "⚠".yellow(), e);
        }
    }

    Ok(())
}

async fn exchange_command(settings: &Settings, code: &str, verifier: &str) -> anyhow::Result<()> {
    let store = EncryptedTokenStore::from_settings(settings);
    let path = store.path().to_path_buf();
    let manager = TokenManager::new(settings, Arc::new(store))?;

    let state = manager.exchange_code(code, verifier).await?;

    println!("{} Authorization complete", "✓".green().bold());
    println!(
        "        Expires: {}",
        format_timestamp_ms(state.expires_at).green()
    );
    println!("        Stored:  {}", path.display());
    Ok(())
}

async fn token_command(settings: &Settings) -> anyhow::Result<()> {
    let manager = load_manager(settings).await?;

    match manager.get_valid_access_token().await {
        Ok(token) => {
            // Only the token goes to stdout
            println!("{}", token);
            Ok(())
        }
        Err(e) => Err(with_reauth_hint(e)),
    }
}

async fn refresh_command(settings: &Settings) -> anyhow::Result<()> {
    let manager = load_manager(settings).await?;

    match manager.refresh().await {
        Ok(state) => {
            println!("{} Access token refreshed", "✓".green().bold());
            println!(
                "        Expires: {}",
                format_timestamp_ms(state.expires_at).green()
            );
            Ok(())
        }
        Err(e) => Err(with_reauth_hint(e)),
    }
}

async fn status_command(settings: &Settings) -> anyhow::Result<()> {
    let manager = load_manager(settings).await?;
    let status = manager.status().await;
    let now = Utc::now().timestamp_millis();

    println!("{}", "🔐 Token Status".bold().cyan());
    println!();

    let Some(expires_at) = status.expires_at else {
        println!("  {} {}", "✗".red().bold(), "Not authenticated".dimmed());
        println!();
        println!("Use {} to authenticate", "tokenvault authorize".yellow());
        return Ok(());
    };

    let status_icon = if status.authenticated {
        "✓".green().bold()
    } else {
        "✗".red().bold()
    };
    println!("  {} {}", status_icon, "Dropbox".bold());

    if let Some(account_id) = &status.account_id {
        println!("        Account: {}", account_id.cyan());
    }

    let expires = format!(
        "{} ({})",
        format_timestamp_ms(expires_at),
        format_remaining(expires_at, now)
    );
    if expires_at < now {
        println!("        Expires: {}", expires.red());
    } else {
        println!("        Expires: {}", expires.green());
    }

    println!(
        "        Refresh token: {}",
        if status.has_refresh_token {
            "present".green()
        } else {
            "none (static token)".yellow()
        }
    );

    if status.refresh_attempts > 0 {
        println!(
            "        Failed refresh attempts: {}",
            status.refresh_attempts.to_string().yellow()
        );
    }
    if let Some(last) = status.last_refresh_attempt {
        println!("        Last refresh attempt: {}", format_timestamp_ms(last));
    }
    if !status.scope.is_empty() {
        println!("        Scope: {}", status.scope.join(" ").dimmed());
    }

    Ok(())
}

fn with_reauth_hint(err: AuthError) -> anyhow::Error {
    let needs_reauth = match &err {
        AuthError::NotAuthenticated | AuthError::NoRefreshToken => true,
        AuthError::Refresh(e) => !e.is_retryable(),
        _ => false,
    };
    if needs_reauth {
        eprintln!(
            "Run {} to re-authenticate",
            "tokenvault authorize".yellow()
        );
    }
    err.into()
}
