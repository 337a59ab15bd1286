//! Subcommand handlers. Each takes the shared session and reports to stdout.

use std::io::{self, BufRead, Write};

use anyhow::{bail, Context, Result};
use futures::future::join_all;
use reqwest::Method;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use storefront_core::api::ApiClient;
use storefront_core::auth::{guard, GuardOptions, GuardOutcome, REFRESH_TOKEN_KEY};
use storefront_core::models::{Credentials, Registration, UserProfile};
use storefront_core::{Config, SessionEvent, SessionStore};

fn prompt(label: &str) -> Result<String> {
    print!("{}", label);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read from stdin")?;
    Ok(line.trim().to_string())
}

fn read_password(label: &str) -> Result<String> {
    rpassword::prompt_password(label).context("Failed to read password")
}

fn remember_email(config: &mut Config, email: &str) {
    config.last_email = Some(email.to_string());
    if let Err(e) = config.save() {
        warn!(error = %e, "Failed to save config");
    }
}

fn print_profile(profile: &UserProfile) {
    println!("Signed in as {}", profile.display_name());
    if let Some(ref email) = profile.email {
        println!("  email:    {}", email);
    }
    if profile.is_admin {
        println!("  role:     administrator");
    }
    if !profile.is_verified {
        println!("  (email address not verified)");
    }
}

pub async fn login(session: &SessionStore, config: &mut Config, email: Option<String>) -> Result<()> {
    let email = match email.or_else(|| config.last_email.clone()) {
        Some(e) => e,
        None => prompt("Email: ")?,
    };
    let password = read_password(&format!("Password for {}: ", email))?;

    let credentials = Credentials::new(&email, &password);
    let profile = session.sign_in(&credentials).await?;
    remember_email(config, &credentials.email);
    print_profile(&profile);
    Ok(())
}

pub async fn register(
    session: &SessionStore,
    config: &mut Config,
    email: String,
    firstname: String,
    lastname: String,
) -> Result<()> {
    let password = read_password("Choose a password: ")?;
    let confirm = read_password("Repeat password: ")?;
    if password != confirm {
        bail!("Passwords do not match");
    }

    let registration = Registration {
        email: email.trim().to_string(),
        password,
        firstname: firstname.trim().to_string(),
        lastname: lastname.trim().to_string(),
    };
    let profile = session.sign_up(&registration).await?;
    remember_email(config, &registration.email);
    print_profile(&profile);
    Ok(())
}

pub async fn logout(session: &SessionStore) -> Result<()> {
    if session.token().is_none() {
        println!("Not signed in");
        return Ok(());
    }
    session.logout().await;
    println!("Signed out");
    Ok(())
}

pub fn status(session: &SessionStore, config: &Config) -> Result<()> {
    println!("Backend:  {}", config.api_base_url);
    println!("Storage:  {}", session.storage().describe());
    println!("State:    {}", session.state().label());

    match session.token() {
        Some(token) if !token.is_expired() => {
            let secs = token.seconds_until_expiry();
            println!("Token:    expires in {}m {}s", secs / 60, secs % 60);
        }
        Some(_) => println!("Token:    expired"),
        None => println!("Token:    none"),
    }

    let has_refresh = session
        .storage()
        .get(REFRESH_TOKEN_KEY)
        .context("Failed to read session storage")?
        .is_some();
    println!("Refresh:  {}", if has_refresh { "available" } else { "none" });

    if let Some(profile) = session.user_profile() {
        println!("User:     {}", profile.display_name());
    }
    Ok(())
}

pub async fn whoami(session: &SessionStore) -> Result<()> {
    if session.token().is_none() {
        bail!("Not signed in. Run `storefront login` first.");
    }
    let profile = session.reload_profile().await?;
    print_profile(&profile);
    Ok(())
}

pub async fn refresh(session: &SessionStore) -> Result<()> {
    if !session.refresh_token().await {
        bail!("Token refresh failed. Run `storefront login` to sign in again.");
    }
    match session.token() {
        Some(token) => println!(
            "Access token refreshed, valid for {}s",
            token.seconds_until_expiry()
        ),
        None => println!("Access token refreshed"),
    }
    Ok(())
}

async fn send_one(
    api: &ApiClient,
    method: Method,
    path: &str,
    body: Option<&serde_json::Value>,
) -> Result<(reqwest::StatusCode, String)> {
    let mut builder = api.request(method, path);
    if let Some(body) = body {
        builder = builder.json(body);
    }
    let response = api.send(builder).await?;
    let status = response.status();
    let text = response.text().await?;
    Ok((status, text))
}

fn pretty(text: &str) -> String {
    serde_json::from_str::<serde_json::Value>(text)
        .ok()
        .and_then(|v| serde_json::to_string_pretty(&v).ok())
        .unwrap_or_else(|| text.to_string())
}

/// Issue the same request against every path concurrently
pub async fn request(
    session: &SessionStore,
    method: &str,
    paths: &[String],
    data: Option<&str>,
) -> Result<()> {
    let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())
        .with_context(|| format!("Invalid HTTP method '{}'", method))?;
    let body = data
        .map(|d| serde_json::from_str::<serde_json::Value>(d))
        .transpose()
        .context("--data must be valid JSON")?;

    let mut allowed = Vec::new();
    for path in paths {
        match guard(session, path, GuardOptions::for_request(&method, path)) {
            GuardOutcome::Allowed => allowed.push(path.as_str()),
            GuardOutcome::LoginRequired { .. } => eprintln!("{}: sign-in required", path),
            GuardOutcome::Forbidden => eprintln!("{}: administrator access required", path),
        }
    }
    if allowed.is_empty() {
        bail!("No request was sent");
    }

    let api = session.api();
    debug!(count = allowed.len(), %method, "Sending requests");
    let results = join_all(
        allowed
            .iter()
            .map(|path| send_one(&api, method.clone(), path, body.as_ref())),
    )
    .await;

    let mut failed = 0;
    for (path, result) in allowed.iter().zip(results) {
        match result {
            Ok((status, text)) => {
                if !status.is_success() {
                    failed += 1;
                }
                println!("{} {} -> {}", method, path, status);
                if !text.is_empty() {
                    println!("{}", pretty(&text));
                }
            }
            Err(e) => {
                failed += 1;
                eprintln!("{} {} failed: {:#}", method, path, e);
            }
        }
    }
    if failed > 0 {
        bail!("{} of {} requests failed", failed, allowed.len());
    }
    Ok(())
}

/// Follow the session until it ends here or in another process
pub async fn watch(session: &SessionStore) -> Result<()> {
    if !session.is_authenticated() {
        bail!("Not signed in. Run `storefront login` first.");
    }
    let mut events = session.subscribe();
    println!("Watching session ({}), Ctrl-C to stop", session.storage().describe());

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(SessionEvent::Login(profile)) => println!("login: {}", profile.display_name()),
                Ok(SessionEvent::Refreshed) => {
                    let secs = session.token().map(|t| t.seconds_until_expiry()).unwrap_or(0);
                    println!("refreshed: token valid for {}s", secs);
                }
                Ok(SessionEvent::ProfileUpdated(profile)) => {
                    println!("profile updated: {}", profile.display_name())
                }
                Ok(SessionEvent::Logout) => {
                    println!("logout");
                    break;
                }
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Missed session events"),
                Err(RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    Ok(())
}
