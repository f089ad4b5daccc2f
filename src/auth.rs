//! Interactive sign-in
//!
//! When a fresh session is not yet authorized, a login code is requested and
//! read from an [`AuthPrompt`]. Accounts with two-step verification are then
//! asked for their password. Any rejection aborts the run.

use crate::error::{Error, ProviderError, Result};
use crate::provider::RemoteSession;

/// Source of login codes and passwords
#[async_trait::async_trait]
pub trait AuthPrompt: Send + Sync {
    /// Ask for the login code sent to the account
    async fn login_code(&self) -> std::io::Result<String>;

    /// Ask for the two-step verification password
    async fn password(&self) -> std::io::Result<String>;
}

/// Reads codes and passwords from the terminal
#[derive(Clone, Copy, Debug, Default)]
pub struct StdinPrompt;

impl StdinPrompt {
    async fn ask(label: &'static str) -> std::io::Result<String> {
        tokio::task::spawn_blocking(move || {
            use std::io::{BufRead, Write};

            let mut stdout = std::io::stdout();
            write!(stdout, "{label}")?;
            stdout.flush()?;

            let mut line = String::new();
            if std::io::stdin().lock().read_line(&mut line)? == 0 {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "stdin closed",
                ));
            }
            Ok(line.trim().to_string())
        })
        .await
        .map_err(std::io::Error::other)?
    }
}

#[async_trait::async_trait]
impl AuthPrompt for StdinPrompt {
    async fn login_code(&self) -> std::io::Result<String> {
        Self::ask("Enter the code: ").await
    }

    async fn password(&self) -> std::io::Result<String> {
        Self::ask("Password: ").await
    }
}

/// Make sure `session` is signed in, prompting when needed
pub async fn authenticate(
    session: &dyn RemoteSession,
    phone: &str,
    prompt: &dyn AuthPrompt,
) -> Result<()> {
    if session.is_authorized().await? {
        tracing::debug!("Session already authorized");
        return Ok(());
    }

    tracing::info!(phone, "Session not authorized, requesting login code");
    session.request_login_code(phone).await?;

    let code = prompt
        .login_code()
        .await
        .map_err(|e| Error::Auth(format!("could not read login code: {}", e)))?;

    match session.sign_in_with_code(phone, &code).await {
        Ok(()) => {}
        Err(ProviderError::PasswordRequired) => {
            tracing::info!("Two-step verification enabled, asking for password");
            let password = prompt
                .password()
                .await
                .map_err(|e| Error::Auth(format!("could not read password: {}", e)))?;
            session
                .sign_in_with_password(&password)
                .await
                .map_err(|e| Error::Auth(e.to_string()))?;
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to authenticate");
            return Err(Error::Auth(e.to_string()));
        }
    }

    tracing::info!("Signed in");
    Ok(())
}
