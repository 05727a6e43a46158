use std::cell::RefCell;

use anyhow::anyhow;

use crate::auth::{oauth, token_store};
use crate::config::{MailboxAuth, MailboxConfig};
use crate::error::{Result, TriageError};

pub const IMAP_PASSWORD_ENV: &str = "MAIL_TRIAGE_IMAP_PASSWORD";
pub const OAUTH_CLIENT_SECRET_ENV: &str = "MAIL_TRIAGE_OAUTH_CLIENT_SECRET";

/// How the IMAP session authenticates.
#[derive(Clone)]
pub enum ImapCredential {
    Password(String),
    AccessToken(String),
}

impl std::fmt::Debug for ImapCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImapCredential::Password(_) => f.write_str("Password(..)"),
            ImapCredential::AccessToken(_) => f.write_str("AccessToken(..)"),
        }
    }
}

/// Hands out the credential for a session. Called on the read path, so a
/// failure here fails the folder being read, not the run.
pub trait CredentialProvider {
    fn credential(&self) -> Result<ImapCredential>;
}

/// A credential known up front (password login).
pub struct StaticCredential(pub ImapCredential);

impl CredentialProvider for StaticCredential {
    fn credential(&self) -> Result<ImapCredential> {
        Ok(self.0.clone())
    }
}

/// Exchanges a stored refresh token for an access token on first use and
/// keeps it for the rest of the run. A failed exchange is retried by the next
/// caller.
pub struct OAuthRefresher {
    client_id: String,
    client_secret: Option<String>,
    token_url: String,
    refresh_key: String,
    refresh_token: String,
    access_token: RefCell<Option<String>>,
}

impl CredentialProvider for OAuthRefresher {
    fn credential(&self) -> Result<ImapCredential> {
        if let Some(token) = self.access_token.borrow().as_ref() {
            return Ok(ImapCredential::AccessToken(token.clone()));
        }

        let t = oauth::refresh_access_token(
            &self.client_id,
            self.client_secret.as_deref(),
            &self.token_url,
            &self.refresh_token,
        )
        .map_err(|e| TriageError::transport("oauth", format!("token refresh failed: {e}")))?;

        // Providers may rotate the refresh token; keep the newest one.
        if let Some(rotated) = &t.refresh_token
            && let Err(e) = token_store::save_secret(&self.refresh_key, rotated)
        {
            log::warn!("couldn't save rotated refresh token: {e}");
        }

        *self.access_token.borrow_mut() = Some(t.access_token.clone());
        Ok(ImapCredential::AccessToken(t.access_token))
    }
}

/// Builds the credential provider for the configured mailbox. Missing secrets
/// are configuration errors; nothing here touches the network.
pub fn resolve_credential(cfg: &MailboxConfig) -> anyhow::Result<Box<dyn CredentialProvider>> {
    match cfg.auth {
        MailboxAuth::Password => {
            let password = token_store::lookup_secret(
                IMAP_PASSWORD_ENV,
                &token_store::imap_password_key(&cfg.user),
            )?
            .ok_or_else(|| {
                anyhow!(
                    "no IMAP password for {}: set {IMAP_PASSWORD_ENV} or run `set-secret {}`",
                    cfg.user,
                    token_store::imap_password_key(&cfg.user)
                )
            })?;
            Ok(Box::new(StaticCredential(ImapCredential::Password(password))))
        }
        MailboxAuth::Oauth => {
            let client_id = cfg
                .oauth_client_id
                .clone()
                .ok_or_else(|| anyhow!("oauth_client_id not set in config"))?;
            let client_secret = token_store::lookup_secret(
                OAUTH_CLIENT_SECRET_ENV,
                &format!("client-secret:{client_id}"),
            )?;
            let refresh_key = token_store::refresh_token_key(&cfg.user);
            let refresh_token = token_store::load_secret(&refresh_key)?.ok_or_else(|| {
                anyhow!("no refresh token for {}: run `set-secret {refresh_key}`", cfg.user)
            })?;
            let token_url = cfg
                .oauth_token_url
                .clone()
                .unwrap_or_else(|| oauth::DEFAULT_TOKEN_URL.to_string());

            Ok(Box::new(OAuthRefresher {
                client_id,
                client_secret,
                token_url,
                refresh_key,
                refresh_token,
                access_token: RefCell::new(None),
            }))
        }
    }
}
