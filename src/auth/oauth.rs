use anyhow::Result;
use oauth2::TokenResponse;
use oauth2::basic::BasicClient;
use oauth2::reqwest::http_client;
use oauth2::{AuthUrl, ClientId, ClientSecret, RefreshToken, TokenUrl};

pub const DEFAULT_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Tokens returned by a refresh exchange (in-memory)
pub struct Tokens {
    pub access_token: String,
    pub refresh_token: Option<String>,
}

/// Exchange a refresh token for a new access token using the oauth2 crate
pub fn refresh_access_token(
    client_id: &str,
    client_secret: Option<&str>,
    token_url: &str,
    refresh_token: &str,
) -> Result<Tokens> {
    let client_id = ClientId::new(client_id.to_string());
    let client_secret = client_secret.map(|s| ClientSecret::new(s.to_string()));

    // Only the token endpoint is contacted; the auth URL is never visited.
    let auth_url = AuthUrl::new(token_url.to_string())?;
    let token_url = TokenUrl::new(token_url.to_string())?;

    let oauth_client = BasicClient::new(client_id, client_secret, auth_url, Some(token_url));

    let rt = RefreshToken::new(refresh_token.to_string());
    let token = oauth_client
        .exchange_refresh_token(&rt)
        .request(http_client)?;

    Ok(Tokens {
        access_token: token.access_token().secret().to_string(),
        refresh_token: token.refresh_token().map(|r| r.secret().to_string()),
    })
}
