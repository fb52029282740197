//! Authorization-code flow against the mail provider's OAuth endpoints.

use {secrecy::ExposeSecret, url::Url};

use omnibox_channels::{ChannelError, Result};

use crate::{config::MailOauthConfig, tokens::TokenSet};

/// Drives the code-for-token exchange and silent refresh.
pub struct AuthCodeFlow {
    config: MailOauthConfig,
    client: reqwest::Client,
}

impl AuthCodeFlow {
    pub fn new(config: MailOauthConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    /// Build the redirect target for the user's browser.
    ///
    /// `access_type=offline` requests a refresh token; `force_consent`
    /// makes the provider re-prompt even when a prior grant exists (the
    /// only way to obtain a fresh refresh token after the first grant).
    pub fn authorization_url(&self, force_consent: bool) -> Result<String> {
        let mut url = Url::parse(&self.config.auth_url)
            .map_err(|e| ChannelError::external("invalid auth_url", e))?;

        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", &self.config.redirect_uri)
            .append_pair("access_type", "offline")
            .append_pair("scope", &self.config.scopes.join(" "));

        if force_consent {
            url.query_pairs_mut().append_pair("prompt", "consent");
        }

        Ok(url.to_string())
    }

    /// Exchange an authorization code for tokens. One-shot: a code is
    /// consumed by the provider whether or not we like the response.
    pub async fn exchange_code(&self, code: &str) -> Result<TokenSet> {
        let form = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.expose_secret().as_str()),
            ("redirect_uri", self.config.redirect_uri.as_str()),
        ];
        self.token_request(&form).await
    }

    /// Trade a refresh token for a fresh access token.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenSet> {
        let form = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.expose_secret().as_str()),
        ];
        self.token_request(&form).await
    }

    async fn token_request(&self, form: &[(&str, &str)]) -> Result<TokenSet> {
        let response = self
            .client
            .post(&self.config.token_url)
            .form(form)
            .send()
            .await
            .map_err(|e| ChannelError::external("token endpoint unreachable", e))?;

        let status = response.status();
        if status.is_client_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChannelError::upstream_rejected(format!(
                "token endpoint returned {status}: {body}"
            )));
        }
        if !status.is_success() {
            return Err(ChannelError::External {
                context: format!("token endpoint returned {status}"),
                source: "server error".into(),
            });
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ChannelError::external("malformed token response", e))?;
        parse_token_response(&body)
    }
}

fn parse_token_response(body: &serde_json::Value) -> Result<TokenSet> {
    let access_token = body["access_token"]
        .as_str()
        .ok_or_else(|| ChannelError::upstream_rejected("missing access_token in response"))?
        .to_string();

    let refresh_token = body["refresh_token"].as_str().map(|s| s.to_string());

    let expires_at = body["expires_in"].as_u64().and_then(|secs| {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .ok()
            .map(|d| d.as_secs() + secs)
    });

    Ok(TokenSet {
        access_token: secrecy::Secret::new(access_token),
        refresh_token: refresh_token.map(secrecy::Secret::new),
        expires_at,
    })
}
