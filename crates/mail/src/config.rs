use {
    secrecy::Secret,
    serde::{Deserialize, Serialize},
};

use crate::tokens::serialize_secret;

/// OAuth client configuration for the mail provider.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MailOauthConfig {
    pub client_id: String,

    #[serde(serialize_with = "serialize_secret")]
    pub client_secret: Secret<String>,

    /// Authorization endpoint the user is redirected to.
    pub auth_url: String,

    /// Token endpoint for code exchange and refresh.
    pub token_url: String,

    pub redirect_uri: String,

    pub scopes: Vec<String>,
}

impl Default for MailOauthConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: Secret::new(String::new()),
            auth_url: "https://accounts.google.com/o/oauth2/v2/auth".into(),
            token_url: "https://oauth2.googleapis.com/token".into(),
            redirect_uri: "http://localhost:5000/auth/mail/callback".into(),
            scopes: vec![
                "https://www.googleapis.com/auth/gmail.readonly".into(),
                "https://www.googleapis.com/auth/gmail.send".into(),
            ],
        }
    }
}

impl std::fmt::Debug for MailOauthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailOauthConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("auth_url", &self.auth_url)
            .field("token_url", &self.token_url)
            .finish_non_exhaustive()
    }
}
