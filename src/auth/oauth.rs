use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, instrument};
use url::form_urlencoded;

use crate::config::OAuthConfig;

const GOOGLE_AUTHORIZE_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_USERINFO_URL: &str = "https://openidconnect.googleapis.com/v1/userinfo";

/// Profile returned by a provider after a successful code exchange.
#[derive(Debug, Clone)]
pub struct ExternalProfile {
    pub email: String,
    pub email_verified: bool,
    pub name: Option<String>,
    pub image: Option<String>,
}

/// An OAuth 2.0 authorization-code provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    fn id(&self) -> &'static str;

    /// Where to send the browser to start the flow.
    fn authorize_url(&self, state: &str) -> String;

    /// Trades the callback `code` for the user's profile.
    async fn exchange(&self, code: &str) -> anyhow::Result<ExternalProfile>;
}

pub struct GoogleProvider {
    http: reqwest::Client,
    cfg: OAuthConfig,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Deserialize)]
struct GoogleUserInfo {
    email: String,
    #[serde(default)]
    email_verified: bool,
    name: Option<String>,
    picture: Option<String>,
}

impl GoogleProvider {
    pub fn new(cfg: OAuthConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .context("build oauth http client")?;
        Ok(Self { http, cfg })
    }
}

#[async_trait]
impl IdentityProvider for GoogleProvider {
    fn id(&self) -> &'static str {
        "google"
    }

    fn authorize_url(&self, state: &str) -> String {
        let query = form_urlencoded::Serializer::new(String::new())
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.cfg.client_id)
            .append_pair("redirect_uri", &self.cfg.redirect_url)
            .append_pair("scope", "openid email profile")
            .append_pair("state", state)
            .finish();
        format!("{GOOGLE_AUTHORIZE_URL}?{query}")
    }

    #[instrument(skip_all)]
    async fn exchange(&self, code: &str) -> anyhow::Result<ExternalProfile> {
        let token: TokenResponse = self
            .http
            .post(GOOGLE_TOKEN_URL)
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("client_id", self.cfg.client_id.as_str()),
                ("client_secret", self.cfg.client_secret.as_str()),
                ("redirect_uri", self.cfg.redirect_url.as_str()),
            ])
            .send()
            .await
            .context("google token request")?
            .error_for_status()
            .context("google token response")?
            .json()
            .await
            .context("decode google token")?;

        let info: GoogleUserInfo = self
            .http
            .get(GOOGLE_USERINFO_URL)
            .bearer_auth(&token.access_token)
            .send()
            .await
            .context("google userinfo request")?
            .error_for_status()
            .context("google userinfo response")?
            .json()
            .await
            .context("decode google userinfo")?;

        debug!(verified = info.email_verified, "google profile fetched");
        Ok(ExternalProfile {
            email: info.email,
            email_verified: info.email_verified,
            name: info.name,
            image: info.picture,
        })
    }
}
