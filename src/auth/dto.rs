use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Request body for registration.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

/// Request body for credential sign-in.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialsRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    pub callback_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SignInResponse {
    pub user: SessionUserView,
    pub url: String,
}

/// Session as exposed to the client.
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub user: SessionUserView,
    #[serde(with = "time::serde::rfc3339")]
    pub expires: OffsetDateTime,
}

#[derive(Debug, Serialize)]
pub struct SessionUserView {
    pub id: uuid::Uuid,
    pub name: String,
    pub email: String,
    pub image: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignInQuery {
    pub callback_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct OAuthCallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

impl From<&crate::auth::claims::SessionClaims> for SessionUserView {
    fn from(c: &crate::auth::claims::SessionClaims) -> Self {
        Self {
            id: c.sub,
            name: c.name.clone(),
            email: c.email.clone(),
            image: c.image.clone(),
        }
    }
}
