use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::users::repo_types::User;

/// A verified user, produced by either sign-in path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub image: Option<String>,
}

impl From<&User> for Identity {
    fn from(u: &User) -> Self {
        Self {
            id: u.id,
            name: u.name.clone(),
            email: u.email.clone(),
            image: u.image.clone(),
        }
    }
}

/// JWT payload carried by the session cookie.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: Uuid,             // user ID
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub image: Option<String>,
    pub iat: i64,              // issued at (unix timestamp)
    pub exp: i64,              // expires at (unix timestamp)
    pub iss: String,
    pub aud: String,
}

impl SessionClaims {
    pub fn identity(&self) -> Identity {
        Identity {
            id: self.sub,
            name: self.name.clone(),
            email: self.email.clone(),
            image: self.image.clone(),
        }
    }
}
