use axum_extra::extract::cookie::CookieJar;
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, warn};

use super::{
    claims::{Identity, SessionClaims},
    dto::RegisterRequest,
    oauth::ExternalProfile,
    password,
    session::SessionKeys,
};
use crate::{
    error::AppError,
    users::{
        repo::UserStore,
        repo_types::{NewUser, User},
    },
};

pub const MIN_PASSWORD_LEN: usize = 8;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

pub(crate) fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Only same-origin relative paths survive; anything else falls back to `/`.
///
/// Browsers drop tabs and newlines while parsing a `Location`, so `/\t/x`
/// would turn into `//x`. Only visible ASCII is accepted, which also keeps
/// the value a valid header.
pub fn sanitize_callback(raw: Option<&str>) -> String {
    match raw {
        Some(p)
            if p.starts_with('/')
                && !p.starts_with("//")
                && !p.contains('\\')
                && p.chars().all(|c| c.is_ascii_graphic()) =>
        {
            p.to_string()
        }
        _ => "/".to_string(),
    }
}

pub async fn register(users: &dyn UserStore, req: RegisterRequest) -> Result<User, AppError> {
    let name = req.name.trim();
    let email = normalize_email(&req.email);

    if name.is_empty() {
        return Err(AppError::validation("name", "Name is required"));
    }
    if !is_valid_email(&email) {
        return Err(AppError::validation("email", "Invalid email"));
    }
    if req.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::validation(
            "password",
            format!("Password must be at least {MIN_PASSWORD_LEN} characters"),
        ));
    }

    let password_hash = password::hash_password(&req.password).await?;
    let user = users
        .create(NewUser {
            name: name.to_string(),
            email,
            password_hash: Some(password_hash),
            image: None,
        })
        .await
        .map_err(|e| {
            warn!(error = %e, "registration rejected");
            AppError::from(e)
        })?;

    info!(user_id = %user.id, "user registered");
    Ok(user)
}

/// Every failure on this path is reported as `InvalidCredentials`; the
/// specific cause only reaches the logs.
pub async fn authenticate_credentials(
    users: &dyn UserStore,
    email: &str,
    password: &str,
) -> Result<Identity, AppError> {
    let email = normalize_email(email);
    if email.is_empty() || password.is_empty() {
        warn!("sign-in missing email or password");
        return Err(AppError::InvalidCredentials);
    }

    let user = match users.find_by_email(&email).await? {
        Some(u) => u,
        None => {
            password::verify_dummy(password).await;
            warn!("sign-in for unknown email");
            return Err(AppError::InvalidCredentials);
        }
    };

    let Some(hash) = user.password_hash.as_deref() else {
        password::verify_dummy(password).await;
        warn!(user_id = %user.id, "sign-in with password on oauth-only account");
        return Err(AppError::InvalidCredentials);
    };

    if !password::verify_password(password, hash).await {
        warn!(user_id = %user.id, "sign-in with wrong password");
        return Err(AppError::InvalidCredentials);
    }

    info!(user_id = %user.id, "credentials verified");
    Ok(Identity::from(&user))
}

/// Finds or creates the account owning a provider-verified email.
pub async fn link_oauth_identity(
    users: &dyn UserStore,
    profile: ExternalProfile,
) -> Result<Identity, AppError> {
    let email = normalize_email(&profile.email);
    if !profile.email_verified || !is_valid_email(&email) {
        warn!("oauth profile without a verified email");
        return Err(AppError::InvalidCredentials);
    }

    let name = profile
        .name
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| email.split('@').next().unwrap_or_default().to_string());

    let user = users
        .find_or_create(NewUser {
            name,
            email,
            password_hash: None,
            image: profile.image,
        })
        .await?;

    info!(user_id = %user.id, "oauth identity linked");
    Ok(Identity::from(&user))
}

/// Mints a token for `identity` and attaches it to the outgoing cookies.
pub fn establish_session(
    keys: &SessionKeys,
    jar: CookieJar,
    identity: &Identity,
) -> Result<(CookieJar, SessionClaims), AppError> {
    let issued = keys.issue(identity)?;
    let jar = jar.add(keys.session_cookie(issued.token));
    Ok((jar, issued.claims))
}
