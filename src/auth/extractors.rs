use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use axum_extra::extract::cookie::CookieJar;

use super::{claims::SessionClaims, session::SessionKeys};
use crate::error::AppError;

/// Claims of the caller's verified session.
///
/// Behind the route guard the claims are already in the request extensions;
/// elsewhere the session cookie is verified on the spot.
#[derive(Debug, Clone)]
pub struct SessionUser(pub SessionClaims);

#[async_trait]
impl<S> FromRequestParts<S> for SessionUser
where
    S: Send + Sync,
    SessionKeys: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(claims) = parts.extensions.get::<SessionClaims>() {
            return Ok(SessionUser(claims.clone()));
        }

        let keys = SessionKeys::from_ref(state);
        let jar = CookieJar::from_headers(&parts.headers);
        jar.get(keys.cookie_name())
            .and_then(|c| keys.verify(c.value()))
            .map(SessionUser)
            .ok_or(AppError::Unauthenticated)
    }
}
