use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    routing::{get, post},
    Json, Router,
};
use axum_extra::extract::cookie::CookieJar;
use tracing::instrument;

use super::{
    dto::PublicUser,
    services::{update_profile, AvatarUpload},
};
use crate::{
    auth::{claims::Identity, dto::SessionUserView, extractors::SessionUser, services::establish_session},
    error::AppError,
    state::AppState,
};

const AVATAR_LIMIT: usize = 10 * 1024 * 1024;

pub fn profile_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(home))
        .route("/api/profile", get(get_profile))
}

pub fn edit_routes() -> Router<AppState> {
    Router::new()
        .route("/api/edit", post(edit_profile))
        .layer(DefaultBodyLimit::max(AVATAR_LIMIT))
}

/// The signed-in user as the session describes them; no store access.
pub async fn home(SessionUser(claims): SessionUser) -> Json<SessionUserView> {
    Json(SessionUserView::from(&claims))
}

#[instrument(skip(state, claims), fields(user_id = %claims.sub))]
pub async fn get_profile(
    State(state): State<AppState>,
    SessionUser(claims): SessionUser,
) -> Result<Json<PublicUser>, AppError> {
    let user = state
        .users
        .find_by_id(claims.sub)
        .await?
        .ok_or(AppError::Unauthenticated)?;
    Ok(Json(user.into()))
}

/// POST /api/edit (multipart)
/// Fields: `name` (required), `file` (optional avatar image).
#[instrument(skip(state, claims, jar, mp), fields(user_id = %claims.sub))]
pub async fn edit_profile(
    State(state): State<AppState>,
    SessionUser(claims): SessionUser,
    jar: CookieJar,
    mut mp: Multipart,
) -> Result<(CookieJar, Json<PublicUser>), AppError> {
    let mut name: Option<String> = None;
    let mut avatar: Option<AvatarUpload> = None;

    while let Some(field) = mp
        .next_field()
        .await
        .map_err(|e| AppError::validation("form", e.body_text()))?
    {
        let field_name = field.name().map(str::to_owned);
        match field_name.as_deref() {
            Some("name") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| AppError::validation("name", e.body_text()))?;
                name = Some(text);
            }
            Some("file") => {
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let body = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::validation("file", e.body_text()))?;
                // Browsers send an empty part when no file was picked.
                if !body.is_empty() {
                    avatar = Some(AvatarUpload { body, content_type });
                }
            }
            _ => {}
        }
    }

    let name = name.ok_or_else(|| AppError::validation("name", "Name is required"))?;
    let user = update_profile(
        state.users.as_ref(),
        state.blobs.as_ref(),
        claims.sub,
        &name,
        avatar,
    )
    .await?;

    // Keep the cookie's claims in step with the stored profile.
    let (jar, _) = establish_session(&state.sessions, jar, &Identity::from(&user))?;
    Ok((jar, Json(user.into())))
}
