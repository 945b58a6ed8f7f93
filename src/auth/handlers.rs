use axum::{
    extract::{Query, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Json, Router,
};
use axum_extra::extract::{
    cookie::{Cookie, CookieJar, SameSite},
    WithRejection,
};
use rand::{distributions::Alphanumeric, thread_rng, Rng};
use time::{Duration, OffsetDateTime};
use tracing::{error, info, instrument, warn};

use super::{
    dto::{
        CredentialsRequest, OAuthCallbackQuery, RegisterRequest, SessionResponse,
        SessionUserView, SignInQuery, SignInResponse,
    },
    extractors::SessionUser,
    services::{self, sanitize_callback},
};
use crate::{error::AppError, state::AppState, users::dto::PublicUser};

const OAUTH_STATE_COOKIE: &str = "profilehub.oauth-state";
const OAUTH_CALLBACK_COOKIE: &str = "profilehub.oauth-callback";

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/api/auth/register", post(register))
        .route("/api/auth/callback/credentials", post(sign_in_credentials))
        .route("/api/auth/session", get(get_session))
        .route("/api/auth/signout", post(sign_out))
}

pub fn oauth_routes() -> Router<AppState> {
    Router::new()
        .route("/api/auth/signin/google", get(oauth_sign_in))
        .route("/api/auth/callback/google", get(oauth_callback))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    WithRejection(Json(payload), _): WithRejection<Json<RegisterRequest>, AppError>,
) -> Result<(StatusCode, Json<PublicUser>), AppError> {
    let user = services::register(state.users.as_ref(), payload).await?;
    Ok((StatusCode::CREATED, Json(user.into())))
}

#[instrument(skip(state, jar, payload))]
pub async fn sign_in_credentials(
    State(state): State<AppState>,
    jar: CookieJar,
    WithRejection(Json(payload), _): WithRejection<Json<CredentialsRequest>, AppError>,
) -> Result<(CookieJar, Json<SignInResponse>), AppError> {
    let identity =
        services::authenticate_credentials(state.users.as_ref(), &payload.email, &payload.password)
            .await?;
    let (jar, claims) = services::establish_session(&state.sessions, jar, &identity)?;
    Ok((
        jar,
        Json(SignInResponse {
            user: SessionUserView::from(&claims),
            url: sanitize_callback(payload.callback_url.as_deref()),
        }),
    ))
}

/// The caller's session, or `null` when there is none.
pub async fn get_session(session: Option<SessionUser>) -> Json<Option<SessionResponse>> {
    Json(session.and_then(|SessionUser(claims)| {
        let expires = OffsetDateTime::from_unix_timestamp(claims.exp).ok()?;
        Some(SessionResponse {
            user: SessionUserView::from(&claims),
            expires,
        })
    }))
}

/// Sessions are stateless; signing out only drops the cookie.
pub async fn sign_out(State(state): State<AppState>, jar: CookieJar) -> (CookieJar, StatusCode) {
    (
        jar.add(state.sessions.removal_cookie()),
        StatusCode::NO_CONTENT,
    )
}

fn flow_cookie(name: &'static str, value: String, secure: bool) -> Cookie<'static> {
    Cookie::build((name, value))
        .path("/api/auth")
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .max_age(Duration::minutes(10))
        .build()
}

fn clear_flow_cookies(jar: CookieJar) -> CookieJar {
    jar.remove(Cookie::build(OAUTH_STATE_COOKIE).path("/api/auth"))
        .remove(Cookie::build(OAUTH_CALLBACK_COOKIE).path("/api/auth"))
}

/// `303` to `target`, or to `/` when `target` is not a usable header value.
fn see_other(target: &str) -> Response {
    let location = HeaderValue::try_from(target).unwrap_or_else(|_| {
        warn!("unusable redirect target, sending to /");
        HeaderValue::from_static("/")
    });
    (StatusCode::SEE_OTHER, [(header::LOCATION, location)]).into_response()
}

fn login_error(state: &AppState, code: &str) -> Redirect {
    Redirect::to(&format!("{}?error={}", state.config.guard.login_path, code))
}

#[instrument(skip(state, jar, query))]
pub async fn oauth_sign_in(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(query): Query<SignInQuery>,
) -> Response {
    let Some(provider) = state.oauth.clone() else {
        return (StatusCode::NOT_FOUND, "Unknown provider").into_response();
    };

    let csrf: String = thread_rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect();
    let callback = sanitize_callback(query.callback_url.as_deref());
    let target = provider.authorize_url(&csrf);

    info!(provider = provider.id(), "oauth sign-in started");
    let secure = state.config.session.cookie_secure;
    let jar = jar
        .add(flow_cookie(OAUTH_STATE_COOKIE, csrf, secure))
        .add(flow_cookie(OAUTH_CALLBACK_COOKIE, callback, secure));
    (jar, Redirect::temporary(&target)).into_response()
}

#[instrument(skip(state, jar, query))]
pub async fn oauth_callback(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(query): Query<OAuthCallbackQuery>,
) -> Response {
    let Some(provider) = state.oauth.clone() else {
        return (StatusCode::NOT_FOUND, "Unknown provider").into_response();
    };

    if let Some(err) = query.error.as_deref() {
        warn!(provider = provider.id(), error = err, "provider returned an error");
        return (clear_flow_cookies(jar), login_error(&state, "OAuthCallback")).into_response();
    }

    let expected = jar.get(OAUTH_STATE_COOKIE).map(|c| c.value().to_owned());
    let (Some(code), Some(got), Some(expected)) = (query.code, query.state, expected) else {
        warn!(provider = provider.id(), "oauth callback missing code or state");
        return (clear_flow_cookies(jar), login_error(&state, "OAuthCallback")).into_response();
    };
    if got != expected {
        warn!(provider = provider.id(), "oauth state mismatch");
        return (clear_flow_cookies(jar), login_error(&state, "OAuthCallback")).into_response();
    }

    let callback = sanitize_callback(jar.get(OAUTH_CALLBACK_COOKIE).map(|c| c.value()));
    let jar = clear_flow_cookies(jar);

    let profile = match provider.exchange(&code).await {
        Ok(p) => p,
        Err(e) => {
            error!(provider = provider.id(), error = %format!("{e:#}"), "oauth code exchange failed");
            return (jar, login_error(&state, "OAuthCallback")).into_response();
        }
    };

    let identity = match services::link_oauth_identity(state.users.as_ref(), profile).await {
        Ok(identity) => identity,
        Err(AppError::InvalidCredentials) => {
            return (jar, login_error(&state, "AccessDenied")).into_response();
        }
        Err(e) => return e.into_response(),
    };

    match services::establish_session(&state.sessions, jar, &identity) {
        Ok((jar, _)) => (jar, see_other(&callback)).into_response(),
        Err(e) => e.into_response(),
    }
}
