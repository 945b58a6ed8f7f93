use anyhow::Context;
use axum::{
    extract::{Request, State},
    http::header::SET_COOKIE,
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::CookieJar;
use regex::RegexSet;
use time::OffsetDateTime;
use tracing::{debug, warn};
use url::form_urlencoded;

use crate::{config::GuardConfig, error::AppError, state::AppState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteClass {
    Public,
    Protected,
}

/// Compiled path rules for the guard.
#[derive(Debug, Clone)]
pub struct RouteRules {
    login_path: String,
    public_prefixes: Vec<String>,
    excluded: RegexSet,
}

impl RouteRules {
    pub fn new(cfg: &GuardConfig) -> anyhow::Result<Self> {
        let excluded =
            RegexSet::new(&cfg.exclude_patterns).context("compile guard exclude patterns")?;
        Ok(Self {
            login_path: cfg.login_path.clone(),
            public_prefixes: cfg.public_prefixes.clone(),
            excluded,
        })
    }

    /// Paths the guard never looks at (static assets). Not a security boundary.
    pub fn is_excluded(&self, path: &str) -> bool {
        self.excluded.is_match(path)
    }

    pub fn classify(&self, path: &str) -> RouteClass {
        if self.public_prefixes.iter().any(|p| path.starts_with(p.as_str())) {
            RouteClass::Public
        } else {
            RouteClass::Protected
        }
    }

    pub fn login_redirect(&self, original_path: &str) -> String {
        let query = form_urlencoded::Serializer::new(String::new())
            .append_pair("callbackUrl", original_path)
            .finish();
        format!("{}?{}", self.login_path, query)
    }
}

fn is_api(path: &str) -> bool {
    path == "/api" || path.starts_with("/api/")
}

/// Gates every request on a valid session unless its path is public.
pub async fn route_guard(
    State(state): State<AppState>,
    jar: CookieJar,
    mut req: Request,
    next: Next,
) -> Response {
    let path = req.uri().path().to_owned();
    let rules = &state.routes;

    // Public rules are decided before any cookie is touched.
    if rules.is_excluded(&path) || rules.classify(&path) == RouteClass::Public {
        return next.run(req).await;
    }

    let keys = &state.sessions;
    let Some(claims) = jar
        .get(keys.cookie_name())
        .and_then(|c| keys.verify(c.value()))
    else {
        debug!(%path, "no valid session");
        return if is_api(&path) {
            AppError::Unauthenticated.into_response()
        } else {
            Redirect::temporary(&rules.login_redirect(&path)).into_response()
        };
    };

    let refreshed = if keys.needs_refresh(&claims, OffsetDateTime::now_utc()) {
        match keys.issue(&claims.identity()) {
            Ok(issued) => Some(issued),
            Err(e) => {
                warn!(error = %e, user_id = %claims.sub, "session refresh failed");
                None
            }
        }
    } else {
        None
    };

    let current = refreshed
        .as_ref()
        .map(|s| s.claims.clone())
        .unwrap_or(claims);
    req.extensions_mut().insert(current);

    let res = next.run(req).await;

    let Some(issued) = refreshed else {
        return res;
    };
    // A handler that already re-issued the session wins.
    let prefix = format!("{}=", keys.cookie_name());
    let already_set = res
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .any(|v| v.to_str().map(|s| s.starts_with(&prefix)).unwrap_or(false));
    if already_set {
        return res;
    }
    debug!(user_id = %issued.claims.sub, "session refreshed");
    (jar.add(keys.session_cookie(issued.token)), res).into_response()
}
