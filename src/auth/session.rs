use axum::extract::FromRef;
use axum_extra::extract::cookie::{Cookie, SameSite};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use time::{Duration, OffsetDateTime};
use tracing::debug;

use super::claims::{Identity, SessionClaims};
use crate::{config::SessionConfig, state::AppState};

/// Signing keys and lifetime settings for session tokens.
#[derive(Clone)]
pub struct SessionKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    audience: String,
    max_age: Duration,
    refresh_after: Duration,
    cookie_name: String,
    cookie_secure: bool,
}

/// A freshly minted token together with the claims it carries.
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub token: String,
    pub claims: SessionClaims,
}

impl FromRef<AppState> for SessionKeys {
    fn from_ref(state: &AppState) -> Self {
        state.sessions.clone()
    }
}

impl SessionKeys {
    pub fn new(cfg: &SessionConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(cfg.secret.as_bytes()),
            decoding: DecodingKey::from_secret(cfg.secret.as_bytes()),
            issuer: cfg.issuer.clone(),
            audience: cfg.audience.clone(),
            max_age: Duration::days(cfg.max_age_days),
            refresh_after: Duration::hours(cfg.refresh_after_hours),
            cookie_name: cfg.cookie_name.clone(),
            cookie_secure: cfg.cookie_secure,
        }
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    pub fn issue(&self, identity: &Identity) -> anyhow::Result<IssuedSession> {
        self.issue_at(identity, OffsetDateTime::now_utc())
    }

    pub fn issue_at(&self, identity: &Identity, now: OffsetDateTime) -> anyhow::Result<IssuedSession> {
        let claims = SessionClaims {
            sub: identity.id,
            name: identity.name.clone(),
            email: identity.email.clone(),
            image: identity.image.clone(),
            iat: now.unix_timestamp(),
            exp: (now + self.max_age).unix_timestamp(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
        };
        let token = encode(&Header::default(), &claims, &self.encoding)?;
        debug!(user_id = %identity.id, exp = claims.exp, "session issued");
        Ok(IssuedSession { token, claims })
    }

    pub fn verify(&self, token: &str) -> Option<SessionClaims> {
        self.verify_at(token, OffsetDateTime::now_utc())
    }

    /// Every failure collapses to `None`; the reason is only logged.
    pub fn verify_at(&self, token: &str, now: OffsetDateTime) -> Option<SessionClaims> {
        let mut validation = Validation::default();
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        // Expiry is checked below against the caller's clock.
        validation.validate_exp = false;
        validation.leeway = 0;

        let claims = match decode::<SessionClaims>(token, &self.decoding, &validation) {
            Ok(data) => data.claims,
            Err(e) => {
                debug!(error = %e, "session rejected");
                return None;
            }
        };
        if claims.exp <= now.unix_timestamp() {
            debug!(user_id = %claims.sub, exp = claims.exp, "session expired");
            return None;
        }
        Some(claims)
    }

    pub fn needs_refresh(&self, claims: &SessionClaims, now: OffsetDateTime) -> bool {
        now.unix_timestamp() - claims.iat >= self.refresh_after.whole_seconds()
    }

    pub fn session_cookie(&self, token: String) -> Cookie<'static> {
        Cookie::build((self.cookie_name.clone(), token))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .secure(self.cookie_secure)
            .max_age(self.max_age)
            .build()
    }

    pub fn removal_cookie(&self) -> Cookie<'static> {
        Cookie::build((self.cookie_name.clone(), ""))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .secure(self.cookie_secure)
            .max_age(Duration::ZERO)
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn config(secret: &str, issuer: &str, audience: &str) -> SessionConfig {
        SessionConfig {
            secret: secret.into(),
            issuer: issuer.into(),
            audience: audience.into(),
            max_age_days: 30,
            refresh_after_hours: 24,
            cookie_name: "session".into(),
            cookie_secure: false,
        }
    }

    fn make_keys() -> SessionKeys {
        SessionKeys::new(&config("dev-secret", "test-issuer", "test-aud"))
    }

    fn ann() -> Identity {
        Identity {
            id: Uuid::new_v4(),
            name: "Ann".into(),
            email: "ann@x.com".into(),
            image: Some("https://cdn.local/ann.png".into()),
        }
    }

    #[test]
    fn issue_and_verify_carries_identity() {
        let keys = make_keys();
        let who = ann();
        let issued = keys.issue(&who).expect("issue");
        let claims = keys.verify(&issued.token).expect("verify");
        assert_eq!(claims.identity(), who);
        assert_eq!(claims.iss, "test-issuer");
        assert_eq!(claims.aud, "test-aud");
        assert_eq!(claims.exp - claims.iat, 30 * 24 * 60 * 60);
    }

    #[test]
    fn accepted_before_thirty_days_rejected_after() {
        let keys = make_keys();
        let t = OffsetDateTime::now_utc();
        let issued = keys.issue_at(&ann(), t).expect("issue");

        assert!(keys.verify_at(&issued.token, t + Duration::days(29)).is_some());
        assert!(keys.verify_at(&issued.token, t + Duration::days(31)).is_none());
    }

    #[test]
    fn rejects_other_secret_issuer_or_audience() {
        let token = make_keys().issue(&ann()).expect("issue").token;
        for cfg in [
            config("other-secret", "test-issuer", "test-aud"),
            config("dev-secret", "bad-iss", "test-aud"),
            config("dev-secret", "test-issuer", "bad-aud"),
        ] {
            assert!(SessionKeys::new(&cfg).verify(&token).is_none());
        }
    }

    #[test]
    fn rejects_garbage_and_tampered_tokens() {
        let keys = make_keys();
        assert!(keys.verify("").is_none());
        assert!(keys.verify("invalid.token.here").is_none());

        let mut token = keys.issue(&ann()).expect("issue").token;
        token.push('x');
        assert!(keys.verify(&token).is_none());
    }

    #[test]
    fn refresh_window() {
        let keys = make_keys();
        let t = OffsetDateTime::now_utc();
        let claims = keys.issue_at(&ann(), t).expect("issue").claims;
        assert!(!keys.needs_refresh(&claims, t + Duration::hours(23)));
        assert!(keys.needs_refresh(&claims, t + Duration::hours(25)));
    }

    #[test]
    fn cookies_are_http_only() {
        let keys = make_keys();
        let c = keys.session_cookie("tok".into());
        assert_eq!(c.name(), "session");
        assert_eq!(c.value(), "tok");
        assert_eq!(c.http_only(), Some(true));
        assert_eq!(c.max_age(), Some(Duration::days(30)));

        let gone = keys.removal_cookie();
        assert_eq!(gone.value(), "");
        assert_eq!(gone.max_age(), Some(Duration::ZERO));
    }
}
