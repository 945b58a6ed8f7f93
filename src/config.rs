use std::str::FromStr;

use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub max_age_days: i64,
    pub refresh_after_hours: i64,
    pub cookie_name: String,
    pub cookie_secure: bool,
}

/// Path rules consulted by the route guard.
#[derive(Debug, Clone, Deserialize)]
pub struct GuardConfig {
    pub login_path: String,
    pub public_prefixes: Vec<String>,
    pub exclude_patterns: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub endpoint: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
    pub public_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub database_max_connections: u32,
    pub static_dir: String,
    pub session: SessionConfig,
    pub guard: GuardConfig,
    pub storage: StorageConfig,
    pub google: Option<OAuthConfig>,
}

pub const DEFAULT_PUBLIC_PATHS: &str = "/login,/register,/api/auth,/favicon.ico,/health";
pub const DEFAULT_GUARD_EXCLUDE: &str =
    r"^/static/,^/favicon\.ico$,\.(?:svg|png|jpg|jpeg|gif|webp)$";

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| lookup(key).with_context(|| format!("{key} is not set"));
        let or = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let session = SessionConfig {
            secret: required("AUTH_SECRET")?,
            issuer: or("AUTH_ISSUER", "profilehub"),
            audience: or("AUTH_AUDIENCE", "profilehub-users"),
            max_age_days: parsed(&lookup, "SESSION_MAX_AGE_DAYS", 30)?,
            refresh_after_hours: parsed(&lookup, "SESSION_REFRESH_AFTER_HOURS", 24)?,
            cookie_name: or("SESSION_COOKIE_NAME", "profilehub.session-token"),
            cookie_secure: parsed(&lookup, "SESSION_COOKIE_SECURE", false)?,
        };

        let guard = GuardConfig {
            login_path: or("LOGIN_PATH", "/login"),
            public_prefixes: split_list(&or("PUBLIC_PATHS", DEFAULT_PUBLIC_PATHS)),
            exclude_patterns: split_list(&or("GUARD_EXCLUDE", DEFAULT_GUARD_EXCLUDE)),
        };

        let endpoint = required("MINIO_ENDPOINT")?;
        let bucket = required("MINIO_BUCKET")?;
        let public_url = lookup("MINIO_PUBLIC_URL")
            .unwrap_or_else(|| format!("{}/{}", endpoint.trim_end_matches('/'), bucket));
        let storage = StorageConfig {
            access_key: required("MINIO_ACCESS_KEY")?,
            secret_key: required("MINIO_SECRET_KEY")?,
            region: or("MINIO_REGION", "us-east-1"),
            endpoint,
            bucket,
            public_url,
        };

        // Google sign-in is only wired when all three are present.
        let google = match (
            lookup("GOOGLE_CLIENT_ID"),
            lookup("GOOGLE_CLIENT_SECRET"),
            lookup("GOOGLE_REDIRECT_URL"),
        ) {
            (Some(client_id), Some(client_secret), Some(redirect_url)) => Some(OAuthConfig {
                client_id,
                client_secret,
                redirect_url,
            }),
            _ => None,
        };

        Ok(Self {
            host: or("APP_HOST", "0.0.0.0"),
            port: parsed(&lookup, "APP_PORT", 8080)?,
            database_url: required("DATABASE_URL")?,
            database_max_connections: parsed(&lookup, "DATABASE_MAX_CONNECTIONS", 10)?,
            static_dir: or("STATIC_DIR", "static"),
            session,
            guard,
            storage,
            google,
        })
    }
}

fn parsed<F, T>(lookup: &F, key: &str, default: T) -> anyhow::Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("{key}: {e}")),
        None => Ok(default),
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn base_env() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            ("DATABASE_URL", "postgres://localhost/profilehub"),
            ("AUTH_SECRET", "s3cret"),
            ("MINIO_ENDPOINT", "http://minio:9000/"),
            ("MINIO_BUCKET", "avatars"),
            ("MINIO_ACCESS_KEY", "key"),
            ("MINIO_SECRET_KEY", "secret"),
        ])
    }

    fn load(env: &HashMap<&'static str, &'static str>) -> anyhow::Result<AppConfig> {
        AppConfig::from_lookup(|k| env.get(k).map(|v| v.to_string()))
    }

    #[test]
    fn defaults_are_applied() {
        let cfg = load(&base_env()).expect("config");
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.session.max_age_days, 30);
        assert_eq!(cfg.session.refresh_after_hours, 24);
        assert!(!cfg.session.cookie_secure);
        assert_eq!(cfg.guard.login_path, "/login");
        assert!(cfg.guard.public_prefixes.contains(&"/api/auth".to_string()));
        assert_eq!(cfg.guard.exclude_patterns.len(), 3);
        assert_eq!(cfg.storage.public_url, "http://minio:9000/avatars");
        assert!(cfg.google.is_none());
    }

    #[test]
    fn missing_secret_is_an_error() {
        let mut env = base_env();
        env.remove("AUTH_SECRET");
        let err = load(&env).unwrap_err();
        assert!(err.to_string().contains("AUTH_SECRET"));
    }

    #[test]
    fn bad_number_is_reported_with_key() {
        let mut env = base_env();
        env.insert("SESSION_MAX_AGE_DAYS", "thirty");
        let err = load(&env).unwrap_err();
        assert!(err.to_string().contains("SESSION_MAX_AGE_DAYS"));
    }

    #[test]
    fn google_requires_all_settings() {
        let mut env = base_env();
        env.insert("GOOGLE_CLIENT_ID", "id");
        env.insert("GOOGLE_CLIENT_SECRET", "secret");
        assert!(load(&env).expect("config").google.is_none());

        env.insert("GOOGLE_REDIRECT_URL", "http://localhost/api/auth/callback/google");
        let google = load(&env).expect("config").google.expect("google enabled");
        assert_eq!(google.client_id, "id");
    }
}
