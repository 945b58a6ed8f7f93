use anyhow::Context;
use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use lazy_static::lazy_static;
use rand::rngs::OsRng;
use tracing::{error, warn};

lazy_static! {
    // Verified against when an email is unknown, so both paths cost the same.
    static ref DUMMY_HASH: String =
        hash_blocking("profilehub-placeholder-password").unwrap_or_default();
}

fn hash_blocking(plain: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map_err(|e| {
            error!(error = %e, "argon2 hash_password error");
            anyhow::anyhow!(e.to_string())
        })?
        .to_string();
    Ok(hash)
}

fn verify_blocking(plain: &str, hash: &str) -> bool {
    let parsed = match PasswordHash::new(hash) {
        Ok(p) => p,
        Err(e) => {
            warn!(error = %e, "stored password hash is malformed");
            return false;
        }
    };
    Argon2::default()
        .verify_password(plain.as_bytes(), &parsed)
        .is_ok()
}

/// Hashes on the blocking pool; Argon2 is deliberately slow.
pub async fn hash_password(plain: &str) -> anyhow::Result<String> {
    let plain = plain.to_owned();
    tokio::task::spawn_blocking(move || hash_blocking(&plain))
        .await
        .context("hash task panicked")?
}

/// `false` for a mismatch and for a digest that cannot be parsed.
pub async fn verify_password(plain: &str, hash: &str) -> bool {
    let (plain, hash) = (plain.to_owned(), hash.to_owned());
    match tokio::task::spawn_blocking(move || verify_blocking(&plain, &hash)).await {
        Ok(ok) => ok,
        Err(e) => {
            error!(error = %e, "verify task panicked");
            false
        }
    }
}

/// Spends the same work as a real verification and discards the outcome.
pub async fn verify_dummy(plain: &str) {
    let plain = plain.to_owned();
    let _ = tokio::task::spawn_blocking(move || verify_blocking(&plain, &DUMMY_HASH)).await;
}
