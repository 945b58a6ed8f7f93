use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use sqlx::PgPool;
use thiserror::Error;
use uuid::Uuid;

use crate::db::PgConnection;
use crate::users::repo_types::{NewUser, User};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("email already registered")]
    DuplicateEmail,
    #[error(transparent)]
    Unavailable(#[from] anyhow::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        let unique = e
            .as_database_error()
            .map(|d| d.is_unique_violation())
            .unwrap_or(false);
        if unique {
            StoreError::DuplicateEmail
        } else {
            StoreError::Unavailable(anyhow::Error::new(e))
        }
    }
}

/// Persistent user records.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError>;

    /// Fails with `DuplicateEmail` when the email is taken.
    async fn create(&self, user: NewUser) -> Result<User, StoreError>;

    /// Returns the user owning `user.email`, inserting it first if absent.
    /// An existing record is returned unchanged.
    async fn find_or_create(&self, user: NewUser) -> Result<User, StoreError>;

    /// Sets `name`, and `image` when given. Returns `None` for an unknown id.
    async fn update_profile(
        &self,
        id: Uuid,
        name: &str,
        image: Option<&str>,
    ) -> Result<Option<User>, StoreError>;
}

const USER_COLUMNS: &str = "id, name, email, password_hash, image, created_at, updated_at";

pub struct PgUsers {
    conn: Arc<PgConnection>,
}

impl PgUsers {
    pub fn new(conn: Arc<PgConnection>) -> Self {
        Self { conn }
    }

    async fn db(&self) -> Result<PgPool, StoreError> {
        Ok(self.conn.get().await?)
    }
}

#[async_trait]
impl UserStore for PgUsers {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let db = self.db().await?;
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&db)
        .await
        .context("find user by email")?;
        Ok(user)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let db = self.db().await?;
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&db)
        .await
        .context("find user by id")?;
        Ok(user)
    }

    async fn create(&self, user: NewUser) -> Result<User, StoreError> {
        let db = self.db().await?;
        let created = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (name, email, password_hash, image)
            VALUES ($1, $2, $3, $4)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.image)
        .fetch_one(&db)
        .await?;
        Ok(created)
    }

    async fn find_or_create(&self, user: NewUser) -> Result<User, StoreError> {
        let db = self.db().await?;
        // The no-op update makes RETURNING yield the existing row on conflict.
        let row = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (name, email, password_hash, image)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (email) DO UPDATE SET email = users.email
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.image)
        .fetch_one(&db)
        .await
        .context("upsert user by email")?;
        Ok(row)
    }

    async fn update_profile(
        &self,
        id: Uuid,
        name: &str,
        image: Option<&str>,
    ) -> Result<Option<User>, StoreError> {
        let db = self.db().await?;
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
               SET name = $2,
                   image = COALESCE($3, image),
                   updated_at = now()
             WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(name)
        .bind(image)
        .fetch_optional(&db)
        .await
        .context("update profile")?;
        Ok(user)
    }
}
