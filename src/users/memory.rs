use std::{collections::HashMap, sync::Mutex};

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use super::repo::{StoreError, UserStore};
use super::repo_types::{NewUser, User};

/// In-process `UserStore` with the same uniqueness rules as the table.
#[derive(Default)]
pub struct MemoryUsers {
    rows: Mutex<HashMap<Uuid, User>>,
}

impl MemoryUsers {
    fn insert_locked(rows: &mut HashMap<Uuid, User>, user: NewUser) -> User {
        let now = OffsetDateTime::now_utc();
        let row = User {
            id: Uuid::new_v4(),
            name: user.name,
            email: user.email,
            password_hash: user.password_hash,
            image: user.image,
            created_at: now,
            updated_at: now,
        };
        rows.insert(row.id, row.clone());
        row
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<Uuid, User>>, StoreError> {
        self.rows
            .lock()
            .map_err(|_| StoreError::Unavailable(anyhow::anyhow!("user table poisoned")))
    }
}

#[async_trait]
impl UserStore for MemoryUsers {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(self.lock()?.values().find(|u| u.email == email).cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.lock()?.get(&id).cloned())
    }

    async fn create(&self, user: NewUser) -> Result<User, StoreError> {
        let mut rows = self.lock()?;
        if rows.values().any(|u| u.email == user.email) {
            return Err(StoreError::DuplicateEmail);
        }
        Ok(Self::insert_locked(&mut rows, user))
    }

    async fn find_or_create(&self, user: NewUser) -> Result<User, StoreError> {
        let mut rows = self.lock()?;
        if let Some(existing) = rows.values().find(|u| u.email == user.email) {
            return Ok(existing.clone());
        }
        Ok(Self::insert_locked(&mut rows, user))
    }

    async fn update_profile(
        &self,
        id: Uuid,
        name: &str,
        image: Option<&str>,
    ) -> Result<Option<User>, StoreError> {
        let mut rows = self.lock()?;
        let Some(user) = rows.get_mut(&id) else {
            return Ok(None);
        };
        user.name = name.to_string();
        if let Some(image) = image {
            user.image = Some(image.to_string());
        }
        user.updated_at = OffsetDateTime::now_utc();
        Ok(Some(user.clone()))
    }
}
