use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};

use super::models::{NewUser, User};
use super::{unique_violation, RepositoryError};
use crate::state::DbPool;

const USER_COLUMNS: &str =
    "id, name, email, password_hash, avatar, post_count, created_at, updated_at";

/// Credential store: persisted user records.
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_id(&self, id: &str) -> Result<Option<User>, RepositoryError>;

    /// `email` must already be lowercased.
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError>;

    /// Fails with `Conflict` when the email is taken.
    async fn create(&self, user: NewUser) -> Result<User, RepositoryError>;

    /// Rewrites name, email and password hash. `None` if the user is gone.
    async fn update_profile(
        &self,
        id: &str,
        name: &str,
        email: &str,
        password_hash: &str,
    ) -> Result<Option<User>, RepositoryError>;

    async fn set_avatar(&self, id: &str, avatar: &str) -> Result<Option<User>, RepositoryError>;

    async fn list(&self) -> Result<Vec<User>, RepositoryError>;
}

pub struct SqliteUserRepository {
    pool: DbPool,
}

impl SqliteUserRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn fetch(&self, id: &str) -> Result<Option<User>, RepositoryError> {
        let conn = self.pool.get()?;
        let user = conn
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                params![id],
                user_from_row,
            )
            .optional()?;
        Ok(user)
    }
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        password_hash: row.get(3)?,
        avatar: row.get(4)?,
        post_count: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

#[async_trait]
impl UserRepository for SqliteUserRepository {
    async fn find_by_id(&self, id: &str) -> Result<Option<User>, RepositoryError> {
        self.fetch(id)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError> {
        let conn = self.pool.get()?;
        let user = conn
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1"),
                params![email],
                user_from_row,
            )
            .optional()?;
        Ok(user)
    }

    async fn create(&self, user: NewUser) -> Result<User, RepositoryError> {
        let conn = self.pool.get()?;
        let id = uuid::Uuid::now_v7().to_string();
        let now = Utc::now();

        conn.execute(
            "INSERT INTO users (id, name, email, password_hash, avatar, post_count, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, NULL, 0, ?5, ?5)",
            params![id, user.name, user.email, user.password_hash, now],
        )
        .map_err(|e| unique_violation(e, "Email already exists"))?;

        Ok(User {
            id,
            name: user.name,
            email: user.email,
            password_hash: user.password_hash,
            avatar: None,
            post_count: 0,
            created_at: now,
            updated_at: now,
        })
    }

    async fn update_profile(
        &self,
        id: &str,
        name: &str,
        email: &str,
        password_hash: &str,
    ) -> Result<Option<User>, RepositoryError> {
        let rows = {
            let conn = self.pool.get()?;
            conn.execute(
                "UPDATE users SET name = ?2, email = ?3, password_hash = ?4, updated_at = ?5
                 WHERE id = ?1",
                params![id, name, email, password_hash, Utc::now()],
            )
            .map_err(|e| unique_violation(e, "Email already exists"))?
        };

        if rows == 0 {
            return Ok(None);
        }
        self.fetch(id)
    }

    async fn set_avatar(&self, id: &str, avatar: &str) -> Result<Option<User>, RepositoryError> {
        let rows = {
            let conn = self.pool.get()?;
            conn.execute(
                "UPDATE users SET avatar = ?2, updated_at = ?3 WHERE id = ?1",
                params![id, avatar, Utc::now()],
            )?
        };

        if rows == 0 {
            return Ok(None);
        }
        self.fetch(id)
    }

    async fn list(&self) -> Result<Vec<User>, RepositoryError> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY created_at ASC, id ASC"
        ))?;
        let users = stmt
            .query_map([], user_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(users)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testing::test_pool;

    fn new_user(email: &str) -> NewUser {
        NewUser {
            name: "Ada".into(),
            email: email.into(),
            password_hash: "hash".into(),
        }
    }

    #[tokio::test]
    async fn create_then_find_by_email_and_id() {
        let (_tmp, pool) = test_pool();
        let repo = SqliteUserRepository::new(pool);

        let created = repo.create(new_user("ada@example.com")).await.unwrap();
        assert_eq!(created.post_count, 0);
        assert!(created.avatar.is_none());

        let by_email = repo.find_by_email("ada@example.com").await.unwrap().unwrap();
        assert_eq!(by_email.id, created.id);

        let by_id = repo.find_by_id(&created.id).await.unwrap().unwrap();
        assert_eq!(by_id.email, "ada@example.com");
        assert_eq!(by_id.password_hash, "hash");
    }

    #[tokio::test]
    async fn duplicate_email_is_conflict() {
        let (_tmp, pool) = test_pool();
        let repo = SqliteUserRepository::new(pool);

        repo.create(new_user("ada@example.com")).await.unwrap();
        let err = repo.create(new_user("ada@example.com")).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)));
    }

    #[tokio::test]
    async fn update_profile_and_avatar() {
        let (_tmp, pool) = test_pool();
        let repo = SqliteUserRepository::new(pool);
        let user = repo.create(new_user("ada@example.com")).await.unwrap();

        let updated = repo
            .update_profile(&user.id, "Ada L.", "ada@lovelace.dev", "hash2")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.name, "Ada L.");
        assert_eq!(updated.email, "ada@lovelace.dev");
        assert_eq!(updated.password_hash, "hash2");

        let with_avatar = repo
            .set_avatar(&user.id, "me1234.png")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(with_avatar.avatar.as_deref(), Some("me1234.png"));
    }

    #[tokio::test]
    async fn updates_on_missing_user_return_none() {
        let (_tmp, pool) = test_pool();
        let repo = SqliteUserRepository::new(pool);

        assert!(repo.set_avatar("nope", "a.png").await.unwrap().is_none());
        assert!(repo
            .update_profile("nope", "n", "e@x.io", "h")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn list_returns_every_user() {
        let (_tmp, pool) = test_pool();
        let repo = SqliteUserRepository::new(pool);
        repo.create(new_user("a@example.com")).await.unwrap();
        repo.create(new_user("b@example.com")).await.unwrap();

        let users = repo.list().await.unwrap();
        assert_eq!(users.len(), 2);
    }
}
