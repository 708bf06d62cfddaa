use async_trait::async_trait;
use chrono::Utc;
use rusqlite::types::Type;
use rusqlite::{params, OptionalExtension, Row};

use super::models::{Category, NewPost, Post, PostChanges};
use super::RepositoryError;
use crate::state::DbPool;

const POST_COLUMNS: &str =
    "id, title, category, description, creator, thumbnail, created_at, updated_at";

/// Post store. Creating and deleting a post also maintains the creator's
/// post counter inside the same transaction.
#[async_trait]
pub trait PostRepository: Send + Sync {
    async fn find_by_id(&self, id: &str) -> Result<Option<Post>, RepositoryError>;

    async fn create(&self, post: NewPost) -> Result<Post, RepositoryError>;

    async fn update(&self, id: &str, changes: PostChanges)
        -> Result<Option<Post>, RepositoryError>;

    /// Returns the removed post, or `None` if there was nothing to remove.
    async fn delete(&self, id: &str) -> Result<Option<Post>, RepositoryError>;

    /// Most recently updated first.
    async fn list_recent(&self) -> Result<Vec<Post>, RepositoryError>;

    /// Most recently created first.
    async fn list_by_category(&self, category: Category) -> Result<Vec<Post>, RepositoryError>;

    /// Most recently created first.
    async fn list_by_creator(&self, creator: &str) -> Result<Vec<Post>, RepositoryError>;
}

pub struct SqlitePostRepository {
    pool: DbPool,
}

impl SqlitePostRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn query_many(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<Post>, RepositoryError> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(sql)?;
        let posts = stmt
            .query_map(params, post_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(posts)
    }
}

fn post_from_row(row: &Row<'_>) -> rusqlite::Result<Post> {
    let category: String = row.get(2)?;
    let category = category
        .parse::<Category>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e)))?;

    Ok(Post {
        id: row.get(0)?,
        title: row.get(1)?,
        category,
        description: row.get(3)?,
        creator: row.get(4)?,
        thumbnail: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

#[async_trait]
impl PostRepository for SqlitePostRepository {
    async fn find_by_id(&self, id: &str) -> Result<Option<Post>, RepositoryError> {
        let conn = self.pool.get()?;
        let post = conn
            .query_row(
                &format!("SELECT {POST_COLUMNS} FROM posts WHERE id = ?1"),
                params![id],
                post_from_row,
            )
            .optional()?;
        Ok(post)
    }

    async fn create(&self, post: NewPost) -> Result<Post, RepositoryError> {
        let mut conn = self.pool.get()?;
        let id = uuid::Uuid::now_v7().to_string();
        let now = Utc::now();

        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO posts (id, title, category, description, creator, thumbnail, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
            params![
                id,
                post.title,
                post.category.as_str(),
                post.description,
                post.creator,
                post.thumbnail,
                now
            ],
        )?;
        tx.execute(
            "UPDATE users SET post_count = post_count + 1 WHERE id = ?1",
            params![post.creator],
        )?;
        tx.commit()?;

        Ok(Post {
            id,
            title: post.title,
            category: post.category,
            description: post.description,
            creator: post.creator,
            thumbnail: post.thumbnail,
            created_at: now,
            updated_at: now,
        })
    }

    async fn update(
        &self,
        id: &str,
        changes: PostChanges,
    ) -> Result<Option<Post>, RepositoryError> {
        let rows = {
            let conn = self.pool.get()?;
            conn.execute(
                "UPDATE posts
                 SET title = ?2, category = ?3, description = ?4,
                     thumbnail = COALESCE(?5, thumbnail), updated_at = ?6
                 WHERE id = ?1",
                params![
                    id,
                    changes.title,
                    changes.category.as_str(),
                    changes.description,
                    changes.thumbnail,
                    Utc::now()
                ],
            )?
        };

        if rows == 0 {
            return Ok(None);
        }
        self.find_by_id(id).await
    }

    async fn delete(&self, id: &str) -> Result<Option<Post>, RepositoryError> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction()?;

        let post = tx
            .query_row(
                &format!("SELECT {POST_COLUMNS} FROM posts WHERE id = ?1"),
                params![id],
                post_from_row,
            )
            .optional()?;

        let Some(post) = post else {
            return Ok(None);
        };

        tx.execute("DELETE FROM posts WHERE id = ?1", params![id])?;
        // No-op when the creator no longer exists.
        tx.execute(
            "UPDATE users SET post_count = MAX(post_count - 1, 0) WHERE id = ?1",
            params![post.creator],
        )?;
        tx.commit()?;

        Ok(Some(post))
    }

    async fn list_recent(&self) -> Result<Vec<Post>, RepositoryError> {
        self.query_many(
            &format!("SELECT {POST_COLUMNS} FROM posts ORDER BY updated_at DESC, id DESC"),
            [],
        )
    }

    async fn list_by_category(&self, category: Category) -> Result<Vec<Post>, RepositoryError> {
        self.query_many(
            &format!(
                "SELECT {POST_COLUMNS} FROM posts WHERE category = ?1
                 ORDER BY created_at DESC, id DESC"
            ),
            params![category.as_str()],
        )
    }

    async fn list_by_creator(&self, creator: &str) -> Result<Vec<Post>, RepositoryError> {
        self.query_many(
            &format!(
                "SELECT {POST_COLUMNS} FROM posts WHERE creator = ?1
                 ORDER BY created_at DESC, id DESC"
            ),
            params![creator],
        )
    }
}
