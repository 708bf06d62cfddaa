use std::sync::Arc;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::auth::TokenService;
use crate::config::Config;
use crate::db::{PostRepository, SqlitePostRepository, SqliteUserRepository, UserRepository};
use crate::media::MediaStore;

pub type DbPool = Pool<SqliteConnectionManager>;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub users: Arc<dyn UserRepository>,
    pub posts: Arc<dyn PostRepository>,
    pub media: Arc<MediaStore>,
    pub tokens: Arc<TokenService>,
}

impl AppState {
    /// Wire the SQLite-backed stores, the uploads directory and the token
    /// service from a loaded, validated config.
    pub fn new(config: Config, pool: DbPool) -> anyhow::Result<Self> {
        let tokens = TokenService::new(&config.auth.jwt_secret, config.auth.token_hours)?;
        let media = MediaStore::new(config.uploads_path());

        Ok(Self {
            users: Arc::new(SqliteUserRepository::new(pool.clone())),
            posts: Arc::new(SqlitePostRepository::new(pool)),
            media: Arc::new(media),
            tokens: Arc::new(tokens),
            config,
        })
    }
}
