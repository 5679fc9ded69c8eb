use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    FromRow, SqlitePool,
};
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tracing::debug;

use crate::db::models::User;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("user {0:?} not found")]
    NotFound(String),

    #[error("user {0:?} already exists")]
    Conflict(String),

    #[error("user id must not be empty")]
    InvalidId,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("stored profile is not valid JSON: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Keyed CRUD over users plus paginated listing.
///
/// Pages are 1-based and follow insertion order. Page 0 reads as page 1.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn create(&self, user: User) -> Result<User, StoreError>;

    async fn update(&self, id: &str, patch: User) -> Result<User, StoreError>;

    async fn delete(&self, id: &str) -> Result<(), StoreError>;

    async fn get(&self, id: &str) -> Result<User, StoreError>;

    async fn list(&self, page: u32, limit: u32) -> Result<Vec<User>, StoreError>;
}

/// Row offset of the first record on `page`.
pub fn page_offset(page: u32, limit: u32) -> u64 {
    u64::from(page.max(1) - 1) * u64::from(limit)
}

#[derive(FromRow)]
struct UserRow {
    id: String,
    profile: String,
}

impl TryFrom<UserRow> for User {
    type Error = StoreError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let profile: Map<String, Value> = serde_json::from_str(&row.profile)?;
        Ok(User::new(row.id, profile))
    }
}

pub async fn create_user_table(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            id TEXT UNIQUE NOT NULL,
            profile TEXT NOT NULL,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

#[derive(Clone)]
pub struct SqliteUserStore {
    pool: SqlitePool,
}

impl SqliteUserStore {
    /// Opens the database at `db_url`, creating the file and the users table
    /// if they are missing.
    pub async fn connect(db_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(db_url)?.create_if_missing(true);

        // Every connection to an in-memory database gets its own empty copy,
        // so keep exactly one alive for the lifetime of the pool.
        let pool = if is_memory_url(db_url) {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await?
        } else {
            SqlitePoolOptions::new()
                .max_connections(max_connections.max(1))
                .connect_with(options)
                .await?
        };

        create_user_table(&pool).await?;

        Ok(Self { pool })
    }

    #[cfg(test)]
    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn is_memory_url(db_url: &str) -> bool {
    db_url.contains(":memory:") || db_url.contains("mode=memory")
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

const SELECT_BY_ID: &str = "SELECT id, profile FROM users WHERE id = ?";

#[async_trait]
impl UserStore for SqliteUserStore {
    async fn create(&self, user: User) -> Result<User, StoreError> {
        if user.id.is_empty() {
            return Err(StoreError::InvalidId);
        }
        let profile = serde_json::to_string(&user.profile)?;

        let result = sqlx::query(
            r#"
            INSERT INTO users (id, profile, created_at)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(&user.id)
        .bind(&profile)
        .bind(unix_now())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => {
                debug!(id = %user.id, "inserted user");
                Ok(user)
            }
            Err(sqlx::Error::Database(err)) if err.is_unique_violation() => {
                Err(StoreError::Conflict(user.id))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn update(&self, id: &str, patch: User) -> Result<User, StoreError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, UserRow>(SELECT_BY_ID)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        let mut user = User::try_from(row)?;
        user.merge(patch);

        sqlx::query("UPDATE users SET profile = ? WHERE id = ?")
            .bind(serde_json::to_string(&user.profile)?)
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        debug!(id, "updated user");

        Ok(user)
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id.to_string()));
        }
        debug!(id, "deleted user");

        Ok(())
    }

    async fn get(&self, id: &str) -> Result<User, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(SELECT_BY_ID)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        User::try_from(row)
    }

    async fn list(&self, page: u32, limit: u32) -> Result<Vec<User>, StoreError> {
        let offset = i64::try_from(page_offset(page, limit)).unwrap_or(i64::MAX);

        let rows = sqlx::query_as::<_, UserRow>(
            "SELECT id, profile FROM users ORDER BY seq LIMIT ? OFFSET ?",
        )
        .bind(i64::from(limit))
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(User::try_from).collect()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;

    pub(crate) fn user(id: &str, name: &str) -> User {
        let mut profile = Map::new();
        profile.insert("name".to_string(), json!(name));
        User::new(id, profile)
    }

    /// Shared behaviour every store must satisfy.
    pub(crate) async fn exercise_store(store: &dyn UserStore) {
        for i in 1..=5 {
            let created = store.create(user(&format!("u{i}"), &format!("user{i}"))).await.unwrap();
            assert_eq!(created.id, format!("u{i}"));
        }

        assert!(matches!(
            store.create(user("u1", "dup")).await,
            Err(StoreError::Conflict(id)) if id == "u1"
        ));
        assert!(matches!(store.create(user("", "nobody")).await, Err(StoreError::InvalidId)));

        let fetched = store.get("u3").await.unwrap();
        assert_eq!(fetched.profile["name"], json!("user3"));

        let page = store.list(1, 2).await.unwrap();
        let ids: Vec<_> = page.iter().map(|u| u.id.as_str()).collect();
        assert_eq!(ids, ["u1", "u2"]);

        let page = store.list(3, 2).await.unwrap();
        let ids: Vec<_> = page.iter().map(|u| u.id.as_str()).collect();
        assert_eq!(ids, ["u5"]);

        assert_eq!(store.list(0, 2).await.unwrap().len(), 2);
        assert!(store.list(4, 2).await.unwrap().is_empty());
        assert!(store.list(1, 0).await.unwrap().is_empty());

        let mut patch = user("ignored", "renamed");
        patch.profile.insert("age".to_string(), json!(40));
        let updated = store.update("u2", patch).await.unwrap();
        assert_eq!(updated.id, "u2");
        assert_eq!(updated.profile["name"], json!("renamed"));
        assert_eq!(store.get("u2").await.unwrap(), updated);
        assert_eq!(store.get("u1").await.unwrap().profile["name"], json!("user1"));

        assert!(matches!(
            store.update("missing", user("", "x")).await,
            Err(StoreError::NotFound(_))
        ));

        store.delete("u2").await.unwrap();
        assert!(matches!(store.get("u2").await, Err(StoreError::NotFound(_))));
        assert!(matches!(store.delete("u2").await, Err(StoreError::NotFound(_))));
        assert_eq!(store.list(1, 10).await.unwrap().len(), 4);
    }

    #[test]
    fn test_page_offset() {
        assert_eq!(page_offset(0, 10), 0);
        assert_eq!(page_offset(1, 10), 0);
        assert_eq!(page_offset(3, 10), 20);
        assert_eq!(page_offset(u32::MAX, u32::MAX), (u64::from(u32::MAX) - 1) * u64::from(u32::MAX));
    }

    #[tokio::test]
    async fn test_sqlite_store() {
        let store = SqliteUserStore::connect("sqlite::memory:", 5).await.unwrap();
        exercise_store(&store).await;
    }

    #[tokio::test]
    async fn test_sqlite_store_reconnect_keeps_table() {
        let store = SqliteUserStore::connect("sqlite::memory:", 5).await.unwrap();
        store.create(user("u1", "alice")).await.unwrap();

        // Table creation is idempotent.
        create_user_table(store.pool()).await.unwrap();
        assert_eq!(store.get("u1").await.unwrap().profile["name"], json!("alice"));
    }
}
