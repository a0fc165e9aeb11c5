//! `SQLite` implementation of [`TokenRepository`].

use std::future::Future;

use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row, SqlitePool};

use capbridge_app::ports::TokenRepository;
use capbridge_domain::error::BridgeError;
use capbridge_domain::time;
use capbridge_domain::token::TokenRecord;

use crate::error::StorageError;
use crate::timestamp;

/// Row shape before timestamp decoding.
struct StoredToken {
    access_token: String,
    refresh_token: String,
    expires_at: String,
    refresh_token_expires_at: String,
}

impl<'r> FromRow<'r, SqliteRow> for StoredToken {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            access_token: row.try_get("access_token")?,
            refresh_token: row.try_get("refresh_token")?,
            expires_at: row.try_get("expires_at")?,
            refresh_token_expires_at: row.try_get("refresh_token_expires_at")?,
        })
    }
}

impl TryFrom<StoredToken> for TokenRecord {
    type Error = StorageError;

    fn try_from(row: StoredToken) -> Result<Self, Self::Error> {
        Ok(Self {
            access_token: row.access_token,
            refresh_token: row.refresh_token,
            expires_at: timestamp::decode(row.expires_at)?,
            refresh_token_expires_at: timestamp::decode(row.refresh_token_expires_at)?,
        })
    }
}

const SELECT: &str = "SELECT access_token, refresh_token, expires_at, refresh_token_expires_at FROM oauth_tokens WHERE id = 1";
const UPSERT: &str = "INSERT INTO oauth_tokens (id, access_token, refresh_token, expires_at, refresh_token_expires_at, updated_at) \
     VALUES (1, ?, ?, ?, ?, ?) \
     ON CONFLICT (id) DO UPDATE SET \
     access_token = excluded.access_token, \
     refresh_token = excluded.refresh_token, \
     expires_at = excluded.expires_at, \
     refresh_token_expires_at = excluded.refresh_token_expires_at, \
     updated_at = excluded.updated_at";
const DELETE: &str = "DELETE FROM oauth_tokens";

/// `SQLite`-backed token repository. Holds at most one row.
pub struct SqliteTokenRepository {
    pool: SqlitePool,
}

impl SqliteTokenRepository {
    /// Create a new repository using the given connection pool.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

impl TokenRepository for SqliteTokenRepository {
    fn load(&self) -> impl Future<Output = Result<Option<TokenRecord>, BridgeError>> + Send {
        let pool = self.pool.clone();
        async move {
            let row: Option<StoredToken> = sqlx::query_as(SELECT)
                .fetch_optional(&pool)
                .await
                .map_err(StorageError::from)?;

            row.map(TokenRecord::try_from)
                .transpose()
                .map_err(BridgeError::from)
        }
    }

    fn save(&self, record: TokenRecord) -> impl Future<Output = Result<(), BridgeError>> + Send {
        let pool = self.pool.clone();
        async move {
            sqlx::query(UPSERT)
                .bind(&record.access_token)
                .bind(&record.refresh_token)
                .bind(timestamp::encode(record.expires_at))
                .bind(timestamp::encode(record.refresh_token_expires_at))
                .bind(timestamp::encode(time::now()))
                .execute(&pool)
                .await
                .map_err(StorageError::from)?;

            Ok(())
        }
    }

    fn clear(&self) -> impl Future<Output = Result<(), BridgeError>> + Send {
        let pool = self.pool.clone();
        async move {
            sqlx::query(DELETE)
                .execute(&pool)
                .await
                .map_err(StorageError::from)?;

            Ok(())
        }
    }
}
