//! `SQLite` implementation of [`CrashRepository`].

use std::future::Future;
use std::str::FromStr;

use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row, SqlitePool};

use capbridge_app::ports::CrashRepository;
use capbridge_domain::crash::{CrashEntry, CrashKind, CrashWindow};
use capbridge_domain::error::BridgeError;

use crate::error::StorageError;
use crate::timestamp;

struct StoredCrash {
    occurred_at: String,
    kind: String,
}

impl<'r> FromRow<'r, SqliteRow> for StoredCrash {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            occurred_at: row.try_get("occurred_at")?,
            kind: row.try_get("kind")?,
        })
    }
}

impl TryFrom<StoredCrash> for CrashEntry {
    type Error = StorageError;

    fn try_from(row: StoredCrash) -> Result<Self, Self::Error> {
        let Ok(kind) = CrashKind::from_str(&row.kind);
        Ok(Self {
            timestamp: timestamp::decode(row.occurred_at)?,
            kind,
        })
    }
}

const SELECT_ALL: &str = "SELECT occurred_at, kind FROM crash_records ORDER BY occurred_at, id";
const DELETE_ALL: &str = "DELETE FROM crash_records";
const INSERT: &str = "INSERT INTO crash_records (occurred_at, kind) VALUES (?, ?)";

/// `SQLite`-backed crash window. Every save replaces the whole window in
/// one transaction.
pub struct SqliteCrashRepository {
    pool: SqlitePool,
}

impl SqliteCrashRepository {
    /// Create a new repository using the given connection pool.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

impl CrashRepository for SqliteCrashRepository {
    fn load(&self) -> impl Future<Output = Result<CrashWindow, BridgeError>> + Send {
        let pool = self.pool.clone();
        async move {
            let rows: Vec<StoredCrash> = sqlx::query_as(SELECT_ALL)
                .fetch_all(&pool)
                .await
                .map_err(StorageError::from)?;

            let entries = rows
                .into_iter()
                .map(CrashEntry::try_from)
                .collect::<Result<Vec<_>, _>>()?;
            Ok(CrashWindow::new(entries))
        }
    }

    fn save(&self, window: CrashWindow) -> impl Future<Output = Result<(), BridgeError>> + Send {
        let pool = self.pool.clone();
        async move {
            let mut tx = pool.begin().await.map_err(StorageError::from)?;

            sqlx::query(DELETE_ALL)
                .execute(&mut *tx)
                .await
                .map_err(StorageError::from)?;
            for entry in window.entries() {
                sqlx::query(INSERT)
                    .bind(timestamp::encode(entry.timestamp))
                    .bind(entry.kind.as_str())
                    .execute(&mut *tx)
                    .await
                    .map_err(StorageError::from)?;
            }

            tx.commit().await.map_err(StorageError::from)?;
            Ok(())
        }
    }
}
