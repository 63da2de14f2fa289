//! # History Ledger
//!
//! Append-only SQLite record of every processing attempt.
//!
//! ## Overview
//!
//! Each attempt appends one row to the `history` table, keyed by
//! `(id, extractor)` and stamped with the database clock. Rows are never
//! updated or deleted: the current state of an item is its most recent row,
//! and earlier rows stay around as history. An operator asks for a retry by
//! appending a [`EntryState::RetryRequested`] row.

pub mod identity;

use std::path::Path;
use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;
use thiserror::Error;
use time::OffsetDateTime;

use crate::downloader::models::Entry;
pub use identity::{Identity, IdentityError, IdentityRegistry, IdentityRule};

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error("Invalid state {0} in history table")]
    InvalidState(i64),

    #[error(
        "Table `history` in {location} was written by an incompatible version (missing columns: {})",
        missing.join(", ")
    )]
    IncompatibleSchema {
        location: String,
        missing: Vec<String>,
    },
}

pub type Result<T> = std::result::Result<T, LedgerError>;

/// Outcome stored with every row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryState {
    /// Processed without error (also what a NULL state means)
    Succeeded = 0,
    Failed = 1,
    /// Operator asked for the item to be attempted again
    RetryRequested = 2,
}

impl EntryState {
    pub fn as_i64(self) -> i64 {
        self as i64
    }

    pub fn from_column(value: Option<i64>) -> Result<Self> {
        match value {
            None | Some(0) => Ok(Self::Succeeded),
            Some(1) => Ok(Self::Failed),
            Some(2) => Ok(Self::RetryRequested),
            Some(other) => Err(LedgerError::InvalidState(other)),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::RetryRequested => "retry-requested",
        }
    }
}

/// One stored row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    pub seq: i64,
    pub external_id: String,
    pub source_site: String,
    pub group: Option<String>,
    pub caption: Option<String>,
    pub state: EntryState,
    pub timestamp: OffsetDateTime,
}

#[derive(Debug, FromRow)]
struct HistoryRow {
    seq: i64,
    id: String,
    extractor: String,
    group_name: Option<String>,
    caption: Option<String>,
    state: Option<i64>,
    created_at: i64,
}

impl TryFrom<HistoryRow> for LedgerEntry {
    type Error = LedgerError;

    fn try_from(row: HistoryRow) -> Result<Self> {
        let timestamp = OffsetDateTime::from_unix_timestamp(row.created_at).map_err(|e| {
            LedgerError::Database(sqlx::Error::Decode(Box::new(e)))
        })?;

        Ok(Self {
            seq: row.seq,
            external_id: row.id,
            source_site: row.extractor,
            group: row.group_name,
            caption: row.caption,
            state: EntryState::from_column(row.state)?,
            timestamp,
        })
    }
}

const HISTORY_COLUMNS: [&str; 7] = [
    "seq",
    "id",
    "extractor",
    "group_name",
    "caption",
    "state",
    "timestamp",
];

const SELECT_ROWS: &str = r#"
    SELECT seq, id, extractor, group_name, caption, state,
           CAST(strftime('%s', timestamp) AS INTEGER) AS created_at
    FROM history
"#;

/// Handle on the history database.
pub struct Ledger {
    pool: SqlitePool,
    location: String,
    identities: IdentityRegistry,
}

impl Ledger {
    /// Open (creating if needed) the ledger file at `path`.
    pub async fn open(path: &Path) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        Self::connect(options, path.display().to_string()).await
    }

    /// Private in-memory ledger, gone when dropped.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        Self::connect(options, ":memory:".to_string()).await
    }

    async fn connect(options: SqliteConnectOptions, location: String) -> Result<Self> {
        // One connection: the sync loop is sequential, and an in-memory
        // database only exists inside the connection that created it.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        Ok(Self {
            pool,
            location,
            identities: IdentityRegistry::default(),
        })
    }

    pub fn with_identities(mut self, identities: IdentityRegistry) -> Self {
        self.identities = identities;
        self
    }

    /// Create the schema if absent. Existing rows are left untouched.
    ///
    /// An existing `history` table lacking any of the current columns is
    /// rejected with [`LedgerError::IncompatibleSchema`]; it is never migrated.
    pub async fn initialize(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS history (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL,
                extractor TEXT NOT NULL,
                group_name TEXT,
                caption TEXT,
                state INTEGER,
                timestamp DATETIME DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        self.check_schema().await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS history_key ON history (id, extractor)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn check_schema(&self) -> Result<()> {
        let columns: Vec<String> =
            sqlx::query_scalar("SELECT name FROM pragma_table_info('history')")
                .fetch_all(&self.pool)
                .await?;

        let missing: Vec<String> = HISTORY_COLUMNS
            .iter()
            .filter(|column| !columns.iter().any(|name| name.as_str() == **column))
            .map(|column| column.to_string())
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(LedgerError::IncompatibleSchema {
                location: self.location.clone(),
                missing,
            })
        }
    }

    /// Most recent row for the entry's identity, if it was ever recorded.
    pub async fn lookup(&self, entry: &Entry) -> Result<Option<LedgerEntry>> {
        let identity = self.identities.derive(entry)?;
        self.latest(&identity.source_site, &identity.external_id).await
    }

    /// Most recent row for a raw key.
    pub async fn latest(&self, site: &str, id: &str) -> Result<Option<LedgerEntry>> {
        let sql = format!(
            "{} WHERE id = ? AND extractor = ? ORDER BY timestamp DESC, seq DESC LIMIT 1",
            SELECT_ROWS
        );
        let row: Option<HistoryRow> = sqlx::query_as(&sql)
            .bind(id)
            .bind(site)
            .fetch_optional(&self.pool)
            .await?;

        row.map(LedgerEntry::try_from).transpose()
    }

    /// Every row for a key, most recent first.
    pub async fn history(&self, site: &str, id: &str) -> Result<Vec<LedgerEntry>> {
        let sql = format!(
            "{} WHERE id = ? AND extractor = ? ORDER BY timestamp DESC, seq DESC",
            SELECT_ROWS
        );
        let rows: Vec<HistoryRow> = sqlx::query_as(&sql)
            .bind(id)
            .bind(site)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(LedgerEntry::try_from).collect()
    }

    /// Append the outcome of processing `entry` for source `group`.
    pub async fn record(&self, group: &str, entry: &Entry, state: EntryState) -> Result<LedgerEntry> {
        let identity = self.identities.derive(entry)?;
        self.append(
            Some(group),
            &identity.source_site,
            &identity.external_id,
            Some(&identity.caption),
            state,
        )
        .await
    }

    /// Append a retry marker so the next sync attempts the item again.
    pub async fn request_retry(&self, group: Option<&str>, site: &str, id: &str) -> Result<LedgerEntry> {
        let caption = self
            .latest(site, id)
            .await?
            .and_then(|row| row.caption);
        self.append(group, site, id, caption.as_deref(), EntryState::RetryRequested)
            .await
    }

    async fn append(
        &self,
        group: Option<&str>,
        site: &str,
        id: &str,
        caption: Option<&str>,
        state: EntryState,
    ) -> Result<LedgerEntry> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            "INSERT INTO history (id, extractor, group_name, caption, state) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(id)
        .bind(site)
        .bind(group)
        .bind(caption)
        .bind(state.as_i64())
        .execute(&mut *tx)
        .await?;

        let sql = format!("{} WHERE seq = ?", SELECT_ROWS);
        let row: HistoryRow = sqlx::query_as(&sql)
            .bind(inserted.last_insert_rowid())
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        LedgerEntry::try_from(row)
    }

    /// Number of rows, all keys included.
    pub async fn len(&self) -> Result<i64> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM history")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.0)
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}
