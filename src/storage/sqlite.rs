use crate::model::{BaselineSnapshot, ChangeSnapshot, HistoryEntry, StorageError, Target};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, Row, params};

/// Size cap of the per-target history window.
pub const HISTORY_WINDOW: usize = 5;

/// Field set for a new change snapshot.
pub struct NewSnapshot<'a> {
    pub target_id: i64,
    pub predecessor_id: Option<i64>,
    pub full_content: &'a str,
    pub content_hash: &'a str,
    pub diff: Option<&'a str>,
    pub summary: Option<&'a str>,
    pub price: Option<&'a str>,
    pub price_amount: Option<&'a str>,
    pub price_currency: Option<&'a str>,
}

pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Opens the database file and runs migrations.
    pub fn new(db_path: &str) -> Result<Self, StorageError> {
        Self::init(Connection::open(db_path)?)
    }

    /// Private database for tests.
    pub fn new_in_memory() -> Result<Self, StorageError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StorageError> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS targets (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                url TEXT NOT NULL UNIQUE,
                name TEXT NOT NULL,
                tag TEXT,
                is_active INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL,
                last_checked TEXT,
                last_error TEXT
            );

            CREATE TABLE IF NOT EXISTS baselines (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                target_id INTEGER NOT NULL UNIQUE REFERENCES targets(id),
                full_content TEXT NOT NULL,
                content_hash TEXT NOT NULL,
                screenshot TEXT,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS snapshots (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                target_id INTEGER NOT NULL REFERENCES targets(id),
                predecessor_id INTEGER REFERENCES snapshots(id),
                full_content TEXT NOT NULL,
                content_hash TEXT NOT NULL,
                diff TEXT,
                summary TEXT,
                screenshot TEXT,
                checked_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_snapshots_target ON snapshots(target_id, id);

            CREATE TABLE IF NOT EXISTS history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                target_id INTEGER NOT NULL REFERENCES targets(id),
                content TEXT NOT NULL,
                content_hash TEXT NOT NULL,
                summary TEXT,
                screenshot TEXT,
                checked_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_history_target ON history(target_id, checked_at);
            ",
        )?;

        // Price columns arrived after the initial schema.
        for table in ["snapshots", "history"] {
            Self::migrate_add_column_if_missing(&conn, table, "price", "TEXT")?;
            Self::migrate_add_column_if_missing(&conn, table, "price_amount", "TEXT")?;
            Self::migrate_add_column_if_missing(&conn, table, "price_currency", "TEXT")?;
        }

        Ok(Self { conn })
    }

    /// Adds the column if the table does not have it yet.
    fn migrate_add_column_if_missing(
        conn: &Connection,
        table: &str,
        column: &str,
        column_def: &str,
    ) -> Result<(), StorageError> {
        let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
        let existing_columns: Vec<String> = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<Result<_, _>>()?;

        if !existing_columns.iter().any(|c| c == column) {
            let alter_sql = format!("ALTER TABLE {} ADD COLUMN {} {}", table, column, column_def);
            conn.execute(&alter_sql, [])?;
        }

        Ok(())
    }

    // --- targets ---

    /// Inserts the target if its URL is new, otherwise refreshes name and
    /// tag. Returns the stored row either way.
    pub fn upsert_target(
        &self,
        url: &str,
        name: &str,
        tag: Option<&str>,
    ) -> Result<Target, StorageError> {
        self.conn.execute(
            "INSERT INTO targets (url, name, tag, is_active, created_at)
             VALUES (?1, ?2, ?3, 1, ?4)
             ON CONFLICT(url) DO UPDATE SET name = ?2, tag = ?3",
            params![url, name, tag, Utc::now().to_rfc3339()],
        )?;
        self.get_target_by_url(url)?.ok_or(StorageError::NotFound)
    }

    pub fn get_target(&self, target_id: i64) -> Result<Option<Target>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, url, name, tag, is_active, created_at, last_checked, last_error
             FROM targets WHERE id = ?1",
        )?;
        let mut rows = stmt.query(params![target_id])?;
        match rows.next()? {
            Some(row) => Ok(Some(Self::map_target(row)?)),
            None => Ok(None),
        }
    }

    pub fn get_target_by_url(&self, url: &str) -> Result<Option<Target>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, url, name, tag, is_active, created_at, last_checked, last_error
             FROM targets WHERE url = ?1",
        )?;
        let mut rows = stmt.query(params![url])?;
        match rows.next()? {
            Some(row) => Ok(Some(Self::map_target(row)?)),
            None => Ok(None),
        }
    }

    pub fn list_active_targets(&self) -> Result<Vec<Target>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, url, name, tag, is_active, created_at, last_checked, last_error
             FROM targets WHERE is_active = 1 ORDER BY id ASC",
        )?;
        let rows = stmt.query_map([], |row| Self::map_target(row))?;
        let mut targets = Vec::new();
        for target in rows {
            targets.push(target?);
        }
        Ok(targets)
    }

    /// Records a successful check: bumps last_checked, clears last_error.
    pub fn mark_target_checked(&self, target_id: i64) -> Result<(), StorageError> {
        self.conn.execute(
            "UPDATE targets SET last_checked = ?1, last_error = NULL WHERE id = ?2",
            params![Utc::now().to_rfc3339(), target_id],
        )?;
        Ok(())
    }

    /// Records a failed check on the target; no snapshot rows change.
    pub fn mark_target_error(&self, target_id: i64, error: &str) -> Result<(), StorageError> {
        self.conn.execute(
            "UPDATE targets SET last_error = ?1 WHERE id = ?2",
            params![error, target_id],
        )?;
        Ok(())
    }

    /// Removes the target with its baseline, snapshot chain and history
    /// window. Returns the screenshot artifacts that should be deleted
    /// from disk.
    pub fn delete_target(&mut self, target_id: i64) -> Result<Vec<String>, StorageError> {
        let tx = self.conn.transaction()?;

        let mut screenshots = Vec::new();
        {
            let mut stmt = tx.prepare(
                "SELECT screenshot FROM baselines WHERE target_id = ?1 AND screenshot IS NOT NULL
                 UNION ALL
                 SELECT screenshot FROM snapshots WHERE target_id = ?1 AND screenshot IS NOT NULL
                 UNION ALL
                 SELECT screenshot FROM history WHERE target_id = ?1 AND screenshot IS NOT NULL",
            )?;
            let rows = stmt.query_map(params![target_id], |row| row.get::<_, String>(0))?;
            for name in rows {
                screenshots.push(name?);
            }
        }

        tx.execute("DELETE FROM history WHERE target_id = ?1", params![target_id])?;
        tx.execute(
            "DELETE FROM snapshots WHERE target_id = ?1",
            params![target_id],
        )?;
        tx.execute(
            "DELETE FROM baselines WHERE target_id = ?1",
            params![target_id],
        )?;
        tx.execute("DELETE FROM targets WHERE id = ?1", params![target_id])?;

        tx.commit()?;
        Ok(screenshots)
    }

    // --- baselines ---

    pub fn get_baseline(&self, target_id: i64) -> Result<Option<BaselineSnapshot>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, target_id, full_content, content_hash, screenshot, created_at
             FROM baselines WHERE target_id = ?1",
        )?;
        let mut rows = stmt.query(params![target_id])?;
        match rows.next()? {
            Some(row) => Ok(Some(Self::map_baseline(row)?)),
            None => Ok(None),
        }
    }

    pub fn create_baseline(
        &self,
        target_id: i64,
        full_content: &str,
        content_hash: &str,
    ) -> Result<BaselineSnapshot, StorageError> {
        self.conn.execute(
            "INSERT INTO baselines (target_id, full_content, content_hash, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![target_id, full_content, content_hash, Utc::now().to_rfc3339()],
        )?;
        self.get_baseline(target_id)?.ok_or(StorageError::NotFound)
    }

    pub fn update_baseline_screenshot(
        &self,
        baseline_id: i64,
        filename: &str,
    ) -> Result<(), StorageError> {
        self.conn.execute(
            "UPDATE baselines SET screenshot = ?1 WHERE id = ?2",
            params![filename, baseline_id],
        )?;
        Ok(())
    }

    // --- change snapshots ---

    /// Most recent change snapshot for the target; indexed lookup.
    pub fn latest_snapshot(&self, target_id: i64) -> Result<Option<ChangeSnapshot>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, target_id, predecessor_id, full_content, content_hash, diff, summary,
                    price, price_amount, price_currency, screenshot, checked_at
             FROM snapshots WHERE target_id = ?1 ORDER BY id DESC LIMIT 1",
        )?;
        let mut rows = stmt.query(params![target_id])?;
        match rows.next()? {
            Some(row) => Ok(Some(Self::map_snapshot(row)?)),
            None => Ok(None),
        }
    }

    pub fn get_snapshot(&self, snapshot_id: i64) -> Result<Option<ChangeSnapshot>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, target_id, predecessor_id, full_content, content_hash, diff, summary,
                    price, price_amount, price_currency, screenshot, checked_at
             FROM snapshots WHERE id = ?1",
        )?;
        let mut rows = stmt.query(params![snapshot_id])?;
        match rows.next()? {
            Some(row) => Ok(Some(Self::map_snapshot(row)?)),
            None => Ok(None),
        }
    }

    /// Follows the predecessor reference of a change snapshot.
    pub fn get_predecessor(
        &self,
        snapshot_id: i64,
    ) -> Result<Option<ChangeSnapshot>, StorageError> {
        match self.get_snapshot(snapshot_id)? {
            Some(snapshot) => match snapshot.predecessor_id {
                Some(predecessor_id) => self.get_snapshot(predecessor_id),
                None => Ok(None),
            },
            None => Ok(None),
        }
    }

    pub fn create_snapshot(&self, new: &NewSnapshot<'_>) -> Result<ChangeSnapshot, StorageError> {
        self.conn.execute(
            "INSERT INTO snapshots (
                target_id, predecessor_id, full_content, content_hash,
                diff, summary, price, price_amount, price_currency, checked_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                new.target_id,
                new.predecessor_id,
                new.full_content,
                new.content_hash,
                new.diff,
                new.summary,
                new.price,
                new.price_amount,
                new.price_currency,
                Utc::now().to_rfc3339(),
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        self.get_snapshot(id)?.ok_or(StorageError::NotFound)
    }

    pub fn update_snapshot_screenshot(
        &self,
        snapshot_id: i64,
        filename: &str,
    ) -> Result<(), StorageError> {
        self.conn.execute(
            "UPDATE snapshots SET screenshot = ?1 WHERE id = ?2",
            params![filename, snapshot_id],
        )?;
        Ok(())
    }

    // --- history window ---

    /// Most recent window entries, newest first.
    pub fn recent_history(
        &self,
        target_id: i64,
        limit: usize,
    ) -> Result<Vec<HistoryEntry>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, target_id, content, content_hash, summary,
                    price, price_amount, price_currency, screenshot, checked_at
             FROM history WHERE target_id = ?1
             ORDER BY checked_at DESC, id DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![target_id, limit], |row| Self::map_history(row))?;
        let mut entries = Vec::new();
        for entry in rows {
            entries.push(entry?);
        }
        Ok(entries)
    }

    pub fn get_history_entry(
        &self,
        history_id: i64,
    ) -> Result<Option<HistoryEntry>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, target_id, content, content_hash, summary,
                    price, price_amount, price_currency, screenshot, checked_at
             FROM history WHERE id = ?1",
        )?;
        let mut rows = stmt.query(params![history_id])?;
        match rows.next()? {
            Some(row) => Ok(Some(Self::map_history(row)?)),
            None => Ok(None),
        }
    }

    /// Entry immediately preceding the given one within the same window.
    pub fn previous_history_entry(
        &self,
        target_id: i64,
        history_id: i64,
    ) -> Result<Option<HistoryEntry>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, target_id, content, content_hash, summary,
                    price, price_amount, price_currency, screenshot, checked_at
             FROM history WHERE target_id = ?1 AND id < ?2
             ORDER BY id DESC LIMIT 1",
        )?;
        let mut rows = stmt.query(params![target_id, history_id])?;
        match rows.next()? {
            Some(row) => Ok(Some(Self::map_history(row)?)),
            None => Ok(None),
        }
    }

    /// Whether the entry is the oldest one retained for its target.
    pub fn is_oldest_history_entry(
        &self,
        target_id: i64,
        history_id: i64,
    ) -> Result<bool, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT id FROM history WHERE target_id = ?1 ORDER BY checked_at ASC, id ASC LIMIT 1",
        )?;
        let mut rows = stmt.query(params![target_id])?;
        match rows.next()? {
            Some(row) => Ok(row.get::<_, i64>(0)? == history_id),
            None => Ok(false),
        }
    }

    /// Appends a window entry and evicts down to the cap in the same
    /// transaction. Returns the new entry plus the screenshot artifacts
    /// of evicted rows, which the caller deletes from disk.
    pub fn create_history_entry(
        &mut self,
        target_id: i64,
        content: &str,
        content_hash: &str,
        summary: Option<&str>,
        price: Option<&str>,
        price_amount: Option<&str>,
        price_currency: Option<&str>,
    ) -> Result<(HistoryEntry, Vec<String>), StorageError> {
        let tx = self.conn.transaction()?;

        tx.execute(
            "INSERT INTO history (
                target_id, content, content_hash, summary,
                price, price_amount, price_currency, checked_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                target_id,
                content,
                content_hash,
                summary,
                price,
                price_amount,
                price_currency,
                Utc::now().to_rfc3339(),
            ],
        )?;
        let id = tx.last_insert_rowid();

        let count: usize = tx.query_row(
            "SELECT COUNT(*) FROM history WHERE target_id = ?1",
            params![target_id],
            |row| row.get(0),
        )?;

        let mut evicted_screenshots = Vec::new();
        if count > HISTORY_WINDOW {
            let excess = count - HISTORY_WINDOW;
            let mut doomed: Vec<(i64, Option<String>)> = Vec::new();
            {
                let mut stmt = tx.prepare(
                    "SELECT id, screenshot FROM history WHERE target_id = ?1
                     ORDER BY checked_at ASC, id ASC LIMIT ?2",
                )?;
                let rows = stmt.query_map(params![target_id, excess], |row| {
                    Ok((row.get::<_, i64>(0)?, row.get::<_, Option<String>>(1)?))
                })?;
                for row in rows {
                    doomed.push(row?);
                }
            }
            for (doomed_id, screenshot) in doomed {
                tx.execute("DELETE FROM history WHERE id = ?1", params![doomed_id])?;
                if let Some(screenshot) = screenshot {
                    evicted_screenshots.push(screenshot);
                }
            }
        }

        let entry = {
            let mut stmt = tx.prepare(
                "SELECT id, target_id, content, content_hash, summary,
                        price, price_amount, price_currency, screenshot, checked_at
                 FROM history WHERE id = ?1",
            )?;
            let mut rows = stmt.query(params![id])?;
            match rows.next()? {
                Some(row) => Self::map_history(row)?,
                None => return Err(StorageError::NotFound),
            }
        };

        tx.commit()?;
        Ok((entry, evicted_screenshots))
    }

    pub fn update_history_screenshot(
        &self,
        history_id: i64,
        filename: &str,
    ) -> Result<(), StorageError> {
        self.conn.execute(
            "UPDATE history SET screenshot = ?1 WHERE id = ?2",
            params![filename, history_id],
        )?;
        Ok(())
    }

    // --- row mapping ---

    fn map_target(row: &Row) -> Result<Target, rusqlite::Error> {
        Ok(Target {
            id: row.get(0)?,
            url: row.get(1)?,
            name: row.get(2)?,
            tag: row.get(3)?,
            is_active: row.get::<_, i64>(4)? != 0,
            created_at: Self::parse_datetime(row, 5)?,
            last_checked: Self::parse_optional_datetime(row, 6)?,
            last_error: row.get(7)?,
        })
    }

    fn map_baseline(row: &Row) -> Result<BaselineSnapshot, rusqlite::Error> {
        Ok(BaselineSnapshot {
            id: row.get(0)?,
            target_id: row.get(1)?,
            full_content: row.get(2)?,
            content_hash: row.get(3)?,
            screenshot: row.get(4)?,
            created_at: Self::parse_datetime(row, 5)?,
        })
    }

    fn map_snapshot(row: &Row) -> Result<ChangeSnapshot, rusqlite::Error> {
        Ok(ChangeSnapshot {
            id: row.get(0)?,
            target_id: row.get(1)?,
            predecessor_id: row.get(2)?,
            full_content: row.get(3)?,
            content_hash: row.get(4)?,
            diff: row.get(5)?,
            summary: row.get(6)?,
            price: row.get(7)?,
            price_amount: row.get(8)?,
            price_currency: row.get(9)?,
            screenshot: row.get(10)?,
            checked_at: Self::parse_datetime(row, 11)?,
        })
    }

    fn map_history(row: &Row) -> Result<HistoryEntry, rusqlite::Error> {
        Ok(HistoryEntry {
            id: row.get(0)?,
            target_id: row.get(1)?,
            content: row.get(2)?,
            content_hash: row.get(3)?,
            summary: row.get(4)?,
            price: row.get(5)?,
            price_amount: row.get(6)?,
            price_currency: row.get(7)?,
            screenshot: row.get(8)?,
            checked_at: Self::parse_datetime(row, 9)?,
        })
    }

    fn parse_datetime(row: &Row, idx: usize) -> Result<DateTime<Utc>, rusqlite::Error> {
        let text: String = row.get(idx)?;
        text.parse().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                idx,
                rusqlite::types::Type::Text,
                Box::new(e),
            )
        })
    }

    fn parse_optional_datetime(
        row: &Row,
        idx: usize,
    ) -> Result<Option<DateTime<Utc>>, rusqlite::Error> {
        let text: Option<String> = row.get(idx)?;
        match text {
            Some(text) => {
                let parsed = text.parse().map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(
                        idx,
                        rusqlite::types::Type::Text,
                        Box::new(e),
                    )
                })?;
                Ok(Some(parsed))
            }
            None => Ok(None),
        }
    }
}
