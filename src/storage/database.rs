//! SQLite-backed Persistence Store, pooled and panic-safe.
//!
//! One file holds three tables: `documents`, `global_analyses`,
//! `page_analyses`, plus `vector_chunks` (read/written by
//! [`crate::vectorstore`] through the same pool). WAL mode, version-tracked
//! migrations, prepared statements.

use std::path::Path;
use std::sync::Arc;

use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, OptionalExtension, params};

use crate::types::{Document, DocumentId, GlobalAnalysis, PageAnalysis, PipelineError, Result, ResultExt};

pub type SharedDatabase = Arc<Database>;

const SCHEMA: &str = include_str!("schema.sql");
const SCHEMA_VERSION: u32 = 1;

/// Connection pool sizing, scaled off available CPU cores.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub max_size: u32,
    pub min_idle: u32,
    pub connection_timeout_secs: u64,
}

impl PoolConfig {
    const MIN_POOL_SIZE: u32 = 4;
    const MAX_POOL_SIZE: u32 = 32;
    const POOL_SIZE_MULTIPLIER: f32 = 2.0;

    pub fn optimal_pool_size() -> u32 {
        let cores = std::thread::available_parallelism().map(|p| p.get() as u32).unwrap_or(4);
        ((cores as f32 * Self::POOL_SIZE_MULTIPLIER) as u32).clamp(Self::MIN_POOL_SIZE, Self::MAX_POOL_SIZE)
    }

    pub fn auto() -> Self {
        let max_size = Self::optimal_pool_size();
        Self {
            max_size,
            min_idle: (max_size / 4).max(2),
            connection_timeout_secs: 30,
        }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::auto()
    }
}

/// Thread-safe pooled handle onto the pipeline's SQLite database.
pub struct Database {
    pool: Pool<SqliteConnectionManager>,
}

impl Database {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_config(path, PoolConfig::default())
    }

    pub fn open_with_config<P: AsRef<Path>>(path: P, config: PoolConfig) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let manager = SqliteConnectionManager::file(path.as_ref()).with_init(Self::configure_connection);
        let pool = Pool::builder()
            .max_size(config.max_size)
            .min_idle(Some(config.min_idle))
            .connection_timeout(std::time::Duration::from_secs(config.connection_timeout_secs))
            .build(manager)
            .map_err(PipelineError::from)?;

        let db = Self { pool };
        db.initialize()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let manager = SqliteConnectionManager::memory().with_init(|conn| {
            conn.execute_batch("PRAGMA foreign_keys = ON;")?;
            Ok(())
        });
        let pool = Pool::builder().max_size(1).build(manager).map_err(PipelineError::from)?;
        let db = Self { pool };
        db.initialize()?;
        Ok(db)
    }

    fn configure_connection(conn: &mut Connection) -> std::result::Result<(), rusqlite::Error> {
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA busy_timeout = 5000;
            "#,
        )
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>> {
        self.pool.get().map_err(PipelineError::from)
    }

    fn initialize(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.execute_batch(SCHEMA).with_context("failed to initialize schema")?;
        conn.pragma_update(None, "user_version", SCHEMA_VERSION)
            .with_context("failed to set schema version")?;
        Ok(())
    }

    /// Run `f` inside a transaction, rolling back on error or panic.
    pub fn transaction<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + std::panic::UnwindSafe,
    {
        let mut conn = self.conn()?;
        let tx = conn.transaction().with_context("failed to start transaction")?;

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| f(&tx)));

        match result {
            Ok(Ok(value)) => {
                tx.commit().with_context("failed to commit transaction")?;
                Ok(value)
            }
            Ok(Err(e)) => Err(e),
            Err(panic_payload) => {
                let panic_msg = panic_payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic_payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                tracing::error!(panic_msg, "transaction panicked, rolled back");
                Err(PipelineError::Config(format!("transaction panicked: {panic_msg}")))
            }
        }
    }

    /// Expose a raw pooled connection, for the vector store's chunk tables.
    pub fn connection(&self) -> Result<PooledConnection<SqliteConnectionManager>> {
        self.conn()
    }

    // -- documents ---------------------------------------------------------

    /// Insert `document` if its `content_hash` isn't already present;
    /// returns the id of the stored (possibly pre-existing) row. This is
    /// the content-addressed dedup contract: re-ingesting identical bytes
    /// is a no-op that returns the original id.
    pub fn upsert_document(&self, document: &Document) -> Result<DocumentId> {
        if let Some(existing) = self.find_document_id_by_hash(&document.content_hash)? {
            return Ok(existing);
        }

        let conn = self.conn()?;
        let document_json = serde_json::to_string(document)?;
        let now = chrono::Utc::now().to_rfc3339();

        conn.execute(
            "INSERT INTO documents (id, file_name, file_kind, content_hash, document_json, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                document.id.as_str(),
                document.file_name,
                document.file_kind.to_string(),
                document.content_hash,
                document_json,
                now,
            ],
        )
        .with_context("failed to insert document")?;

        Ok(document.id.clone())
    }

    pub fn find_document_id_by_hash(&self, content_hash: &str) -> Result<Option<DocumentId>> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT id FROM documents WHERE content_hash = ?1",
            params![content_hash],
            |row| row.get::<_, String>(0),
        )
        .optional()
        .with_context("failed to look up document by content hash")
        .map(|opt| opt.map(DocumentId::from))
    }

    pub fn get_document(&self, id: &DocumentId) -> Result<Option<Document>> {
        let conn = self.conn()?;
        let json: Option<String> = conn
            .query_row(
                "SELECT document_json FROM documents WHERE id = ?1",
                params![id.as_str()],
                |row| row.get(0),
            )
            .optional()
            .with_context("failed to fetch document")?;

        json.map(|j| serde_json::from_str(&j).map_err(PipelineError::from)).transpose()
    }

    // -- global analyses -----------------------------------------------------

    pub fn upsert_global_analysis(&self, document_id: &DocumentId, analysis: &GlobalAnalysis) -> Result<()> {
        let conn = self.conn()?;
        let json = serde_json::to_string(analysis)?;
        let now = chrono::Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO global_analyses (document_id, analysis_json, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(document_id) DO UPDATE SET analysis_json = excluded.analysis_json, updated_at = excluded.updated_at",
            params![document_id.as_str(), json, now],
        )
        .with_context("failed to upsert global analysis")?;
        Ok(())
    }

    pub fn get_global_analysis(&self, document_id: &DocumentId) -> Result<Option<GlobalAnalysis>> {
        let conn = self.conn()?;
        let json: Option<String> = conn
            .query_row(
                "SELECT analysis_json FROM global_analyses WHERE document_id = ?1",
                params![document_id.as_str()],
                |row| row.get(0),
            )
            .optional()
            .with_context("failed to fetch global analysis")?;
        json.map(|j| serde_json::from_str(&j).map_err(PipelineError::from)).transpose()
    }

    // -- page analyses -------------------------------------------------------

    pub fn upsert_page_analysis(
        &self,
        document_id: &DocumentId,
        page_number: u32,
        analysis: &PageAnalysis,
    ) -> Result<()> {
        let conn = self.conn()?;
        let json = serde_json::to_string(analysis)?;
        let now = chrono::Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO page_analyses (document_id, page_number, analysis_json, revision_count, updated_at)
             VALUES (?1, ?2, ?3, 0, ?4)
             ON CONFLICT(document_id, page_number) DO UPDATE SET
                analysis_json = excluded.analysis_json,
                revision_count = page_analyses.revision_count + 1,
                updated_at = excluded.updated_at",
            params![document_id.as_str(), page_number, json, now],
        )
        .with_context("failed to upsert page analysis")?;
        Ok(())
    }

    pub fn get_page_analysis(&self, document_id: &DocumentId, page_number: u32) -> Result<Option<PageAnalysis>> {
        let conn = self.conn()?;
        let json: Option<String> = conn
            .query_row(
                "SELECT analysis_json FROM page_analyses WHERE document_id = ?1 AND page_number = ?2",
                params![document_id.as_str(), page_number],
                |row| row.get(0),
            )
            .optional()
            .with_context("failed to fetch page analysis")?;
        json.map(|j| serde_json::from_str(&j).map_err(PipelineError::from)).transpose()
    }

    pub fn revision_count(&self, document_id: &DocumentId, page_number: u32) -> Result<u32> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT revision_count FROM page_analyses WHERE document_id = ?1 AND page_number = ?2",
            params![document_id.as_str(), page_number],
            |row| row.get::<_, i64>(0),
        )
        .optional()
        .with_context("failed to fetch revision count")
        .map(|opt| opt.unwrap_or(0) as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FileKind, content_hash};

    fn sample_document() -> Document {
        Document {
            id: DocumentId::generate(),
            file_name: "deck.pptx".into(),
            file_kind: FileKind::Deck,
            content_hash: content_hash(b"sample bytes"),
            pages: vec![],
            global_analysis: None,
        }
    }

    #[test]
    fn upsert_document_is_idempotent_by_content_hash() {
        let db = Database::open_in_memory().unwrap();
        let doc = sample_document();
        let first = db.upsert_document(&doc).unwrap();

        let mut duplicate = sample_document();
        duplicate.content_hash = doc.content_hash.clone();
        let second = db.upsert_document(&duplicate).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn round_trips_a_document() {
        let db = Database::open_in_memory().unwrap();
        let doc = sample_document();
        let id = db.upsert_document(&doc).unwrap();
        let fetched = db.get_document(&id).unwrap().unwrap();
        assert_eq!(fetched.file_name, "deck.pptx");
    }

    #[test]
    fn page_analysis_revision_count_increments_on_update() {
        let db = Database::open_in_memory().unwrap();
        let doc = sample_document();
        let id = db.upsert_document(&doc).unwrap();

        let analysis = PageAnalysis {
            page_number: 1,
            clusters: vec![],
            notes: String::new(),
            gaps: vec![],
            expansions: vec![],
            references: vec![],
            check_result: crate::types::CheckResult::pass(),
            final_notes: String::new(),
            revision_count: 0,
        };

        db.upsert_page_analysis(&id, 1, &analysis).unwrap();
        assert_eq!(db.revision_count(&id, 1).unwrap(), 0);
        db.upsert_page_analysis(&id, 1, &analysis).unwrap();
        assert_eq!(db.revision_count(&id, 1).unwrap(), 1);
    }

    #[test]
    fn transaction_rolls_back_on_error() {
        let db = Database::open_in_memory().unwrap();
        let doc = sample_document();

        let result: Result<()> = db.transaction(|conn| {
            conn.execute(
                "INSERT INTO documents (id, file_name, file_kind, content_hash, document_json, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![doc.id.as_str(), doc.file_name, "deck", doc.content_hash, "{}", "now"],
            )?;
            Err(PipelineError::Config("deliberate failure".into()))
        });

        assert!(result.is_err());
        assert!(db.get_document(&doc.id).unwrap().is_none());
    }
}
