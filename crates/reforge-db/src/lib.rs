//! Object store for reforge.
//!
//! Provides a `Database` that owns the SQLite connection and hands out
//! the [`Objects`] store. Every version of every object's code is kept,
//! so rollbacks can restore any earlier body.

mod leases;
mod model;
mod objects;

pub use leases::ObjectLease;
pub use model::{
    DeploymentRecord, ModifiableObject, ModificationRecord, ObjectStatus, RollbackRecord,
};
pub use objects::Objects;

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;

/// How long a writer waits on another process's transaction
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Stored history is unreadable: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Corrupt object record: {0}")]
    Corrupt(String),

    #[error("Invalid object id: '{0}'")]
    InvalidId(String),

    #[error("Object '{0}' not found")]
    NotFound(String),

    #[error("Object '{0}' already exists")]
    AlreadyExists(String),

    #[error("Object '{id}' is at version {actual}, expected {expected}")]
    VersionConflict { id: String, expected: u64, actual: u64 },

    #[error("Object '{id}' has no earlier version {version}")]
    VersionNotFound { id: String, version: u64 },

    #[error("Object '{id}' is {status} and cannot be changed")]
    InvalidState { id: String, status: ObjectStatus },

    #[error("Object '{id}' is already being modified ({holder}, lease expires {expires_at})")]
    Leased {
        id: String,
        holder: String,
        expires_at: DateTime<Utc>,
    },
}

/// The main database struct that owns the SQLite connection.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open or create a database at the default location.
    ///
    /// The default location is `~/.local/share/reforge/reforge.db`.
    pub fn open() -> Result<Self, StoreError> {
        let db_path = Self::default_path();

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).ok();
        }

        Self::open_at(&db_path)
    }

    /// Open or create a database at a specific path.
    pub fn open_at(path: &std::path::Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (useful for testing).
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn default_path() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("reforge")
            .join("reforge.db")
    }

    /// Access the objects store.
    pub fn objects(&self) -> Objects<'_> {
        let conn = self.conn.lock().expect("Database lock poisoned");
        Objects::new(conn)
    }

    fn init_schema(conn: &Connection) -> Result<(), rusqlite::Error> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS objects (
                id TEXT PRIMARY KEY,
                code TEXT NOT NULL,
                api_schema TEXT,
                version INTEGER NOT NULL,
                status TEXT NOT NULL,
                modification_history TEXT NOT NULL,
                deployment_history TEXT NOT NULL,
                rollback_history TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS object_versions (
                object_id TEXT NOT NULL,
                version INTEGER NOT NULL,
                code TEXT NOT NULL,
                created_at TEXT NOT NULL,
                PRIMARY KEY (object_id, version)
            );

            CREATE TABLE IF NOT EXISTS object_leases (
                object_id TEXT PRIMARY KEY,
                holder TEXT NOT NULL,
                acquired_at TEXT NOT NULL,
                expires_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_objects_status ON objects(status);
            "#,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_get() {
        let db = Database::open_in_memory().unwrap();
        let created = db
            .objects()
            .create("counter", "let n = 0;", Some(r#"{"n": "int"}"#))
            .unwrap();

        assert_eq!(created.version, 1);
        assert_eq!(created.status, ObjectStatus::Draft);
        assert!(created.modification_history.is_empty());

        let fetched = db.objects().get("counter").unwrap().unwrap();
        assert_eq!(fetched, created);
        assert!(db.objects().get("missing").unwrap().is_none());
    }

    #[test]
    fn test_create_rejects_duplicates_and_bad_ids() {
        let db = Database::open_in_memory().unwrap();
        db.objects().create("a", "", None).unwrap();

        assert!(matches!(
            db.objects().create("a", "", None),
            Err(StoreError::AlreadyExists(_))
        ));
        assert!(matches!(
            db.objects().create("has space", "", None),
            Err(StoreError::InvalidId(_))
        ));
        assert!(matches!(
            db.objects().create("", "", None),
            Err(StoreError::InvalidId(_))
        ));
    }

    #[test]
    fn test_apply_modification_bumps_version_and_records_history() {
        let db = Database::open_in_memory().unwrap();
        db.objects().create("obj", "v1 code", None).unwrap();

        let updated = db
            .objects()
            .apply_modification("obj", 1, "v2 code", "make it better", "Improved")
            .unwrap();

        assert_eq!(updated.version, 2);
        assert_eq!(updated.code, "v2 code");
        let record = &updated.modification_history[0];
        assert_eq!(record.previous_version, 1);
        assert_eq!(record.prompt, "make it better");
        assert_eq!(record.summary, "Improved");
        assert_eq!(
            db.objects().code_at("obj", 1).unwrap().as_deref(),
            Some("v1 code")
        );
    }

    #[test]
    fn test_stale_version_is_a_conflict() {
        let db = Database::open_in_memory().unwrap();
        db.objects().create("obj", "v1", None).unwrap();
        db.objects()
            .apply_modification("obj", 1, "v2", "first", "first")
            .unwrap();

        let err = db
            .objects()
            .apply_modification("obj", 1, "v2 again", "second", "second")
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::VersionConflict {
                expected: 1,
                actual: 2,
                ..
            }
        ));
        assert_eq!(db.objects().require("obj").unwrap().code, "v2");
    }

    #[test]
    fn test_deprecated_objects_refuse_changes() {
        let db = Database::open_in_memory().unwrap();
        db.objects().create("old", "code", None).unwrap();
        db.objects()
            .set_status("old", ObjectStatus::Deprecated)
            .unwrap();

        assert!(matches!(
            db.objects().apply_modification("old", 1, "new", "p", "s"),
            Err(StoreError::InvalidState { .. })
        ));
    }

    #[test]
    fn test_rollback_creates_new_version() {
        let db = Database::open_in_memory().unwrap();
        db.objects().create("obj", "one", None).unwrap();
        db.objects()
            .apply_modification("obj", 1, "two", "p", "s")
            .unwrap();
        db.objects()
            .apply_modification("obj", 2, "three", "p", "s")
            .unwrap();

        let rolled = db.objects().rollback("obj", 1, Some("regression")).unwrap();
        assert_eq!(rolled.version, 4);
        assert_eq!(rolled.code, "one");
        assert_eq!(rolled.rollback_history[0].from_version, 3);
        assert_eq!(rolled.rollback_history[0].to_version, 1);
        assert_eq!(db.objects().versions("obj").unwrap(), vec![1, 2, 3, 4]);

        assert!(matches!(
            db.objects().rollback("obj", 4, None),
            Err(StoreError::VersionNotFound { version: 4, .. })
        ));
    }

    #[test]
    fn test_record_deployment_marks_deployed() {
        let db = Database::open_in_memory().unwrap();
        db.objects().create("svc", "code", None).unwrap();

        let record = db.objects().record_deployment("svc", "production").unwrap();
        assert_eq!(record.version, 1);

        let object = db.objects().require("svc").unwrap();
        assert_eq!(object.status, ObjectStatus::Deployed);
        assert_eq!(object.deployment_history, vec![record]);
    }

    #[test]
    fn test_list_and_delete() {
        let db = Database::open_in_memory().unwrap();
        db.objects().create("b", "", None).unwrap();
        db.objects().create("a", "", None).unwrap();
        db.objects().set_status("b", ObjectStatus::Active).unwrap();

        let all = db.objects().list(None).unwrap();
        assert_eq!(
            all.iter().map(|o| o.id.as_str()).collect::<Vec<_>>(),
            vec!["a", "b"]
        );
        let active = db.objects().list(Some(ObjectStatus::Active)).unwrap();
        assert_eq!(active.len(), 1);

        assert!(db.objects().delete("a").unwrap());
        assert!(!db.objects().delete("a").unwrap());
        assert!(db.objects().code_at("a", 1).unwrap().is_none());
        assert!(matches!(
            db.objects().set_status("a", ObjectStatus::Active),
            Err(StoreError::NotFound(_))
        ));
    }
}
