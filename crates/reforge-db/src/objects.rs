//! Objects store: versioned code objects and their history.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::MutexGuard;

use crate::{
    DeploymentRecord, ModifiableObject, ModificationRecord, ObjectStatus, RollbackRecord,
    StoreError,
};

const SELECT_COLUMNS: &str = "SELECT id, code, api_schema, version, status, modification_history, deployment_history, rollback_history, created_at, updated_at FROM objects";

/// Objects store with a borrowed connection.
pub struct Objects<'db> {
    conn: MutexGuard<'db, Connection>,
}

impl<'db> Objects<'db> {
    pub(crate) fn new(conn: MutexGuard<'db, Connection>) -> Self {
        Self { conn }
    }

    /// Create a new object at version 1 in `draft` status.
    pub fn create(
        &self,
        id: &str,
        code: &str,
        api_schema: Option<&str>,
    ) -> Result<ModifiableObject, StoreError> {
        if id.trim().is_empty() || id.chars().any(char::is_whitespace) {
            return Err(StoreError::InvalidId(id.to_string()));
        }

        let tx = self.conn.unchecked_transaction()?;
        let exists: bool = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM objects WHERE id = ?1)",
            params![id],
            |row| row.get(0),
        )?;
        if exists {
            return Err(StoreError::AlreadyExists(id.to_string()));
        }

        let now = Utc::now();
        tx.execute(
            r#"
            INSERT INTO objects (id, code, api_schema, version, status, modification_history, deployment_history, rollback_history, created_at, updated_at)
            VALUES (?1, ?2, ?3, 1, ?4, '[]', '[]', '[]', ?5, ?5)
            "#,
            params![id, code, api_schema, ObjectStatus::Draft.as_str(), now.to_rfc3339()],
        )?;
        Self::insert_version(&tx, id, 1, code, now)?;
        tx.commit()?;

        self.require(id)
    }

    /// Get an object by ID.
    pub fn get(&self, id: &str) -> Result<Option<ModifiableObject>, StoreError> {
        let row = self
            .conn
            .query_row(
                &format!("{} WHERE id = ?1", SELECT_COLUMNS),
                params![id],
                RawObject::from_row,
            )
            .optional()?;
        row.map(RawObject::into_object).transpose()
    }

    /// Get an object by ID, failing if it does not exist.
    pub fn require(&self, id: &str) -> Result<ModifiableObject, StoreError> {
        self.get(id)?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    /// List all objects, optionally restricted to one status.
    pub fn list(&self, status: Option<ObjectStatus>) -> Result<Vec<ModifiableObject>, StoreError> {
        let mut sql = String::from(SELECT_COLUMNS);
        let mut param_values: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(status) = status {
            sql.push_str(" WHERE status = ?");
            param_values.push(Box::new(status.as_str()));
        }
        sql.push_str(" ORDER BY id");

        let params: Vec<&dyn rusqlite::ToSql> = param_values.iter().map(|p| p.as_ref()).collect();

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params.as_slice(), RawObject::from_row)?;

        let mut objects = Vec::new();
        for row in rows {
            objects.push(row?.into_object()?);
        }
        Ok(objects)
    }

    /// Delete an object and every stored version of it.
    pub fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute("DELETE FROM object_versions WHERE object_id = ?1", params![id])?;
        let rows_affected = tx.execute("DELETE FROM objects WHERE id = ?1", params![id])?;
        tx.commit()?;
        Ok(rows_affected > 0)
    }

    pub fn set_status(&self, id: &str, status: ObjectStatus) -> Result<(), StoreError> {
        let rows_affected = self.conn.execute(
            "UPDATE objects SET status = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, status.as_str(), Utc::now().to_rfc3339()],
        )?;
        if rows_affected == 0 {
            return Err(StoreError::NotFound(id.to_string()));
        }
        Ok(())
    }

    /// Commit an accepted candidate as the next version.
    ///
    /// Fails with [`StoreError::VersionConflict`] unless the object is still
    /// at `expected_version`, so two attempts that started from the same
    /// version cannot both land.
    pub fn apply_modification(
        &self,
        id: &str,
        expected_version: u64,
        code: &str,
        prompt: &str,
        summary: &str,
    ) -> Result<ModifiableObject, StoreError> {
        let tx = self.conn.unchecked_transaction()?;
        let mut object = Self::load(&tx, id)?;

        if !object.status.accepts_modifications() {
            return Err(StoreError::InvalidState {
                id: id.to_string(),
                status: object.status,
            });
        }
        if object.version != expected_version {
            return Err(StoreError::VersionConflict {
                id: id.to_string(),
                expected: expected_version,
                actual: object.version,
            });
        }

        let now = Utc::now();
        let new_version = object.version + 1;
        object.modification_history.push(ModificationRecord {
            timestamp: now,
            prompt: prompt.to_string(),
            previous_version: object.version,
            summary: summary.to_string(),
        });

        let rows_affected = tx.execute(
            r#"
            UPDATE objects SET code = ?3, version = ?4, modification_history = ?5, updated_at = ?6
            WHERE id = ?1 AND version = ?2
            "#,
            params![
                id,
                expected_version as i64,
                code,
                new_version as i64,
                serde_json::to_string(&object.modification_history)?,
                now.to_rfc3339(),
            ],
        )?;
        if rows_affected == 0 {
            return Err(StoreError::VersionConflict {
                id: id.to_string(),
                expected: expected_version,
                actual: object.version,
            });
        }
        Self::insert_version(&tx, id, new_version, code, now)?;
        tx.commit()?;

        self.require(id)
    }

    /// Record that the current version was deployed to `environment`.
    pub fn record_deployment(
        &self,
        id: &str,
        environment: &str,
    ) -> Result<DeploymentRecord, StoreError> {
        let tx = self.conn.unchecked_transaction()?;
        let mut object = Self::load(&tx, id)?;

        if !object.status.accepts_modifications() {
            return Err(StoreError::InvalidState {
                id: id.to_string(),
                status: object.status,
            });
        }

        let record = DeploymentRecord {
            timestamp: Utc::now(),
            version: object.version,
            environment: environment.to_string(),
        };
        object.deployment_history.push(record.clone());

        tx.execute(
            "UPDATE objects SET status = ?2, deployment_history = ?3, updated_at = ?4 WHERE id = ?1",
            params![
                id,
                ObjectStatus::Deployed.as_str(),
                serde_json::to_string(&object.deployment_history)?,
                record.timestamp.to_rfc3339(),
            ],
        )?;
        tx.commit()?;

        Ok(record)
    }

    /// Restore the code of `to_version` as a new version.
    ///
    /// Versions never go backwards: rolling back from v5 to v2 produces v6
    /// with the code of v2.
    pub fn rollback(
        &self,
        id: &str,
        to_version: u64,
        reason: Option<&str>,
    ) -> Result<ModifiableObject, StoreError> {
        let tx = self.conn.unchecked_transaction()?;
        let mut object = Self::load(&tx, id)?;

        if to_version >= object.version {
            return Err(StoreError::VersionNotFound {
                id: id.to_string(),
                version: to_version,
            });
        }
        let code = Self::load_version(&tx, id, to_version)?.ok_or_else(|| {
            StoreError::VersionNotFound {
                id: id.to_string(),
                version: to_version,
            }
        })?;

        let now = Utc::now();
        let new_version = object.version + 1;
        object.rollback_history.push(RollbackRecord {
            timestamp: now,
            from_version: object.version,
            to_version,
            reason: reason.map(String::from),
        });

        tx.execute(
            r#"
            UPDATE objects SET code = ?3, version = ?4, rollback_history = ?5, updated_at = ?6
            WHERE id = ?1 AND version = ?2
            "#,
            params![
                id,
                object.version as i64,
                code,
                new_version as i64,
                serde_json::to_string(&object.rollback_history)?,
                now.to_rfc3339(),
            ],
        )?;
        Self::insert_version(&tx, id, new_version, &code, now)?;
        tx.commit()?;

        self.require(id)
    }

    /// Code body as it was at `version`.
    pub fn code_at(&self, id: &str, version: u64) -> Result<Option<String>, StoreError> {
        Self::load_version(&self.conn, id, version)
    }

    /// All stored version numbers for an object, oldest first.
    pub fn versions(&self, id: &str) -> Result<Vec<u64>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT version FROM object_versions WHERE object_id = ?1 ORDER BY version")?;
        let rows = stmt.query_map(params![id], |row| row.get::<_, i64>(0))?;

        let mut versions = Vec::new();
        for row in rows {
            versions.push(row? as u64);
        }
        Ok(versions)
    }

    fn load(conn: &Connection, id: &str) -> Result<ModifiableObject, StoreError> {
        conn.query_row(
            &format!("{} WHERE id = ?1", SELECT_COLUMNS),
            params![id],
            RawObject::from_row,
        )
        .optional()?
        .ok_or_else(|| StoreError::NotFound(id.to_string()))?
        .into_object()
    }

    fn load_version(
        conn: &Connection,
        id: &str,
        version: u64,
    ) -> Result<Option<String>, StoreError> {
        Ok(conn
            .query_row(
                "SELECT code FROM object_versions WHERE object_id = ?1 AND version = ?2",
                params![id, version as i64],
                |row| row.get(0),
            )
            .optional()?)
    }

    fn insert_version(
        conn: &Connection,
        id: &str,
        version: u64,
        code: &str,
        created_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        conn.execute(
            "INSERT INTO object_versions (object_id, version, code, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![id, version as i64, code, created_at.to_rfc3339()],
        )?;
        Ok(())
    }
}

/// Row as stored, before the JSON history columns are decoded
struct RawObject {
    id: String,
    code: String,
    api_schema: Option<String>,
    version: i64,
    status: String,
    modification_history: String,
    deployment_history: String,
    rollback_history: String,
    created_at: String,
    updated_at: String,
}

impl RawObject {
    fn from_row(row: &rusqlite::Row) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get(0)?,
            code: row.get(1)?,
            api_schema: row.get(2)?,
            version: row.get(3)?,
            status: row.get(4)?,
            modification_history: row.get(5)?,
            deployment_history: row.get(6)?,
            rollback_history: row.get(7)?,
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
        })
    }

    fn into_object(self) -> Result<ModifiableObject, StoreError> {
        let status = self
            .status
            .parse::<ObjectStatus>()
            .map_err(StoreError::Corrupt)?;

        Ok(ModifiableObject {
            version: self.version as u64,
            status,
            modification_history: serde_json::from_str(&self.modification_history)?,
            deployment_history: serde_json::from_str(&self.deployment_history)?,
            rollback_history: serde_json::from_str(&self.rollback_history)?,
            created_at: parse_timestamp(&self.created_at),
            updated_at: parse_timestamp(&self.updated_at),
            id: self.id,
            code: self.code,
            api_schema: self.api_schema,
        })
    }
}

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
