//! Per-object modification leases.
//!
//! A lease is a row in `object_leases`, so it is seen by every process
//! that opens the same database file. It is released when the
//! [`ObjectLease`] guard drops, or taken over once it has expired.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, TransactionBehavior};
use tracing::warn;

use crate::{Database, StoreError};

static NEXT_LEASE: AtomicU64 = AtomicU64::new(1);

/// Exclusive right to run a modification attempt against one object
pub struct ObjectLease<'db> {
    db: &'db Database,
    object_id: String,
    holder: String,
}

impl ObjectLease<'_> {
    pub fn object_id(&self) -> &str {
        &self.object_id
    }

    pub fn holder(&self) -> &str {
        &self.holder
    }
}

impl fmt::Debug for ObjectLease<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectLease")
            .field("object_id", &self.object_id)
            .field("holder", &self.holder)
            .finish()
    }
}

impl Drop for ObjectLease<'_> {
    fn drop(&mut self) {
        let conn = self
            .db
            .conn
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Err(e) = conn.execute(
            "DELETE FROM object_leases WHERE object_id = ?1 AND holder = ?2",
            params![self.object_id, self.holder],
        ) {
            warn!(object_id = %self.object_id, error = %e, "Failed to release object lease");
        }
    }
}

impl Database {
    /// Take the modification lease on `id`, valid for `ttl`.
    ///
    /// Fails with [`StoreError::Leased`] while another unexpired lease is
    /// held, whether by this process or another one.
    pub fn acquire_lease(&self, id: &str, ttl: Duration) -> Result<ObjectLease<'_>, StoreError> {
        let now = Utc::now();
        let expires_at = now
            .timestamp_millis()
            .saturating_add(i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX));
        let holder = format!(
            "pid {} lease {}",
            std::process::id(),
            NEXT_LEASE.fetch_add(1, Ordering::Relaxed)
        );

        let mut conn = self.conn.lock().expect("Database lock poisoned");
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        tx.execute(
            "DELETE FROM object_leases WHERE object_id = ?1 AND expires_at <= ?2",
            params![id, now.timestamp_millis()],
        )?;
        let inserted = tx.execute(
            r#"
            INSERT OR IGNORE INTO object_leases (object_id, holder, acquired_at, expires_at)
            VALUES (?1, ?2, ?3, ?4)
            "#,
            params![id, holder, now.to_rfc3339(), expires_at],
        )?;

        if inserted == 0 {
            let current: Option<(String, i64)> = tx
                .query_row(
                    "SELECT holder, expires_at FROM object_leases WHERE object_id = ?1",
                    params![id],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;
            let (holder, expires_at) = current.unwrap_or_default();
            return Err(StoreError::Leased {
                id: id.to_string(),
                holder,
                expires_at: DateTime::from_timestamp_millis(expires_at).unwrap_or(now),
            });
        }
        tx.commit()?;

        Ok(ObjectLease {
            db: self,
            object_id: id.to_string(),
            holder,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOUR: Duration = Duration::from_secs(3600);

    #[test]
    fn test_second_lease_on_same_object_is_refused() {
        let db = Database::open_in_memory().unwrap();
        let lease = db.acquire_lease("obj", HOUR).unwrap();
        assert_eq!(lease.object_id(), "obj");

        match db.acquire_lease("obj", HOUR) {
            Err(StoreError::Leased { id, holder, .. }) => {
                assert_eq!(id, "obj");
                assert_eq!(holder, lease.holder());
            }
            other => panic!("expected Leased, got {:?}", other),
        }

        // Other objects are unaffected
        assert!(db.acquire_lease("other", HOUR).is_ok());
    }

    #[test]
    fn test_dropping_lease_releases_it() {
        let db = Database::open_in_memory().unwrap();
        drop(db.acquire_lease("obj", HOUR).unwrap());
        assert!(db.acquire_lease("obj", HOUR).is_ok());
    }

    #[test]
    fn test_expired_lease_is_taken_over() {
        let db = Database::open_in_memory().unwrap();
        let stale = db.acquire_lease("obj", Duration::ZERO).unwrap();

        let fresh = db.acquire_lease("obj", HOUR).unwrap();
        assert_ne!(fresh.holder(), stale.holder());

        // Releasing the stale guard leaves the new holder in place
        drop(stale);
        assert!(matches!(
            db.acquire_lease("obj", HOUR),
            Err(StoreError::Leased { .. })
        ));
    }

    #[test]
    fn test_unbounded_ttl_does_not_overflow() {
        let db = Database::open_in_memory().unwrap();
        let _lease = db.acquire_lease("obj", Duration::MAX).unwrap();
        assert!(db.acquire_lease("obj", HOUR).is_err());
    }
}
