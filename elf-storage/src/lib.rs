#![allow(clippy::missing_errors_doc)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::module_name_repetitions)]

//! # ELF Storage
//!
//! libSQL embedded storage backend for the knowledge core.
//!
//! This crate provides:
//! - Connection management for the local `index.db`
//! - Schema creation, versioning, and additive migrations
//! - The [`elf_core::storage::Store`] trait implementation
//! - An allow-listed generic repository for driver CRUD
//!
//! ## Example
//!
//! ```no_run
//! use elf_storage::ElfStorage;
//! use std::path::Path;
//!
//! # async fn example() -> elf_core::Result<()> {
//! let storage = ElfStorage::open(Path::new("/home/user/.claude/emergent-learning/memory/index.db")).await?;
//! # Ok(())
//! # }
//! ```

mod migrate;
pub mod repository;
mod retry;
pub mod schema;
mod store;
mod util;

pub use repository::{EntityTable, Repository};

use elf_core::error::{Error, Result};
use libsql::{Builder, Connection, Database};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// libSQL storage backend over one local database file.
pub struct ElfStorage {
    db: Arc<Database>,
}

impl ElfStorage {
    /// Open (creating if missing) the database at `path`.
    ///
    /// The parent directory is created, a freshly created file is
    /// restricted to the owner, pragmas are applied, the integrity check
    /// runs (failure is a configuration error), the schema is created
    /// idempotently, and planner statistics are refreshed.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                Error::Configuration(format!(
                    "Failed to create data directory {}: {e}",
                    parent.display()
                ))
            })?;
        }
        let existed = path.exists();

        let db = Builder::new_local(path)
            .build()
            .await
            .map_err(|e| Error::Configuration(format!("Failed to open database: {e}")))?;
        let storage = Self { db: Arc::new(db) };

        if !existed {
            restrict_permissions(path).await;
        }

        storage.initialize().await?;
        info!(path = %path.display(), "Opened knowledge store");
        Ok(storage)
    }

    /// A connection with the per-connection pragmas applied. Writes
    /// serialize per connection; readers proceed under WAL.
    pub(crate) async fn conn(&self) -> Result<Connection> {
        let conn = self
            .db
            .connect()
            .map_err(|e| Error::Database(format!("Failed to connect: {e}")))?;
        conn.execute_batch(
            "PRAGMA busy_timeout = 10000;
             PRAGMA foreign_keys = ON;
             PRAGMA synchronous = NORMAL;",
        )
        .await
        .map_err(|e| Error::Database(format!("Failed to apply pragmas: {e}")))?;
        Ok(conn)
    }

    async fn initialize(&self) -> Result<()> {
        let conn = self.conn().await?;

        // WAL is persistent per-database; set it once here
        let mut rows = conn
            .query("PRAGMA journal_mode = WAL", ())
            .await
            .map_err(util::db_err)?;
        let _ = rows.next().await;

        self.integrity_check(&conn).await?;

        for ddl in schema::CREATE_TABLES {
            conn.execute(ddl, ()).await.map_err(util::db_err)?;
        }
        for ddl in schema::CREATE_CONSTRAINTS {
            conn.execute(ddl, ()).await.map_err(util::db_err)?;
        }
        for ddl in schema::CREATE_INDEXES {
            conn.execute(ddl, ()).await.map_err(util::db_err)?;
        }

        migrate::run(&conn).await?;

        conn.execute("ANALYZE", ()).await.map_err(util::db_err)?;
        debug!("Schema initialized");
        Ok(())
    }

    async fn integrity_check(&self, conn: &Connection) -> Result<()> {
        let mut rows = conn
            .query("PRAGMA integrity_check", ())
            .await
            .map_err(|e| Error::Configuration(format!("Integrity check failed to run: {e}")))?;
        if let Some(row) = rows.next().await.map_err(util::db_err)? {
            let verdict: String = row.get(0).map_err(util::db_err)?;
            if verdict != "ok" {
                return Err(Error::Configuration(format!(
                    "Database integrity check failed: {verdict}"
                )));
            }
        }
        Ok(())
    }
}

/// Restrict a freshly created database file to the owner.
async fn restrict_permissions(path: &Path) {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let result = tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).await;
        if let Err(e) = result {
            warn!(path = %path.display(), error = %e, "Failed to restrict database permissions");
        }
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::ElfStorage;

    /// A file-backed scratch store; keep the temp dir alive for the test.
    pub(crate) async fn test_storage() -> (ElfStorage, tempfile::TempDir) {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage =
            ElfStorage::open(&dir.path().join("test.db")).await.expect("open test store");
        (storage, dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use elf_core::storage::Store;

    #[tokio::test]
    async fn open_creates_file_and_schema() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memory").join("index.db");
        let storage = ElfStorage::open(&path).await.unwrap();
        assert!(path.exists());

        let report = storage.validate_database().await.unwrap();
        assert!(report.valid, "errors: {:?}", report.errors);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn created_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.db");
        let _storage = ElfStorage::open(&path).await.unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[tokio::test]
    async fn reopen_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.db");
        drop(ElfStorage::open(&path).await.unwrap());
        let storage = ElfStorage::open(&path).await.unwrap();
        let report = storage.validate_database().await.unwrap();
        assert!(report.valid);
    }
}
