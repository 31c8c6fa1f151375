//! File-backed restriction capability.
//!
//! Stands in for the platform service on machines without one. Scopes live
//! in a SQLite file that every process opens on each call, one row per scope
//! and facet, so the main process and the monitor observe each other's
//! restrictions exactly as they would through the OS. A write touches only
//! its own rows and never rewrites another scope.

use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::{AuthorizationStatus, BlockingContext, FacetKind, RestrictionCapability, RestrictionSet};
use crate::error::CapabilityError;

#[derive(Debug, Clone)]
pub struct FileCapability {
    path: PathBuf,
}

impl FileCapability {
    pub const FILE_NAME: &'static str = "os_restrictions.db";

    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Capability file inside a data directory.
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(Self::FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record a revocation made outside the engine, e.g. in system settings.
    pub fn revoke(&self) -> Result<(), CapabilityError> {
        write_authorization(&self.open()?, AuthorizationStatus::Denied)
    }

    fn open(&self) -> Result<Connection, CapabilityError> {
        let conn = Connection::open(&self.path)
            .map_err(|e| CapabilityError::Unavailable(format!("{}: {e}", self.path.display())))?;
        conn.busy_timeout(Duration::from_secs(5)).map_err(unavailable)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))
            .map_err(unavailable)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS capability_authorization (
                id     INTEGER PRIMARY KEY CHECK (id = 1),
                status TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS restriction_facets (
                scope TEXT NOT NULL,
                facet TEXT NOT NULL,
                value TEXT NOT NULL,
                PRIMARY KEY (scope, facet)
            );",
        )
        .map_err(unavailable)?;
        Ok(conn)
    }
}

fn unavailable(e: impl std::fmt::Display) -> CapabilityError {
    CapabilityError::Unavailable(e.to_string())
}

fn read_authorization(conn: &Connection) -> Result<AuthorizationStatus, CapabilityError> {
    let status = conn
        .query_row("SELECT status FROM capability_authorization WHERE id = 1", [], |row| {
            row.get::<_, String>(0)
        })
        .optional()
        .map_err(unavailable)?;
    match status {
        Some(status) => serde_json::from_str(&status).map_err(unavailable),
        None => Ok(AuthorizationStatus::default()),
    }
}

fn write_authorization(conn: &Connection, status: AuthorizationStatus) -> Result<(), CapabilityError> {
    let status = serde_json::to_string(&status).map_err(unavailable)?;
    conn.execute(
        "INSERT OR REPLACE INTO capability_authorization (id, status) VALUES (1, ?1)",
        params![status],
    )
    .map_err(unavailable)?;
    Ok(())
}

impl RestrictionCapability for FileCapability {
    fn authorization_status(&self) -> AuthorizationStatus {
        self.open()
            .and_then(|conn| read_authorization(&conn))
            .unwrap_or_default()
    }

    fn request_authorization(&self) -> AuthorizationStatus {
        // No consent dialog here: a local request always succeeds, including
        // after an earlier revocation.
        match self
            .open()
            .and_then(|conn| write_authorization(&conn, AuthorizationStatus::Approved))
        {
            Ok(()) => AuthorizationStatus::Approved,
            Err(e) => {
                tracing::warn!("failed to persist authorization: {e}");
                AuthorizationStatus::NotDetermined
            }
        }
    }

    fn apply(
        &self,
        scope: BlockingContext,
        facet: FacetKind,
        set: &RestrictionSet,
    ) -> Result<(), CapabilityError> {
        let mut conn = self.open()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(unavailable)?;
        if !read_authorization(&tx)?.is_granted() {
            return Err(CapabilityError::NotAuthorized);
        }

        let mut only = RestrictionSet::new();
        only.replace_facet(facet, set);
        if only.is_empty() {
            tx.execute(
                "DELETE FROM restriction_facets WHERE scope = ?1 AND facet = ?2",
                params![scope.scope_name(), facet.to_string()],
            )
            .map_err(unavailable)?;
        } else {
            let value = serde_json::to_string(&only).map_err(unavailable)?;
            tx.execute(
                "INSERT OR REPLACE INTO restriction_facets (scope, facet, value) VALUES (?1, ?2, ?3)",
                params![scope.scope_name(), facet.to_string(), value],
            )
            .map_err(unavailable)?;
        }
        tx.commit().map_err(unavailable)
    }

    fn remove(&self, scope: BlockingContext) -> Result<(), CapabilityError> {
        self.open()?
            .execute("DELETE FROM restriction_facets WHERE scope = ?1", params![scope.scope_name()])
            .map_err(unavailable)?;
        Ok(())
    }

    fn current(&self, scope: BlockingContext) -> Result<RestrictionSet, CapabilityError> {
        let conn = self.open()?;
        let mut stmt = conn
            .prepare("SELECT facet, value FROM restriction_facets WHERE scope = ?1")
            .map_err(unavailable)?;
        let rows = stmt
            .query_map(params![scope.scope_name()], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .map_err(unavailable)?;

        let mut current = RestrictionSet::new();
        for row in rows {
            let (name, value) = row.map_err(unavailable)?;
            let facet = FacetKind::ALL
                .into_iter()
                .find(|f| f.to_string() == name)
                .ok_or_else(|| unavailable(format!("unknown facet {name} in {scope}")))?;
            let stored: RestrictionSet = serde_json::from_str(&value).map_err(unavailable)?;
            current.replace_facet(facet, &stored);
        }
        Ok(current)
    }
}
