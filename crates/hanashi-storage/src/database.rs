// SPDX-FileCopyrightText: 2026 Hanashi Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup, WAL mode, and lifecycle.
//!
//! All writes are serialized through tokio-rusqlite's single background
//! thread. Do NOT create additional Connection instances for writes.

use std::path::Path;

use tokio_rusqlite::Connection;
use tracing::debug;

use hanashi_core::HanashiError;

use crate::migrations;

/// Convert a tokio-rusqlite error into the workspace error type.
pub fn map_tr_err(err: tokio_rusqlite::Error) -> HanashiError {
    HanashiError::storage(err)
}

/// Handle to the SQLite database.
///
/// Cloneable; all clones share the one background connection thread, so
/// every `call` executes serially in submission order.
#[derive(Clone)]
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open (creating if needed) the database at `path` with WAL mode.
    ///
    /// Runs PRAGMA setup and all pending migrations before returning.
    pub async fn open(path: &str) -> Result<Self, HanashiError> {
        Self::open_with(path, true).await
    }

    /// Open with an explicit WAL toggle (rollback journal when `false`).
    pub async fn open_with(path: &str, wal_mode: bool) -> Result<Self, HanashiError> {
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(HanashiError::storage)?;
            }
        }

        let conn = Connection::open(path).await.map_err(HanashiError::storage)?;

        // PRAGMAs are per-connection, so they run on the background thread's
        // connection, followed by migrations in the same call.
        let migrated = conn
            .call(
                move |conn| -> Result<Result<(), HanashiError>, rusqlite::Error> {
                    if wal_mode {
                        conn.pragma_update(None, "journal_mode", "WAL")?;
                    }
                    conn.execute_batch(
                        "PRAGMA synchronous = NORMAL;
                         PRAGMA foreign_keys = ON;
                         PRAGMA busy_timeout = 5000;",
                    )?;
                    Ok(migrations::run_migrations(conn))
                },
            )
            .await
            .map_err(map_tr_err)?;
        migrated?;

        debug!(path, wal_mode, "database opened");
        Ok(Self { conn })
    }

    /// The shared background connection.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Checkpoint the WAL so all committed data reaches the main file.
    ///
    /// The background thread itself shuts down when the last clone drops.
    pub async fn close(&self) -> Result<(), HanashiError> {
        self.conn
            .call(|conn| {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        debug!("WAL checkpoint complete");
        Ok(())
    }
}
