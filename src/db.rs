// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Persistent record of generated plist files.
//!
//! Launchd-me keeps a SQLite database at `<project>/launchd-me.db` with two
//! tables:
//!
//! - `PlistFiles`: one row per generated plist file. Rows are never deleted.
//!   Only the `CurrentState` column changes as files get installed and
//!   uninstalled.
//! - `InstallationEvents`: one row per successful install or uninstall of a
//!   tracked plist file.
//!
//! # Scoped Connections
//!
//! No connection outlives a single logical operation. Every operation goes
//! through [`PlistDb::transaction`], which opens a connection, runs the
//! operation in a transaction, commits on success or rolls back on failure,
//! and closes the connection again.
//!
//! # State Transitions
//!
//! ```text
//! inactive --install--> running --uninstall--> inactive
//! ```
//!
//! The `deleted` state is reserved. Nothing transitions into it yet.

use crate::{
    config::UserConfig,
    schedule::{Schedule, ScheduleType},
};

use chrono::Local;
use rusqlite::{
    params,
    types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, Value, ValueRef},
    Connection, Row, ToSql,
};
use serde::Serialize;
use std::{
    collections::BTreeMap,
    fmt::{Display, Formatter, Result as FmtResult},
    path::PathBuf,
    str::FromStr,
};
use tracing::{debug, instrument, warn};

const CREATE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS PlistFiles (
    PlistFileID INTEGER PRIMARY KEY AUTOINCREMENT,
    PlistFileName TEXT NOT NULL,
    ScriptName TEXT NOT NULL,
    CreatedDate TEXT NOT NULL,
    ScheduleType TEXT NOT NULL,
    ScheduleValue TEXT NOT NULL,
    CurrentState TEXT NOT NULL CHECK (CurrentState IN ('running', 'inactive', 'deleted')),
    Description TEXT,
    PlistFileContent TEXT
);

CREATE TABLE IF NOT EXISTS InstallationEvents (
    EventID INTEGER PRIMARY KEY AUTOINCREMENT,
    FileID INTEGER,
    EventType TEXT NOT NULL CHECK (EventType IN ('install', 'uninstall')),
    EventDate TEXT NOT NULL,
    Success INTEGER NOT NULL CHECK (Success IN (0, 1)),
    FOREIGN KEY (FileID) REFERENCES PlistFiles (PlistFileID)
);
"#;

const SELECT_PLIST_FILE_COLUMNS: &str = "SELECT PlistFileID, PlistFileName, ScriptName, \
    CreatedDate, ScheduleType, ScheduleValue, CurrentState, Description, PlistFileContent \
    FROM PlistFiles";

/// Installation state of a tracked plist file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CurrentState {
    Running,
    Inactive,
    Deleted,
}

impl CurrentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Inactive => "inactive",
            Self::Deleted => "deleted",
        }
    }
}

impl FromStr for CurrentState {
    type Err = DbError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        match data {
            "running" => Ok(Self::Running),
            "inactive" => Ok(Self::Inactive),
            "deleted" => Ok(Self::Deleted),
            other => Err(DbError::UnknownState(other.into())),
        }
    }
}

impl Display for CurrentState {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(self.as_str())
    }
}

impl ToSql for CurrentState {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(self.as_str().into())
    }
}

impl FromSql for CurrentState {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|err| FromSqlError::Other(Box::new(err)))
    }
}

impl FromSql for ScheduleType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|err| FromSqlError::Other(Box::new(err)))
    }
}

/// Kind of installation event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Install,
    Uninstall,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Install => "install",
            Self::Uninstall => "uninstall",
        }
    }
}

impl ToSql for EventType {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(self.as_str().into())
    }
}

impl FromSql for EventType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value.as_str()? {
            "install" => Ok(Self::Install),
            "uninstall" => Ok(Self::Uninstall),
            _ => Err(FromSqlError::InvalidType),
        }
    }
}

/// Row of the `PlistFiles` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlistFileRecord {
    pub id: i64,
    pub file_name: String,
    pub script_name: String,
    pub created_at: String,
    pub schedule_type: ScheduleType,
    pub schedule_value: String,
    pub current_state: CurrentState,
    pub description: Option<String>,
    pub plist_content: Option<String>,
}

impl PlistFileRecord {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            file_name: row.get(1)?,
            script_name: row.get(2)?,
            created_at: row.get(3)?,
            schedule_type: row.get(4)?,
            schedule_value: row.get(5)?,
            current_state: row.get(6)?,
            description: row.get(7)?,
            plist_content: row.get(8)?,
        })
    }
}

/// Row of the `InstallationEvents` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstallationEvent {
    pub event_id: i64,
    pub file_id: i64,
    pub event_type: EventType,
    pub event_date: String,
    pub success: bool,
}

/// Data needed to start tracking a newly generated plist file.
#[derive(Debug, Clone)]
pub struct NewPlistFile<'a> {
    pub file_name: &'a str,
    pub script_name: &'a str,
    pub schedule: &'a Schedule,
    pub description: &'a str,
    pub plist_content: Option<&'a str>,
}

/// Handle to the launchd-me database.
///
/// Holds nothing but the database path. Connections are opened per operation.
#[derive(Debug, Clone)]
pub struct PlistDb {
    db_file: PathBuf,
}

impl PlistDb {
    /// Construct new database handle for given layout.
    pub fn new(config: &UserConfig) -> Self {
        Self {
            db_file: config.ldm_db_file().to_path_buf(),
        }
    }

    /// Create both tables if they do not exist yet.
    ///
    /// # Errors
    ///
    /// - Return [`DbError::Sqlite`] if schema cannot be created.
    /// - Return [`DbError::MissingDatabaseDir`] if project directory is absent.
    #[instrument(skip(self), level = "debug")]
    pub fn create_schema(&self) -> Result<()> {
        self.transaction(|conn| Ok(conn.execute_batch(CREATE_SCHEMA)?))
    }

    /// Run operation inside a scoped connection.
    ///
    /// Opens a new connection, creating the database file and schema if the
    /// file does not exist yet. The operation runs inside a transaction that
    /// is committed if it returns `Ok`, or rolled back if it returns `Err`.
    /// The connection is closed in both cases.
    ///
    /// # Errors
    ///
    /// - Return [`DbError::MissingDatabaseDir`] if project directory is absent.
    /// - Return [`DbError::Sqlite`] if connection or transaction fails.
    /// - Return whatever error the operation itself returns.
    pub fn transaction<F, T>(&self, operation: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let mut conn = self.open()?;
        let tx = conn.transaction()?;
        match operation(&tx) {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback) = tx.rollback() {
                    warn!("failed to roll back transaction: {rollback}");
                }
                Err(err)
            }
        }
    }

    fn open(&self) -> Result<Connection> {
        // INVARIANT: Never create the project directory here.
        //   - The initializer owns directory creation.
        if let Some(parent) = self.db_file.parent() {
            if !parent.is_dir() {
                return Err(DbError::MissingDatabaseDir(parent.to_path_buf()));
            }
        }

        let fresh = !self.db_file.exists();
        let conn = Connection::open(&self.db_file)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        if fresh {
            debug!("create database at {:?}", self.db_file.display());
            conn.execute_batch(CREATE_SCHEMA)?;
        }

        Ok(conn)
    }

    /// Start tracking a newly generated plist file.
    ///
    /// The row starts out `inactive`, and is stamped with the current time.
    /// Returns the id assigned to the new row.
    ///
    /// # Errors
    ///
    /// - Return [`DbError::Schedule`] if schedule cannot be serialized.
    /// - Return [`DbError::Sqlite`] if insertion fails.
    #[instrument(skip(self, file), level = "debug")]
    pub fn insert_tracked_file(&self, file: &NewPlistFile<'_>) -> Result<i64> {
        let schedule_value = file.schedule.value_string()?;
        self.transaction(|conn| {
            conn.execute(
                r#"
                INSERT INTO PlistFiles (
                    PlistFileName,
                    ScriptName,
                    CreatedDate,
                    ScheduleType,
                    ScheduleValue,
                    CurrentState,
                    Description,
                    PlistFileContent
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                "#,
                params![
                    file.file_name,
                    file.script_name,
                    now(),
                    file.schedule.schedule_type().to_string(),
                    schedule_value,
                    CurrentState::Inactive,
                    file.description,
                    file.plist_content,
                ],
            )?;
            let id = conn.last_insert_rowid();
            debug!("track {:?} under id {id}", file.file_name);

            Ok(id)
        })
    }

    /// Count every tracked plist file, regardless of state.
    pub fn count_tracked_files(&self) -> Result<i64> {
        self.transaction(|conn| {
            Ok(conn.query_row("SELECT COUNT(*) FROM PlistFiles", [], |row| row.get(0))?)
        })
    }

    /// Mark tracked plist file as running.
    ///
    /// Does nothing if id is not tracked.
    pub fn set_running(&self, id: i64) -> Result<()> {
        self.transaction(|conn| set_state(conn, id, CurrentState::Running))
    }

    /// Mark tracked plist file as inactive.
    ///
    /// Does nothing if id is not tracked.
    pub fn set_inactive(&self, id: i64) -> Result<()> {
        self.transaction(|conn| set_state(conn, id, CurrentState::Inactive))
    }

    /// Record a completed install or uninstall.
    ///
    /// Sets the state matching the event, and appends a successful event to
    /// `InstallationEvents` within one transaction.
    ///
    /// # Errors
    ///
    /// - Return [`DbError::PlistFileIdNotFound`] if id is not tracked.
    /// - Return [`DbError::Sqlite`] if update fails.
    #[instrument(skip(self), level = "debug")]
    pub fn complete_installation_event(&self, id: i64, event_type: EventType) -> Result<()> {
        self.transaction(|conn| {
            verify_id_exists(conn, id)?;
            let state = match event_type {
                EventType::Install => CurrentState::Running,
                EventType::Uninstall => CurrentState::Inactive,
            };
            set_state(conn, id, state)?;
            insert_event(conn, id, event_type, true)
        })
    }

    /// Append an installation event for a tracked plist file.
    ///
    /// # Errors
    ///
    /// - Return [`DbError::PlistFileIdNotFound`] if id is not tracked.
    /// - Return [`DbError::Sqlite`] if insertion fails.
    pub fn add_installation_event(
        &self,
        file_id: i64,
        event_type: EventType,
        success: bool,
    ) -> Result<()> {
        self.transaction(|conn| {
            verify_id_exists(conn, file_id)?;
            insert_event(conn, file_id, event_type, success)
        })
    }

    /// List installation events of a tracked plist file, oldest first.
    pub fn get_installation_events(&self, file_id: i64) -> Result<Vec<InstallationEvent>> {
        self.transaction(|conn| {
            verify_id_exists(conn, file_id)?;
            let mut stmt = conn.prepare(
                "SELECT EventID, FileID, EventType, EventDate, Success \
                 FROM InstallationEvents WHERE FileID = ?1 ORDER BY EventID",
            )?;
            let events = stmt
                .query_map(params![file_id], |row| {
                    Ok(InstallationEvent {
                        event_id: row.get(0)?,
                        file_id: row.get(1)?,
                        event_type: row.get(2)?,
                        event_date: row.get(3)?,
                        success: row.get(4)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            Ok(events)
        })
    }

    /// Check that id belongs to a tracked plist file.
    ///
    /// # Errors
    ///
    /// - Return [`DbError::PlistFileIdNotFound`] if no row matches.
    pub fn verify_id_exists(&self, id: i64) -> Result<()> {
        self.transaction(|conn| verify_id_exists(conn, id))
    }

    /// List every tracked plist file ordered by id, including deleted ones.
    pub fn get_all_tracked_files(&self) -> Result<Vec<PlistFileRecord>> {
        self.transaction(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{SELECT_PLIST_FILE_COLUMNS} ORDER BY PlistFileID"
            ))?;
            let records = stmt
                .query_map([], PlistFileRecord::from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            Ok(records)
        })
    }

    /// Fetch a single tracked plist file.
    ///
    /// # Errors
    ///
    /// - Return [`DbError::PlistFileIdNotFound`] if id is not tracked.
    pub fn get_tracked_file(&self, id: i64) -> Result<PlistFileRecord> {
        self.transaction(|conn| {
            verify_id_exists(conn, id)?;
            Ok(conn.query_row(
                &format!("{SELECT_PLIST_FILE_COLUMNS} WHERE PlistFileID = ?1"),
                params![id],
                PlistFileRecord::from_row,
            )?)
        })
    }

    /// Fetch every column of a tracked plist file keyed by column name.
    ///
    /// # Errors
    ///
    /// - Return [`DbError::PlistFileIdNotFound`] if id is not tracked.
    pub fn get_single_file_details(&self, id: i64) -> Result<BTreeMap<String, Value>> {
        self.transaction(|conn| {
            verify_id_exists(conn, id)?;
            let mut stmt = conn.prepare("SELECT * FROM PlistFiles WHERE PlistFileID = ?1")?;
            let columns = stmt
                .column_names()
                .into_iter()
                .map(String::from)
                .collect::<Vec<_>>();
            let details = stmt.query_row(params![id], |row| {
                columns
                    .iter()
                    .enumerate()
                    .map(|(idx, name)| Ok((name.clone(), row.get::<_, Value>(idx)?)))
                    .collect::<rusqlite::Result<BTreeMap<_, _>>>()
            })?;

            Ok(details)
        })
    }
}

fn verify_id_exists(conn: &Connection, id: i64) -> Result<()> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS (SELECT 1 FROM PlistFiles WHERE PlistFileID = ?1)",
        params![id],
        |row| row.get(0),
    )?;

    if !exists {
        return Err(DbError::PlistFileIdNotFound(id));
    }

    Ok(())
}

fn set_state(conn: &Connection, id: i64, state: CurrentState) -> Result<()> {
    let changed = conn.execute(
        "UPDATE PlistFiles SET CurrentState = ?1 WHERE PlistFileID = ?2",
        params![state, id],
    )?;
    debug!("set state of {id} to {state} ({changed} row changed)");

    Ok(())
}

fn insert_event(
    conn: &Connection,
    file_id: i64,
    event_type: EventType,
    success: bool,
) -> Result<()> {
    conn.execute(
        "INSERT INTO InstallationEvents (FileID, EventType, EventDate, Success) \
         VALUES (?1, ?2, ?3, ?4)",
        params![file_id, event_type, now(), success],
    )?;

    Ok(())
}

fn now() -> String {
    Local::now().to_rfc3339()
}

/// Database error types.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// Referenced plist file id has no row.
    #[error("no tracked plist file with id {0}")]
    PlistFileIdNotFound(i64),

    /// Directory meant to hold the database does not exist.
    #[error("database directory {:?} does not exist, run `ldm init` first", .0.display())]
    MissingDatabaseDir(PathBuf),

    /// Stored state is not one of the known states.
    #[error("unknown plist file state {0:?}")]
    UnknownState(String),

    /// Schedule cannot be serialized for storage.
    #[error(transparent)]
    Schedule(#[from] crate::schedule::ScheduleError),

    /// Operations from SQLite fail.
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

/// Friendly result alias :3
pub type Result<T, E = DbError> = std::result::Result<T, E>;
