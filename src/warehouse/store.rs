//! SQLite-backed warehouse store.
//!
//! Owns the single connection used by the batch driver and hands out one
//! transaction per input file.

use super::models::*;
use super::schema::{latest_schema, WAREHOUSE_VERSIONED_SCHEMAS};
use crate::sqlite_persistence::BASE_DB_VERSION;
use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{info, warn};

pub struct SqliteWarehouse {
    conn: Mutex<Connection>,
}

fn migrate_if_needed(conn: &mut Connection) -> Result<()> {
    let db_version: i64 = conn.query_row("PRAGMA user_version", [], |r| r.get(0))?;

    let latest_version = WAREHOUSE_VERSIONED_SCHEMAS.len() - 1;
    let latest = latest_schema();

    let table_count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'",
        [],
        |r| r.get(0),
    )?;

    if table_count == 0 {
        info!("Creating warehouse schema at version {}", latest_version);
        latest.create(conn)?;
        return Ok(());
    }

    if db_version < BASE_DB_VERSION as i64 {
        // Tables exist but were not created by us, e.g. an older hand-made
        // database. Fill in what is missing; validation below catches drift.
        warn!(
            "Database has no warehouse schema version (user_version = {}), creating missing tables",
            db_version
        );
        latest.create_if_absent(conn)?;
        return Ok(());
    }

    let mut current_version = (db_version - BASE_DB_VERSION as i64) as usize;
    if current_version >= latest_version {
        return Ok(());
    }

    let tx = conn.transaction()?;
    for schema in WAREHOUSE_VERSIONED_SCHEMAS.iter().skip(current_version + 1) {
        if let Some(migration_fn) = schema.migration {
            info!(
                "Migrating warehouse from version {} to {}",
                current_version, schema.version
            );
            migration_fn(&tx)?;
        }
        current_version = schema.version;
    }
    tx.pragma_update(None, "user_version", BASE_DB_VERSION + current_version)?;
    tx.commit()?;
    Ok(())
}

impl SqliteWarehouse {
    /// Open (creating if needed) the warehouse database at `db_path`.
    pub fn open<P: AsRef<Path>>(db_path: P, busy_timeout: Duration) -> Result<Self> {
        let db_path = db_path.as_ref();
        let mut conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open warehouse database: {:?}", db_path))?;
        conn.busy_timeout(busy_timeout)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;

        Self::from_connection(conn)
            .with_context(|| format!("Failed to initialize warehouse at {:?}", db_path))
    }

    /// A private in-memory warehouse with the latest schema.
    pub fn in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(mut conn: Connection) -> Result<Self> {
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        migrate_if_needed(&mut conn)?;
        latest_schema().validate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Drop every table and recreate the schema from scratch.
    pub fn reset(&self) -> Result<()> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        latest_schema().drop_if_exists(&tx)?;
        latest_schema().create(&tx)?;
        tx.commit()?;
        info!("Warehouse schema reset");
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        latest_schema().validate(&self.lock())
    }

    /// Run `f` inside a transaction. Committed when `f` succeeds, rolled back
    /// otherwise, so a failing file leaves no partial rows behind.
    pub fn with_file_transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&Connection) -> Result<T, E>,
        E: From<rusqlite::Error>,
    {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        match f(&*tx) {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback() {
                    warn!("Rollback failed: {}", rollback_err);
                }
                Err(e)
            }
        }
    }

    pub fn counts(&self) -> Result<TableCounts> {
        let conn = self.lock();
        let count = |table: &str| -> Result<usize> {
            let n: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |r| {
                r.get(0)
            })?;
            Ok(n as usize)
        };
        Ok(TableCounts {
            artists: count("artists")?,
            songs: count("songs")?,
            users: count("users")?,
            time: count("time")?,
            songplays: count("songplays")?,
        })
    }

    // =========================================================================
    // Load Ledger
    // =========================================================================

    pub fn loaded_file(&self, dataset: Dataset, path: &str) -> Result<Option<LoadedFile>> {
        let conn = self.lock();
        let row = conn
            .query_row(
                "SELECT content_hash, records, loaded_at FROM loaded_files
                 WHERE dataset = ?1 AND path = ?2",
                params![dataset.as_str(), path],
                |r| {
                    Ok((
                        r.get::<_, String>(0)?,
                        r.get::<_, i64>(1)?,
                        r.get::<_, i64>(2)?,
                    ))
                },
            )
            .optional()?;
        Ok(row.map(|(content_hash, records, loaded_at)| LoadedFile {
            dataset,
            path: path.to_string(),
            content_hash,
            records: records as usize,
            loaded_at,
        }))
    }

    // =========================================================================
    // Read Operations
    // =========================================================================

    pub fn get_artist(&self, artist_id: &str) -> Result<Option<Artist>> {
        let conn = self.lock();
        let artist = conn
            .query_row(
                "SELECT artist_id, name, location, latitude, longitude
                 FROM artists WHERE artist_id = ?1",
                params![artist_id],
                |r| {
                    Ok(Artist {
                        artist_id: r.get(0)?,
                        name: r.get(1)?,
                        location: r.get(2)?,
                        latitude: r.get(3)?,
                        longitude: r.get(4)?,
                    })
                },
            )
            .optional()?;
        Ok(artist)
    }

    pub fn get_song(&self, song_id: &str) -> Result<Option<Song>> {
        let conn = self.lock();
        let song = conn
            .query_row(
                "SELECT song_id, title, artist_id, year, duration FROM songs WHERE song_id = ?1",
                params![song_id],
                |r| {
                    Ok(Song {
                        song_id: r.get(0)?,
                        title: r.get(1)?,
                        artist_id: r.get(2)?,
                        year: r.get(3)?,
                        duration: r.get(4)?,
                    })
                },
            )
            .optional()?;
        Ok(song)
    }

    pub fn get_user(&self, user_id: i64) -> Result<Option<User>> {
        let conn = self.lock();
        let user = conn
            .query_row(
                "SELECT user_id, first_name, last_name, gender, level FROM users WHERE user_id = ?1",
                params![user_id],
                |r| {
                    Ok(User {
                        user_id: r.get(0)?,
                        first_name: r.get(1)?,
                        last_name: r.get(2)?,
                        gender: r.get(3)?,
                        level: r.get(4)?,
                    })
                },
            )
            .optional()?;
        Ok(user)
    }

    pub fn get_time(&self, start_time: i64) -> Result<Option<TimeRow>> {
        let conn = self.lock();
        let row = conn
            .query_row(
                "SELECT start_time, hour, day, week, month, year, weekday
                 FROM time WHERE start_time = ?1",
                params![start_time],
                |r| {
                    Ok(TimeRow {
                        start_time: r.get(0)?,
                        hour: r.get(1)?,
                        day: r.get(2)?,
                        week: r.get(3)?,
                        month: r.get(4)?,
                        year: r.get(5)?,
                        weekday: r.get(6)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    /// All songplays in insertion order.
    pub fn list_songplays(&self) -> Result<Vec<Songplay>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT songplay_id, start_time, user_id, level, song_id, artist_id,
                    session_id, location, user_agent
             FROM songplays ORDER BY songplay_id",
        )?;
        let plays = stmt
            .query_map([], |r| {
                Ok(Songplay {
                    songplay_id: r.get(0)?,
                    start_time: r.get(1)?,
                    user_id: r.get(2)?,
                    level: r.get(3)?,
                    song_id: r.get(4)?,
                    artist_id: r.get(5)?,
                    session_id: r.get(6)?,
                    location: r.get(7)?,
                    user_agent: r.get(8)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(plays)
    }
}
