//! On-disk dataset fixtures laid out like the real song_data / log_data trees.

use super::constants::*;
use anyhow::Result;
use serde_json::{json, Value};
use sparkify_etl::warehouse::SqliteWarehouse;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

pub struct TestDataset {
    pub dir: TempDir,
    pub song_root: PathBuf,
    pub log_root: PathBuf,
    pub db_path: PathBuf,
}

impl TestDataset {
    /// Empty song and log trees plus a warehouse path that does not exist yet.
    pub fn empty() -> Result<Self> {
        let dir = TempDir::new()?;
        let song_root = dir.path().join("song_data");
        let log_root = dir.path().join("log_data");
        fs::create_dir_all(&song_root)?;
        fs::create_dir_all(&log_root)?;
        let db_path = dir.path().join("warehouse.db");
        Ok(Self {
            dir,
            song_root,
            log_root,
            db_path,
        })
    }

    /// Two song files and one log file with three plays, one of which
    /// matches a song exactly, plus a non-play event.
    pub fn standard() -> Result<Self> {
        let dataset = Self::empty()?;
        dataset.write_song(
            "A/A/A/TRAAAAW128F429D538.json",
            &song_record(
                SONG_1_ID,
                SONG_1_TITLE,
                ARTIST_1_ID,
                ARTIST_1_NAME,
                SONG_1_DURATION,
                2005,
            ),
        )?;
        dataset.write_song(
            "A/A/B/TRAABJL12903CDCF1A.json",
            &song_record(
                SONG_2_ID,
                SONG_2_TITLE,
                ARTIST_2_ID,
                ARTIST_2_NAME,
                SONG_2_DURATION,
                0,
            ),
        )?;
        dataset.write_log(
            "2018/11/2018-11-05-events.json",
            &[
                play(TS_1, USER_1_ID, "free", SONG_1_TITLE, ARTIST_1_NAME, SONG_1_DURATION),
                page_event("Home", TS_1 + 1, USER_1_ID),
                play(TS_2, USER_1_ID, "paid", "Unknown Song", ARTIST_1_NAME, 100.0),
                play(TS_3, USER_2_ID, "free", SONG_2_TITLE, ARTIST_2_NAME, 218.9),
            ],
        )?;
        Ok(dataset)
    }

    pub fn write_song(&self, relative: &str, record: &Value) -> Result<PathBuf> {
        write_file(&self.song_root, relative, &record.to_string())
    }

    /// Writes one JSON object per line.
    pub fn write_log(&self, relative: &str, events: &[Value]) -> Result<PathBuf> {
        let lines: Vec<String> = events.iter().map(|e| e.to_string()).collect();
        write_file(&self.log_root, relative, &lines.join("\n"))
    }

    pub fn write_raw_log(&self, relative: &str, content: &str) -> Result<PathBuf> {
        write_file(&self.log_root, relative, content)
    }

    pub fn write_raw_song(&self, relative: &str, content: &str) -> Result<PathBuf> {
        write_file(&self.song_root, relative, content)
    }

    pub fn open_store(&self) -> Result<SqliteWarehouse> {
        SqliteWarehouse::open(&self.db_path, Duration::from_secs(1))
    }
}

fn write_file(root: &Path, relative: &str, content: &str) -> Result<PathBuf> {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&path, content)?;
    Ok(path)
}

pub fn song_record(
    song_id: &str,
    title: &str,
    artist_id: &str,
    artist_name: &str,
    duration: f64,
    year: i32,
) -> Value {
    json!({
        "num_songs": 1,
        "artist_id": artist_id,
        "artist_latitude": null,
        "artist_longitude": null,
        "artist_location": "",
        "artist_name": artist_name,
        "song_id": song_id,
        "title": title,
        "duration": duration,
        "year": year,
    })
}

/// A NextSong event with the user id encoded as a string, as in the raw logs.
pub fn play(ts: i64, user_id: i64, level: &str, song: &str, artist: &str, length: f64) -> Value {
    json!({
        "artist": artist,
        "auth": "Logged In",
        "firstName": format!("First{}", user_id),
        "gender": "F",
        "itemInSession": 0,
        "lastName": format!("Last{}", user_id),
        "length": length,
        "level": level,
        "location": "San Jose-Sunnyvale-Santa Clara, CA",
        "method": "PUT",
        "page": "NextSong",
        "registration": 1540940782796.0,
        "sessionId": 583,
        "song": song,
        "status": 200,
        "ts": ts,
        "userAgent": "Mozilla/5.0 (X11; Linux x86_64)",
        "userId": user_id.to_string(),
    })
}

pub fn page_event(page: &str, ts: i64, user_id: i64) -> Value {
    json!({
        "artist": null,
        "auth": "Logged In",
        "firstName": format!("First{}", user_id),
        "gender": "F",
        "itemInSession": 1,
        "lastName": format!("Last{}", user_id),
        "length": null,
        "level": "free",
        "location": "San Jose-Sunnyvale-Santa Clara, CA",
        "method": "GET",
        "page": page,
        "sessionId": 583,
        "song": null,
        "status": 200,
        "ts": ts,
        "userAgent": "Mozilla/5.0 (X11; Linux x86_64)",
        "userId": user_id.to_string(),
    })
}
