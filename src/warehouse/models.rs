use std::fmt;

#[derive(Clone, Debug, PartialEq)]
pub struct Artist {
    pub artist_id: String,
    pub name: String,
    pub location: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Song {
    pub song_id: String,
    pub title: String,
    pub artist_id: String,
    pub year: i32,
    pub duration: f64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct User {
    pub user_id: i64,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub gender: Option<String>,
    pub level: String,
}

/// One row of the `time` dimension, keyed by the play timestamp in epoch
/// milliseconds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimeRow {
    pub start_time: i64,
    pub hour: u32,
    pub day: u32,
    pub week: u32,
    pub month: u32,
    pub year: i32,
    pub weekday: u32,
}

/// A songplay about to be inserted; the id is assigned by the database.
#[derive(Clone, Debug, PartialEq)]
pub struct NewSongplay {
    pub start_time: i64,
    pub user_id: i64,
    pub level: String,
    pub song_id: Option<String>,
    pub artist_id: Option<String>,
    pub session_id: i64,
    pub location: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Songplay {
    pub songplay_id: i64,
    pub start_time: i64,
    pub user_id: i64,
    pub level: String,
    pub song_id: Option<String>,
    pub artist_id: Option<String>,
    pub session_id: i64,
    pub location: Option<String>,
    pub user_agent: Option<String>,
}

/// Result of the song/artist lookup for a play event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SongMatch {
    pub song_id: String,
    pub artist_id: String,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TableCounts {
    pub artists: usize,
    pub songs: usize,
    pub users: usize,
    pub time: usize,
    pub songplays: usize,
}

impl fmt::Display for TableCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} artists, {} songs, {} users, {} time rows, {} songplays",
            self.artists, self.songs, self.users, self.time, self.songplays
        )
    }
}

/// The two input datasets the pipeline knows how to load.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Dataset {
    Songs,
    Logs,
}

impl Dataset {
    pub fn as_str(&self) -> &'static str {
        match self {
            Dataset::Songs => "songs",
            Dataset::Logs => "logs",
        }
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ledger entry for a file whose rows were committed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoadedFile {
    pub dataset: Dataset,
    pub path: String,
    pub content_hash: String,
    pub records: usize,
    pub loaded_at: i64,
}
