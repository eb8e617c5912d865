//! Input record decoding for song metadata and activity log files.

use crate::warehouse::{Artist, NewSongplay, Song, SongMatch, User};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// One song metadata record. Unknown fields (e.g. `num_songs`) are ignored.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct SongRecord {
    pub song_id: String,
    pub title: String,
    pub artist_id: String,
    pub year: i32,
    pub duration: f64,
    pub artist_name: String,
    pub artist_location: Option<String>,
    pub artist_latitude: Option<f64>,
    pub artist_longitude: Option<f64>,
}

impl SongRecord {
    pub fn artist(&self) -> Artist {
        Artist {
            artist_id: self.artist_id.clone(),
            name: self.artist_name.clone(),
            location: self.artist_location.clone(),
            latitude: self.artist_latitude,
            longitude: self.artist_longitude,
        }
    }

    pub fn song(&self) -> Song {
        Song {
            song_id: self.song_id.clone(),
            title: self.title.clone(),
            artist_id: self.artist_id.clone(),
            year: self.year,
            duration: self.duration,
        }
    }
}

/// Decode every song record in a file. The file may hold a single object, an
/// array of objects, or newline-delimited objects.
pub fn parse_song_file(text: &str) -> Result<Vec<SongRecord>, String> {
    let mut records = Vec::new();
    for value in serde_json::Deserializer::from_str(text).into_iter::<Value>() {
        let value = value.map_err(|e| e.to_string())?;
        match value {
            Value::Array(items) => {
                for item in items {
                    records.push(serde_json::from_value(item).map_err(|e| e.to_string())?);
                }
            }
            Value::Object(_) => {
                records.push(serde_json::from_value(value).map_err(|e| e.to_string())?);
            }
            other => return Err(format!("expected a JSON object, found {}", json_kind(&other))),
        }
    }
    Ok(records)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// 2^63, the smallest float above `i64::MAX`.
const I64_FLOAT_LIMIT: f64 = 9_223_372_036_854_775_808.0;

fn integral_f64(f: f64) -> Option<i64> {
    (f.fract() == 0.0 && (-I64_FLOAT_LIMIT..I64_FLOAT_LIMIT).contains(&f)).then_some(f as i64)
}

/// Accepts an integer, an integral float, or a string holding an integer.
/// Null and blank strings (logged-out users) decode as `None`.
fn flexible_int<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().and_then(integral_f64))
            .map(Some)
            .ok_or_else(|| D::Error::custom(format!("expected an integer, got {}", n))),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => s
            .trim()
            .parse::<i64>()
            .map(Some)
            .map_err(|_| D::Error::custom(format!("expected an integer, got {:?}", s))),
        Some(other) => Err(D::Error::custom(format!(
            "expected an integer, got {}",
            json_kind(&other)
        ))),
    }
}

/// One line of an activity log. Everything is optional so that any event
/// type decodes; `into_play` enforces what a song play needs.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LogEvent {
    #[serde(default, deserialize_with = "flexible_int")]
    pub ts: Option<i64>,
    pub page: Option<String>,
    #[serde(default, deserialize_with = "flexible_int")]
    pub user_id: Option<i64>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub gender: Option<String>,
    pub level: Option<String>,
    pub song: Option<String>,
    pub artist: Option<String>,
    pub length: Option<f64>,
    #[serde(default, deserialize_with = "flexible_int")]
    pub session_id: Option<i64>,
    pub location: Option<String>,
    pub user_agent: Option<String>,
}

pub const NEXT_SONG_PAGE: &str = "NextSong";

impl LogEvent {
    pub fn is_next_song(&self) -> bool {
        self.page.as_deref() == Some(NEXT_SONG_PAGE)
    }

    /// Validate a NextSong event into a play. The error names the first
    /// missing field.
    pub fn into_play(self) -> Result<SongPlayEvent, String> {
        let ts = self.ts.ok_or("missing ts")?;
        let user_id = self.user_id.ok_or("missing userId")?;
        let level = self
            .level
            .filter(|l| !l.is_empty())
            .ok_or("missing level")?;
        let session_id = self.session_id.ok_or("missing sessionId")?;

        Ok(SongPlayEvent {
            ts,
            user: User {
                user_id,
                first_name: self.first_name,
                last_name: self.last_name,
                gender: self.gender,
                level,
            },
            session_id,
            song: self.song,
            artist: self.artist,
            length: self.length,
            location: self.location,
            user_agent: self.user_agent,
        })
    }
}

/// A validated NextSong event.
#[derive(Clone, Debug, PartialEq)]
pub struct SongPlayEvent {
    pub ts: i64,
    pub user: User,
    pub session_id: i64,
    pub song: Option<String>,
    pub artist: Option<String>,
    pub length: Option<f64>,
    pub location: Option<String>,
    pub user_agent: Option<String>,
}

impl SongPlayEvent {
    /// The (title, artist name, duration) triple used for the song lookup,
    /// if the event carries all three.
    pub fn lookup_key(&self) -> Option<(&str, &str, f64)> {
        match (&self.song, &self.artist, self.length) {
            (Some(song), Some(artist), Some(length)) => Some((song, artist, length)),
            _ => None,
        }
    }

    pub fn songplay(&self, found: Option<SongMatch>) -> NewSongplay {
        let (song_id, artist_id) = match found {
            Some(m) => (Some(m.song_id), Some(m.artist_id)),
            None => (None, None),
        };
        NewSongplay {
            start_time: self.ts,
            user_id: self.user.user_id,
            level: self.user.level.clone(),
            song_id,
            artist_id,
            session_id: self.session_id,
            location: self.location.clone(),
            user_agent: self.user_agent.clone(),
        }
    }
}

/// Decode a newline-delimited log file, one result per non-blank line with
/// its 1-based line number.
pub fn parse_log_lines(
    text: &str,
) -> impl Iterator<Item = (usize, Result<LogEvent, serde_json::Error>)> + '_ {
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| (index + 1, serde_json::from_str::<LogEvent>(line)))
}
