//! Row-level write operations used by the file processors.
//!
//! Implemented for `rusqlite::Connection`, so processors can be handed either
//! the open file transaction (which derefs to a connection) or a plain
//! in-memory connection in tests.

use super::models::{Artist, Dataset, NewSongplay, Song, SongMatch, TimeRow, User};
use super::schema::{
    ARTIST_INSERT, LOADED_FILE_HASH_SELECT, LOADED_FILE_UPSERT, SONGPLAY_INSERT, SONG_INSERT,
    SONG_SELECT, TIME_INSERT, USER_UPSERT,
};
use rusqlite::{params, Connection, OptionalExtension};

pub trait WarehouseWriter {
    /// Insert an artist. Returns false if the artist id was already present.
    fn insert_artist(&self, artist: &Artist) -> rusqlite::Result<bool>;

    /// Insert a song. Returns false if the song id was already present.
    fn insert_song(&self, song: &Song) -> rusqlite::Result<bool>;

    /// Insert a time row. Returns false if the timestamp was already present.
    fn insert_time(&self, row: &TimeRow) -> rusqlite::Result<bool>;

    /// Insert a user, or only refresh its level if the user already exists.
    fn upsert_user(&self, user: &User) -> rusqlite::Result<()>;

    /// Exact (title, artist name, duration) lookup.
    fn find_song(
        &self,
        title: &str,
        artist_name: &str,
        duration: f64,
    ) -> rusqlite::Result<Option<SongMatch>>;

    /// Append a songplay and return its generated id.
    fn insert_songplay(&self, play: &NewSongplay) -> rusqlite::Result<i64>;

    /// Content hash recorded for a file the last time it was loaded.
    fn loaded_file_hash(&self, dataset: Dataset, path: &str) -> rusqlite::Result<Option<String>>;

    fn record_loaded_file(
        &self,
        dataset: Dataset,
        path: &str,
        content_hash: &str,
        records: usize,
    ) -> rusqlite::Result<()>;
}

impl WarehouseWriter for Connection {
    fn insert_artist(&self, artist: &Artist) -> rusqlite::Result<bool> {
        let mut stmt = self.prepare_cached(ARTIST_INSERT)?;
        let changed = stmt.execute(params![
            artist.artist_id,
            artist.name,
            artist.location,
            artist.latitude,
            artist.longitude,
        ])?;
        Ok(changed > 0)
    }

    fn insert_song(&self, song: &Song) -> rusqlite::Result<bool> {
        let mut stmt = self.prepare_cached(SONG_INSERT)?;
        let changed = stmt.execute(params![
            song.song_id,
            song.title,
            song.artist_id,
            song.year,
            song.duration,
        ])?;
        Ok(changed > 0)
    }

    fn insert_time(&self, row: &TimeRow) -> rusqlite::Result<bool> {
        let mut stmt = self.prepare_cached(TIME_INSERT)?;
        let changed = stmt.execute(params![
            row.start_time,
            row.hour,
            row.day,
            row.week,
            row.month,
            row.year,
            row.weekday,
        ])?;
        Ok(changed > 0)
    }

    fn upsert_user(&self, user: &User) -> rusqlite::Result<()> {
        let mut stmt = self.prepare_cached(USER_UPSERT)?;
        stmt.execute(params![
            user.user_id,
            user.first_name,
            user.last_name,
            user.gender,
            user.level,
        ])?;
        Ok(())
    }

    fn find_song(
        &self,
        title: &str,
        artist_name: &str,
        duration: f64,
    ) -> rusqlite::Result<Option<SongMatch>> {
        let mut stmt = self.prepare_cached(SONG_SELECT)?;
        stmt.query_row(params![title, artist_name, duration], |row| {
            Ok(SongMatch {
                song_id: row.get(0)?,
                artist_id: row.get(1)?,
            })
        })
        .optional()
    }

    fn insert_songplay(&self, play: &NewSongplay) -> rusqlite::Result<i64> {
        let mut stmt = self.prepare_cached(SONGPLAY_INSERT)?;
        stmt.execute(params![
            play.start_time,
            play.user_id,
            play.level,
            play.song_id,
            play.artist_id,
            play.session_id,
            play.location,
            play.user_agent,
        ])?;
        Ok(self.last_insert_rowid())
    }

    fn loaded_file_hash(&self, dataset: Dataset, path: &str) -> rusqlite::Result<Option<String>> {
        let mut stmt = self.prepare_cached(LOADED_FILE_HASH_SELECT)?;
        stmt.query_row(params![dataset.as_str(), path], |row| row.get(0))
            .optional()
    }

    fn record_loaded_file(
        &self,
        dataset: Dataset,
        path: &str,
        content_hash: &str,
        records: usize,
    ) -> rusqlite::Result<()> {
        let mut stmt = self.prepare_cached(LOADED_FILE_UPSERT)?;
        stmt.execute(params![dataset.as_str(), path, content_hash, records as i64])?;
        Ok(())
    }
}
