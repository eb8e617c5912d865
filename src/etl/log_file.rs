use super::calendar::time_row;
use super::error::EtlError;
use super::records::{parse_log_lines, SongPlayEvent};
use super::stats::FileStats;
use crate::warehouse::{TimeRow, WarehouseWriter};
use std::path::Path;
use tracing::{debug, warn};

/// Load one activity log file.
///
/// Only `NextSong` events produce rows. Time rows are inserted first, then
/// users in file order (so the last event wins the `level`), then one
/// songplay per event with the song and artist resolved by exact lookup.
/// Malformed lines are skipped with a warning; storage errors fail the file.
pub fn process_log_file(
    writer: &dyn WarehouseWriter,
    path: &Path,
    text: &str,
) -> Result<FileStats, EtlError> {
    let mut stats = FileStats::default();
    let mut plays: Vec<(usize, SongPlayEvent, TimeRow)> = Vec::new();

    for (line, parsed) in parse_log_lines(text) {
        stats.records_read += 1;

        let event = match parsed {
            Ok(event) => event,
            Err(e) => {
                warn!("Skipping {:?} line {}: {}", path, line, e);
                stats.records_skipped += 1;
                continue;
            }
        };
        if !event.is_next_song() {
            stats.records_filtered += 1;
            continue;
        }

        let play = match event.into_play() {
            Ok(play) => play,
            Err(reason) => {
                warn!("Skipping {:?} line {}: {}", path, line, reason);
                stats.records_skipped += 1;
                continue;
            }
        };
        match time_row(play.ts) {
            Ok(row) => plays.push((line, play, row)),
            Err(e) => {
                warn!("Skipping {:?} line {}: {}", path, line, e);
                stats.records_skipped += 1;
            }
        }
    }

    let mut new_time_rows = 0;
    for (line, _, row) in &plays {
        if writer
            .insert_time(row)
            .map_err(EtlError::at_record(path, *line))?
        {
            new_time_rows += 1;
        }
    }

    for (line, play, _) in &plays {
        writer
            .upsert_user(&play.user)
            .map_err(EtlError::at_record(path, *line))?;
    }

    for (line, play, _) in &plays {
        let found = match play.lookup_key() {
            Some((title, artist, length)) => writer
                .find_song(title, artist, length)
                .map_err(EtlError::at_record(path, *line))?,
            None => None,
        };
        if found.is_some() {
            stats.lookup_hits += 1;
        }
        writer
            .insert_songplay(&play.songplay(found))
            .map_err(EtlError::at_record(path, *line))?;
        stats.songplays += 1;
    }
    stats.records_loaded = plays.len();

    debug!(
        "{:?}: {} new time rows, {} songplays, {} matched",
        path, new_time_rows, stats.songplays, stats.lookup_hits
    );
    Ok(stats)
}
