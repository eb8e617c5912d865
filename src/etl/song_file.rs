use super::error::EtlError;
use super::records::parse_song_file;
use super::stats::FileStats;
use crate::warehouse::WarehouseWriter;
use std::path::Path;
use tracing::{debug, warn};

/// Load one song metadata file: the artist row first, then the song row that
/// references it. Both inserts are no-ops when the id already exists.
pub fn process_song_file(
    writer: &dyn WarehouseWriter,
    path: &Path,
    text: &str,
) -> Result<FileStats, EtlError> {
    let records = parse_song_file(text).map_err(|reason| EtlError::malformed(path, None, reason))?;

    let record = match records.first() {
        Some(record) => record,
        None => return Err(EtlError::malformed(path, None, "no song record found")),
    };
    if records.len() > 1 {
        warn!(
            "{:?} holds {} song records, only the first is loaded",
            path,
            records.len()
        );
    }

    let artist_inserted = writer.insert_artist(&record.artist())?;
    let song_inserted = writer.insert_song(&record.song())?;
    debug!(
        "{:?}: artist {} ({}), song {} ({})",
        path,
        record.artist_id,
        if artist_inserted { "new" } else { "existing" },
        record.song_id,
        if song_inserted { "new" } else { "existing" },
    );

    Ok(FileStats {
        records_read: records.len(),
        records_loaded: 1,
        records_skipped: records.len() - 1,
        ..Default::default()
    })
}
