//! Extract, transform and load of the song and activity log datasets.

mod calendar;
mod driver;
mod error;
mod log_file;
mod progress;
mod records;
mod retry_policy;
mod song_file;
mod stats;

pub use calendar::{derive_calendar_fields, time_row, CalendarFields};
pub use driver::{
    content_hash, discover_files, processor_for, run_batch, run_pipeline, BatchOptions,
    BatchReport, FileOutcome, FileReport, PipelineReport, Processor, DATA_FILE_EXTENSION,
};
pub use error::EtlError;
pub use log_file::process_log_file;
pub use records::{parse_log_lines, parse_song_file, LogEvent, SongPlayEvent, SongRecord};
pub use retry_policy::RetryPolicy;
pub use song_file::process_song_file;
pub use stats::FileStats;
