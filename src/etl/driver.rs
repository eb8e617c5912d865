//! Batch driver: walks a data tree and loads each file in its own transaction.

use super::error::EtlError;
use super::log_file::process_log_file;
use super::progress::BatchProgress;
use super::retry_policy::RetryPolicy;
use super::song_file::process_song_file;
use super::stats::FileStats;
use crate::config::AppConfig;
use crate::warehouse::{Dataset, SqliteWarehouse, WarehouseWriter};
use sha2::{Digest, Sha256};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};
use walkdir::WalkDir;

pub const DATA_FILE_EXTENSION: &str = "json";

/// Loads one file's text through a writer bound to the file's transaction.
pub type Processor = fn(&dyn WarehouseWriter, &Path, &str) -> Result<FileStats, EtlError>;

pub fn processor_for(dataset: Dataset) -> Processor {
    match dataset {
        Dataset::Songs => process_song_file,
        Dataset::Logs => process_log_file,
    }
}

#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub reload: bool,
    pub fail_fast: bool,
    pub show_progress: bool,
    pub retry: RetryPolicy,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            reload: false,
            fail_fast: false,
            show_progress: false,
            retry: RetryPolicy::default(),
        }
    }
}

impl BatchOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            reload: config.reload,
            fail_fast: config.fail_fast,
            show_progress: config.show_progress,
            retry: RetryPolicy::new(&config.retry),
        }
    }
}

#[derive(Debug)]
pub enum FileOutcome {
    Loaded(FileStats),
    /// Same content was committed by an earlier run.
    AlreadyLoaded,
    Failed(EtlError),
}

#[derive(Debug)]
pub struct FileReport {
    /// Path relative to the batch root, with `/` separators.
    pub path: String,
    pub outcome: FileOutcome,
}

#[derive(Debug)]
pub struct BatchReport {
    pub dataset: Dataset,
    pub files_found: usize,
    pub files: Vec<FileReport>,
    pub totals: FileStats,
}

impl BatchReport {
    pub fn loaded(&self) -> usize {
        self.files
            .iter()
            .filter(|f| matches!(f.outcome, FileOutcome::Loaded(_)))
            .count()
    }

    pub fn already_loaded(&self) -> usize {
        self.files
            .iter()
            .filter(|f| matches!(f.outcome, FileOutcome::AlreadyLoaded))
            .count()
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &EtlError)> {
        self.files.iter().filter_map(|f| match &f.outcome {
            FileOutcome::Failed(e) => Some((f.path.as_str(), e)),
            _ => None,
        })
    }

    pub fn has_failures(&self) -> bool {
        self.failures().next().is_some()
    }

    /// Files that were never attempted because the batch stopped early.
    pub fn not_attempted(&self) -> usize {
        self.files_found - self.files.len()
    }

    pub fn summary(&self) -> String {
        let mut out = format!(
            "{}: {} files found, {} loaded, {} already loaded, {} failed",
            self.dataset,
            self.files_found,
            self.loaded(),
            self.already_loaded(),
            self.failures().count(),
        );
        if self.not_attempted() > 0 {
            let _ = write!(out, ", {} not attempted", self.not_attempted());
        }
        let _ = write!(out, " ({})", self.totals);
        for (path, e) in self.failures() {
            let _ = write!(out, "\n  FAILED {}: {}", path, e);
        }
        out
    }
}

/// Every regular file under `root` with the given extension (case
/// insensitive), sorted lexicographically.
pub fn discover_files(root: &Path, extension: &str) -> Result<Vec<PathBuf>, EtlError> {
    if !root.is_dir() {
        return Err(EtlError::MissingRoot(root.to_path_buf()));
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(root).follow_links(true) {
        let entry = entry.map_err(|e| EtlError::Io {
            path: e.path().unwrap_or(root).to_path_buf(),
            source: e.into(),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let matches = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case(extension));
        if matches {
            files.push(entry.into_path());
        }
    }
    files.sort();
    Ok(files)
}

pub fn content_hash(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

fn relative_path(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn load_file(
    store: &SqliteWarehouse,
    dataset: Dataset,
    path: &Path,
    relative: &str,
    processor: Processor,
    options: &BatchOptions,
) -> Result<Option<FileStats>, EtlError> {
    let bytes = std::fs::read(path).map_err(|source| EtlError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let hash = content_hash(&bytes);
    let text = String::from_utf8(bytes)
        .map_err(|e| EtlError::malformed(path, None, format!("not valid UTF-8: {}", e)))?;

    options.retry.run(
        || {
            store.with_file_transaction(|conn| -> Result<Option<FileStats>, EtlError> {
                if !options.reload {
                    match conn.loaded_file_hash(dataset, relative)? {
                        Some(previous) if previous == hash => return Ok(None),
                        Some(_) => warn!(
                            "{} changed since it was loaded, processing it again",
                            relative
                        ),
                        None => {}
                    }
                }
                let stats = processor(conn, path, &text)?;
                conn.record_loaded_file(dataset, relative, &hash, stats.records_loaded)?;
                Ok(Some(stats))
            })
        },
        |e, retry, wait| {
            warn!(
                "{} hit {}, retry {}/{} in {:?}",
                relative, e, retry, options.retry.max_retries, wait
            )
        },
    )
}

/// Load every data file under `root`, one transaction per file.
///
/// A failing file is rolled back and recorded in the report; later files are
/// still processed unless `fail_fast` is set. Only a missing or unreadable
/// root fails the batch as a whole.
pub fn run_batch(
    store: &SqliteWarehouse,
    dataset: Dataset,
    root: &Path,
    processor: Processor,
    options: &BatchOptions,
) -> Result<BatchReport, EtlError> {
    let paths = discover_files(root, DATA_FILE_EXTENSION)?;
    let num_files = paths.len();
    info!("{} files found in {:?}", num_files, root);

    let progress = BatchProgress::new(dataset.as_str(), num_files as u64, options.show_progress);
    let mut report = BatchReport {
        dataset,
        files_found: num_files,
        files: Vec::with_capacity(num_files),
        totals: FileStats::default(),
    };

    for (i, path) in paths.iter().enumerate() {
        let relative = relative_path(root, path);
        let outcome = match load_file(store, dataset, path, &relative, processor, options) {
            Ok(Some(stats)) => {
                report.totals += stats;
                FileOutcome::Loaded(stats)
            }
            Ok(None) => {
                info!("{} already loaded, skipping", relative);
                FileOutcome::AlreadyLoaded
            }
            Err(e) => {
                error!("Failed to load {}: {}", relative, e);
                FileOutcome::Failed(e)
            }
        };
        let failed = matches!(outcome, FileOutcome::Failed(_));
        report.files.push(FileReport {
            path: relative.clone(),
            outcome,
        });

        progress.file_done(&relative);
        info!("{}/{} files processed.", i + 1, num_files);

        if failed && options.fail_fast {
            warn!(
                "Stopping {} batch after first failure, {} files not attempted",
                dataset,
                num_files - i - 1
            );
            break;
        }
    }

    let elapsed = progress.finish(format!("{} done", dataset));
    info!("{} batch finished in {:.2?}", dataset, elapsed);
    Ok(report)
}

#[derive(Debug)]
pub struct PipelineReport {
    pub songs: BatchReport,
    /// `None` when the song batch failed under `fail_fast`, or when the log
    /// batch could not start (see `logs_error`).
    pub logs: Option<BatchReport>,
    /// Why the log batch did not run, e.g. a missing log root. The song
    /// batch is already committed at that point.
    pub logs_error: Option<EtlError>,
}

impl PipelineReport {
    pub fn has_failures(&self) -> bool {
        self.songs.has_failures()
            || self.logs_error.is_some()
            || self.logs.as_ref().is_some_and(|l| l.has_failures())
    }

    /// Failed files in both batches, plus one if the log batch never started.
    pub fn failure_count(&self) -> usize {
        self.songs.failures().count()
            + self.logs.as_ref().map_or(0, |l| l.failures().count())
            + usize::from(self.logs_error.is_some())
    }

    pub fn summary(&self) -> String {
        match (&self.logs, &self.logs_error) {
            (Some(logs), _) => format!("{}\n{}", self.songs.summary(), logs.summary()),
            (None, Some(e)) => format!("{}\nlogs: FAILED: {}", self.songs.summary(), e),
            (None, None) => format!("{}\nlogs: not run", self.songs.summary()),
        }
    }
}

/// Songs first so that play events can resolve against them, then logs.
///
/// A song batch that cannot start is an error. A log batch that cannot start
/// is recorded in the report, since the songs are already committed by then.
pub fn run_pipeline(
    store: &SqliteWarehouse,
    song_root: &Path,
    log_root: &Path,
    options: &BatchOptions,
) -> Result<PipelineReport, EtlError> {
    let songs = run_batch(
        store,
        Dataset::Songs,
        song_root,
        processor_for(Dataset::Songs),
        options,
    )?;

    if songs.has_failures() && options.fail_fast {
        return Ok(PipelineReport {
            songs,
            logs: None,
            logs_error: None,
        });
    }

    match run_batch(
        store,
        Dataset::Logs,
        log_root,
        processor_for(Dataset::Logs),
        options,
    ) {
        Ok(logs) => Ok(PipelineReport {
            songs,
            logs: Some(logs),
            logs_error: None,
        }),
        Err(e) => {
            error!("Log batch did not run: {}", e);
            Ok(PipelineReport {
                songs,
                logs: None,
                logs_error: Some(e),
            })
        }
    }
}
