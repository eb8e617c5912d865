//! Terminal progress for a batch of input files.

use indicatif::{ProgressBar, ProgressStyle};
use std::time::{Duration, Instant};

pub struct BatchProgress {
    bar: ProgressBar,
    start_time: Instant,
}

impl BatchProgress {
    /// A bar over `total_files`. When `visible` is false nothing is drawn,
    /// which is what tests and non-interactive runs want.
    pub fn new(label: &str, total_files: u64, visible: bool) -> Self {
        let bar = if visible {
            ProgressBar::new(total_files)
        } else {
            ProgressBar::hidden()
        };

        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} {prefix} [{bar:40.cyan/blue}] {pos}/{len} files | {msg}")
        {
            bar.set_style(style.progress_chars("#>-"));
        }
        bar.set_prefix(label.to_string());

        BatchProgress {
            bar,
            start_time: Instant::now(),
        }
    }

    pub fn file_done(&self, file: &str) {
        self.bar.inc(1);
        self.bar.set_message(file.to_string());
    }

    pub fn finish(self, msg: impl Into<String>) -> Duration {
        self.bar.finish_with_message(msg.into());
        self.start_time.elapsed()
    }

    pub fn position(&self) -> u64 {
        self.bar.position()
    }
}
