use std::fmt;
use std::ops::AddAssign;

/// Per-file processing counters, summed into the batch totals.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FileStats {
    pub records_read: usize,
    pub records_loaded: usize,
    /// Malformed or ignored records.
    pub records_skipped: usize,
    /// Log events that are not song plays.
    pub records_filtered: usize,
    pub songplays: usize,
    /// Songplays whose song and artist were resolved.
    pub lookup_hits: usize,
}

impl AddAssign for FileStats {
    fn add_assign(&mut self, other: Self) {
        self.records_read += other.records_read;
        self.records_loaded += other.records_loaded;
        self.records_skipped += other.records_skipped;
        self.records_filtered += other.records_filtered;
        self.songplays += other.songplays;
        self.lookup_hits += other.lookup_hits;
    }
}

impl fmt::Display for FileStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} records read, {} loaded, {} skipped, {} filtered",
            self.records_read, self.records_loaded, self.records_skipped, self.records_filtered
        )?;
        if self.songplays > 0 {
            write!(
                f,
                ", {} songplays ({} matched)",
                self.songplays, self.lookup_hits
            )?;
        }
        Ok(())
    }
}
