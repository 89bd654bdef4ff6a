//! Per-region append-only output files.

use std::collections::HashSet;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use crate::error::SinkError;
use crate::record::Record;

/// Header of every per-region output file, written exactly once on creation.
pub const OUTPUT_HEADER: [&str; 5] =
    ["Country", "Region", "Year", "GDP_per_capita", "Life_expectancy"];

/// Result of appending one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    Written,
    /// The record's dedup key was already present; nothing was written.
    Duplicate,
}

/// Append-only writer for one region's output file.
///
/// The file (and the output directory) is created lazily on the first
/// matching record, with the header written once. Each append opens and
/// closes the file; no handle is held between appends.
///
/// Appends are idempotent under broker redelivery: a `(country, year)` key
/// set, seeded from the existing file on first use, turns duplicates into
/// no-ops. Output files are partitioned by region, so no two workers ever
/// share a sink.
pub struct RegionSink {
    region: String,
    path: PathBuf,
    seen: Option<HashSet<(String, String)>>,
}

impl RegionSink {
    pub fn new(output_dir: &Path, region: &str) -> Self {
        Self {
            region: region.to_string(),
            path: output_dir.join(format!("{region}.csv")),
            seen: None,
        }
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record, creating the file (with header) if needed.
    pub fn append(&mut self, record: &Record) -> Result<AppendOutcome, SinkError> {
        self.ensure_loaded()?;
        let seen = self.seen.get_or_insert_with(HashSet::new);

        let key = (record.country.clone(), record.year.clone());
        if seen.contains(&key) {
            return Ok(AppendOutcome::Duplicate);
        }

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let new_file = !self.path.exists();
        let file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&self.path)?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        if new_file {
            writer.write_record(OUTPUT_HEADER)?;
        }
        writer.write_record([
            record.country.as_str(),
            record.region.as_str(),
            record.year.as_str(),
            record.gdp_per_capita.as_str(),
            record.life_expectancy.as_str(),
        ])?;
        writer.flush()?;

        seen.insert(key);
        Ok(AppendOutcome::Written)
    }

    /// Seed the dedup set from any rows already on disk (a previous run,
    /// or a crash between write and ack).
    fn ensure_loaded(&mut self) -> Result<(), SinkError> {
        if self.seen.is_some() {
            return Ok(());
        }
        let mut seen = HashSet::new();
        if self.path.exists() {
            let mut reader = csv::ReaderBuilder::new()
                .has_headers(true)
                .from_path(&self.path)?;
            for row in reader.records() {
                let row = row?;
                if let (Some(country), Some(year)) = (row.get(0), row.get(2)) {
                    seen.insert((country.to_string(), year.to_string()));
                }
            }
        }
        self.seen = Some(seen);
        Ok(())
    }
}

// ── Tests ───────────────────────────────────────────────────────────
