//! The triage cycle: ingest, classify, persist.
//!
//! Each stage isolates its own units of work (folder, batch, record) and
//! reports outcomes instead of failing; [`run_once`] threads the message list
//! through and condenses everything into a [`RunSummary`].

pub mod classify;
pub mod ingest;
pub mod persist;

use std::fmt;
use std::time::{Duration, Instant};

use chrono::{DateTime, NaiveDate, TimeZone, Utc};

use crate::triage::classify::Classifier;
use crate::triage::ingest::Ingestor;
use crate::triage::persist::Persister;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Completed,
    /// Nothing was fetched; the existing snapshot was left alone.
    NoInput,
    /// Every batch failed; the snapshot for the date was replaced by an empty one.
    ClassificationUnavailable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub run_date: NaiveDate,
    pub status: RunStatus,
    pub fetched: usize,
    pub folders_failed: usize,
    pub classified: usize,
    pub batches_failed: usize,
    pub important: usize,
    pub persisted: usize,
    pub writes_failed: usize,
    pub elapsed: Duration,
}

impl RunSummary {
    fn new(run_date: NaiveDate) -> Self {
        Self {
            run_date,
            status: RunStatus::Completed,
            fetched: 0,
            folders_failed: 0,
            classified: 0,
            batches_failed: 0,
            important: 0,
            persisted: 0,
            writes_failed: 0,
            elapsed: Duration::ZERO,
        }
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = match self.status {
            RunStatus::Completed => "completed",
            RunStatus::NoInput => "no input (snapshot untouched)",
            RunStatus::ClassificationUnavailable => "classification unavailable (snapshot emptied)",
        };
        writeln!(f, "triage run {} {status} in {:.1}s", self.run_date, self.elapsed.as_secs_f64())?;
        writeln!(f, "  fetched:    {} ({} folders failed)", self.fetched, self.folders_failed)?;
        writeln!(f, "  classified: {} ({} batches failed)", self.classified, self.batches_failed)?;
        writeln!(f, "  important:  {}", self.important)?;
        write!(f, "  persisted:  {} ({} writes failed)", self.persisted, self.writes_failed)
    }
}

/// The calendar date a run started at `now` belongs to, as seen in `tz`.
pub fn run_date_in<Tz: TimeZone>(now: DateTime<Utc>, tz: &Tz) -> NaiveDate {
    now.with_timezone(tz).date_naive()
}

/// Runs one full triage cycle as of `now`, tagging the snapshot `run_date`.
pub fn run_once(
    ingestor: &Ingestor<'_>,
    classifier: &Classifier<'_>,
    persister: &Persister<'_>,
    now: DateTime<Utc>,
    run_date: NaiveDate,
) -> RunSummary {
    let started = Instant::now();
    let mut summary = RunSummary::new(run_date);

    let ingested = ingestor.fetch(now);
    summary.fetched = ingested.messages.len();
    summary.folders_failed = ingested.failed_folders();
    if ingested.all_folders_failed() {
        log::warn!("every folder fetch failed");
    }
    if ingested.messages.is_empty() {
        log::info!("no messages to triage");
        summary.status = RunStatus::NoInput;
        summary.elapsed = started.elapsed();
        return summary;
    }

    let classified = classifier.classify(ingested.messages);
    summary.classified = classified.messages.len();
    summary.batches_failed = classified.failed_batches();
    if classified.all_batches_failed() {
        log::warn!("every classification batch failed");
        summary.status = RunStatus::ClassificationUnavailable;
    }

    // The snapshot is superseded even when nothing was classified.
    let persisted = persister.persist(&classified.messages, run_date, now);
    summary.important = persisted.important;
    summary.persisted = persisted.inserted;
    summary.writes_failed = persisted.failed.len();

    summary.elapsed = started.elapsed();
    summary
}
