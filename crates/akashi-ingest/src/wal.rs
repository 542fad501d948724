// crates/akashi-ingest/src/wal.rs
// ============================================================================
// Module: Event Write-Ahead Log
// Description: Segmented, line-oriented on-disk log for buffered events.
// Purpose: Make buffered events crash-safe before the bulk flush commits them.
// Dependencies: akashi-core, serde, serde_json, std
// ============================================================================

//! ## Overview
//! The WAL appends one JSON record per admitted event before the event
//! enters the in-memory buffer. Segments rotate by byte size or record
//! count; sync behavior follows the configured mode (`always` fsyncs every
//! append, `interval` fsyncs on a timer, `never` relies on the OS). On
//! startup, surviving segments replay in append order; a corrupt line ends
//! replay of its segment (the tail after a torn write is untrusted).
//! Truncation removes only segments fully covered by a confirmed flush.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::fs::File;
use std::fs::OpenOptions;
use std::io::BufRead;
use std::io::BufReader;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;
use std::time::Instant;

use akashi_core::BufferedEvent;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Options
// ============================================================================

/// Sync behavior for WAL appends.
///
/// # Invariants
/// - `Always` makes `append` return only after the record is on stable
///   storage; the other modes trade durability for throughput.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WalSync {
    /// Fsync after every append.
    #[default]
    Always,
    /// Fsync when the configured interval has elapsed since the last sync.
    Interval(Duration),
    /// Never fsync; a crash may lose OS-buffered records.
    Never,
}

/// WAL configuration.
///
/// # Invariants
/// - `segment_max_bytes` and `segment_max_records` are greater than zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalOptions {
    /// Directory holding WAL segments.
    pub dir: PathBuf,
    /// Sync behavior.
    pub sync: WalSync,
    /// Segment rotation size in bytes.
    pub segment_max_bytes: u64,
    /// Segment rotation record count.
    pub segment_max_records: u64,
}

impl WalOptions {
    /// Returns options rooted at `dir` with the default limits.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            sync: WalSync::default(),
            segment_max_bytes: 16 * 1024 * 1024,
            segment_max_records: 100_000,
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// WAL errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum WalError {
    /// Filesystem operation failed.
    #[error("wal io error: {0}")]
    Io(#[from] std::io::Error),
    /// A record failed to serialize.
    #[error("wal encode error: {0}")]
    Encode(String),
    /// Options are out of range.
    #[error("wal invalid options: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Records and Segments
// ============================================================================

/// One durable WAL record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct WalRecord {
    /// Monotonic append index across segments.
    index: u64,
    /// The admitted event.
    event: BufferedEvent,
}

/// In-memory metadata for one on-disk segment.
#[derive(Debug, Clone, PartialEq, Eq)]
struct SegmentMeta {
    /// Append index of the segment's first record.
    first_index: u64,
    /// Append index of the segment's last record.
    last_index: u64,
    /// Segment file path.
    path: PathBuf,
}

/// Builds the file name for a segment starting at `first_index`.
fn segment_file_name(first_index: u64) -> String {
    format!("wal-{first_index:016}.log")
}

/// Parses a segment file name back into its starting index.
fn parse_segment_name(name: &str) -> Option<u64> {
    let stem = name.strip_prefix("wal-")?.strip_suffix(".log")?;
    stem.parse().ok()
}

// ============================================================================
// SECTION: WAL
// ============================================================================

/// Segmented write-ahead log for buffered events.
///
/// # Invariants
/// - Append indexes strictly increase across the log's lifetime.
/// - The active segment is always the newest segment.
pub struct EventWal {
    /// Configuration.
    options: WalOptions,
    /// Closed segments, oldest first.
    sealed: Vec<SegmentMeta>,
    /// Active segment file.
    active: File,
    /// Active segment metadata; `last_index < first_index` means empty.
    active_meta: SegmentMeta,
    /// Bytes written to the active segment.
    active_bytes: u64,
    /// Records written to the active segment.
    active_records: u64,
    /// Next append index.
    next_index: u64,
    /// Instant of the last fsync, for interval mode.
    last_sync: Instant,
}

impl EventWal {
    /// Opens the WAL, replaying surviving segments.
    ///
    /// Returns the WAL and the replayed events in append order. The caller
    /// re-enqueues records whose identifiers are not yet in the primary
    /// store.
    ///
    /// # Errors
    ///
    /// Returns [`WalError`] on invalid options or filesystem failure.
    pub fn open(options: WalOptions) -> Result<(Self, Vec<BufferedEvent>), WalError> {
        if options.segment_max_bytes == 0 || options.segment_max_records == 0 {
            return Err(WalError::Invalid("segment limits must be greater than zero".to_string()));
        }
        fs::create_dir_all(&options.dir)?;

        let mut starts: Vec<u64> = fs::read_dir(&options.dir)?
            .filter_map(|entry| {
                let entry = entry.ok()?;
                parse_segment_name(&entry.file_name().to_string_lossy())
            })
            .collect();
        starts.sort_unstable();

        let mut sealed = Vec::new();
        let mut replayed = Vec::new();
        let mut next_index: u64 = 1;
        for first_index in &starts {
            let path = options.dir.join(segment_file_name(*first_index));
            let records = read_segment(&path);
            if records.is_empty() {
                // Empty or fully corrupt segments carry nothing forward.
                fs::remove_file(&path)?;
                continue;
            }
            let last_index = records[records.len() - 1].index;
            next_index = next_index.max(last_index + 1);
            sealed.push(SegmentMeta {
                first_index: records[0].index,
                last_index,
                path,
            });
            replayed.extend(records.into_iter().map(|record| record.event));
        }

        let active_meta = SegmentMeta {
            first_index: next_index,
            last_index: next_index - 1,
            path: options.dir.join(segment_file_name(next_index)),
        };
        let active =
            OpenOptions::new().create(true).append(true).open(&active_meta.path)?;

        tracing::info!(
            segments = sealed.len(),
            replayed = replayed.len(),
            "wal opened"
        );
        Ok((
            Self {
                options,
                sealed,
                active,
                active_meta,
                active_bytes: 0,
                active_records: 0,
                next_index,
                last_sync: Instant::now(),
            },
            replayed,
        ))
    }

    /// Appends one event, returning its append index.
    ///
    /// In `always` mode the record is on stable storage when this returns.
    ///
    /// # Errors
    ///
    /// Returns [`WalError`] when encoding or writing fails.
    pub fn append(&mut self, event: &BufferedEvent) -> Result<u64, WalError> {
        let index = self.next_index;
        let record = WalRecord {
            index,
            event: event.clone(),
        };
        let mut line =
            serde_json::to_string(&record).map_err(|err| WalError::Encode(err.to_string()))?;
        line.push('\n');
        self.active.write_all(line.as_bytes())?;

        self.next_index += 1;
        self.active_meta.last_index = index;
        self.active_bytes += line.len() as u64;
        self.active_records += 1;

        match self.options.sync {
            WalSync::Always => {
                self.active.sync_data()?;
                self.last_sync = Instant::now();
            }
            WalSync::Interval(interval) => {
                if self.last_sync.elapsed() >= interval {
                    self.active.sync_data()?;
                    self.last_sync = Instant::now();
                }
            }
            WalSync::Never => {}
        }

        if self.active_bytes >= self.options.segment_max_bytes
            || self.active_records >= self.options.segment_max_records
        {
            self.rotate()?;
        }
        Ok(index)
    }

    /// Forces an fsync of the active segment.
    ///
    /// # Errors
    ///
    /// Returns [`WalError`] when the sync fails.
    pub fn sync(&mut self) -> Result<(), WalError> {
        self.active.sync_data()?;
        self.last_sync = Instant::now();
        Ok(())
    }

    /// Removes segments whose records are all at or below `index`.
    ///
    /// Called after a successful bulk flush confirmed those records are
    /// durable downstream. Returns the number of removed segments.
    ///
    /// # Errors
    ///
    /// Returns [`WalError`] when a removal fails.
    pub fn truncate_through(&mut self, index: u64) -> Result<u64, WalError> {
        let mut removed = 0;
        while let Some(first) = self.sealed.first() {
            if first.last_index > index {
                break;
            }
            let meta = self.sealed.remove(0);
            fs::remove_file(&meta.path)?;
            removed += 1;
        }
        // The active segment seals and drops too once fully covered.
        if self.active_records > 0 && self.active_meta.last_index <= index {
            let old_path = self.active_meta.path.clone();
            self.rotate()?;
            if let Some(position) =
                self.sealed.iter().position(|segment| segment.path == old_path)
            {
                let meta = self.sealed.remove(position);
                fs::remove_file(&meta.path)?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Seals the active segment and starts a fresh one.
    fn rotate(&mut self) -> Result<(), WalError> {
        self.active.sync_data()?;
        self.sealed.push(self.active_meta.clone());
        let first_index = self.next_index;
        self.active_meta = SegmentMeta {
            first_index,
            last_index: first_index - 1,
            path: self.options.dir.join(segment_file_name(first_index)),
        };
        self.active =
            OpenOptions::new().create(true).append(true).open(&self.active_meta.path)?;
        self.active_bytes = 0;
        self.active_records = 0;
        Ok(())
    }

    /// Returns the number of on-disk segments, counting the active one.
    #[must_use]
    pub fn segment_count(&self) -> usize {
        self.sealed.len() + 1
    }
}

/// Reads one segment, stopping at the first corrupt line.
fn read_segment(path: &Path) -> Vec<WalRecord> {
    let Ok(file) = File::open(path) else {
        return Vec::new();
    };
    let reader = BufReader::new(file);
    let mut records = Vec::new();
    for line in reader.lines() {
        let Ok(line) = line else {
            tracing::warn!(path = %path.display(), "wal segment has an unreadable tail");
            break;
        };
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<WalRecord>(&line) {
            Ok(record) => records.push(record),
            Err(_) => {
                tracing::warn!(path = %path.display(), "wal segment has a corrupt tail");
                break;
            }
        }
    }
    records
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test-only panic-based assertions are permitted."
    )]

    use std::fs;
    use std::io::Write;

    use akashi_core::AgentId;
    use akashi_core::BufferedEvent;
    use akashi_core::EventKind;
    use akashi_core::NewEvent;
    use akashi_core::OrgId;
    use akashi_core::RunId;
    use serde_json::json;
    use time::OffsetDateTime;

    use super::EventWal;
    use super::WalOptions;
    use super::WalSync;

    /// Builds a buffered event for WAL tests.
    fn event(n: u64) -> BufferedEvent {
        BufferedEvent::admit(NewEvent {
            org_id: OrgId::generate(),
            agent_id: AgentId::new("writer"),
            run_id: RunId::generate(),
            kind: EventKind::ToolCallStarted,
            occurred_at: OffsetDateTime::from_unix_timestamp(1_700_000_000).expect("timestamp"),
            payload: json!({"n": n}),
        })
    }

    #[test]
    fn replay_returns_appended_events_in_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut expected = Vec::new();
        {
            let (mut wal, replayed) =
                EventWal::open(WalOptions::new(dir.path())).expect("open");
            assert!(replayed.is_empty());
            for n in 0..5 {
                let item = event(n);
                wal.append(&item).expect("append");
                expected.push(item);
            }
        }
        let (_wal, replayed) = EventWal::open(WalOptions::new(dir.path())).expect("reopen");
        assert_eq!(replayed, expected);
    }

    #[test]
    fn rotation_by_record_count_creates_segments() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut options = WalOptions::new(dir.path());
        options.segment_max_records = 2;
        let (mut wal, _) = EventWal::open(options).expect("open");
        for n in 0..5 {
            wal.append(&event(n)).expect("append");
        }
        assert!(wal.segment_count() >= 3);
    }

    #[test]
    fn truncate_removes_covered_segments() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut options = WalOptions::new(dir.path());
        options.segment_max_records = 2;
        let (mut wal, _) = EventWal::open(options).expect("open");
        let mut last = 0;
        for n in 0..6 {
            last = wal.append(&event(n)).expect("append");
        }
        let removed = wal.truncate_through(last).expect("truncate");
        assert!(removed >= 3);
        let (_wal, replayed) =
            EventWal::open(WalOptions::new(dir.path())).expect("reopen");
        assert!(replayed.is_empty());
    }

    #[test]
    fn corrupt_tail_is_dropped_on_replay() {
        let dir = tempfile::tempdir().expect("tempdir");
        {
            let (mut wal, _) = EventWal::open(WalOptions::new(dir.path())).expect("open");
            wal.append(&event(0)).expect("append");
            wal.append(&event(1)).expect("append");
        }
        // Simulate a torn write on the newest segment.
        let newest = fs::read_dir(dir.path())
            .expect("read dir")
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .max()
            .expect("segment");
        let mut file = fs::OpenOptions::new().append(true).open(&newest).expect("open");
        file.write_all(b"{\"index\": 3, \"event\": {\"truncat").expect("write");
        drop(file);

        let (_wal, replayed) = EventWal::open(WalOptions::new(dir.path())).expect("reopen");
        assert_eq!(replayed.len(), 2);
    }

    #[test]
    fn interval_mode_appends_without_explicit_sync() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut options = WalOptions::new(dir.path());
        options.sync = WalSync::Interval(std::time::Duration::from_secs(3_600));
        let (mut wal, _) = EventWal::open(options).expect("open");
        wal.append(&event(0)).expect("append");
        wal.sync().expect("sync");
    }
}
