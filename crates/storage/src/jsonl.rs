// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! JSONL file history backend.
//!
//! Each retained event is a single line of JSON:
//! `{"seq":N,"event":{...}}\n`. The sequence is monotonic per file and
//! recovers replay order. A corrupt tail is rotated to `.bak` on open,
//! preserving the valid prefix.

use crate::{EventVisitor, HistoryBackend, HistoryError};
use async_trait::async_trait;
use parking_lot::Mutex;
use relay_core::{Event, HistoryFilter, SessionId};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Serialization helper for writing records without cloning the event.
#[derive(Serialize)]
struct LogRecordRef<'a> {
    seq: u64,
    event: &'a Event,
}

/// Deserialization helper for reading records.
#[derive(Deserialize)]
struct LogRecord {
    seq: u64,
    event: Event,
}

struct JsonlInner {
    file: File,
    path: PathBuf,
    /// Next sequence number to assign
    next_seq: u64,
}

/// History backend appending to a single JSONL file.
pub struct JsonlBackend {
    inner: Mutex<JsonlInner>,
}

impl JsonlBackend {
    /// Open or create the event log at the given path.
    ///
    /// A parse failure mid-file rotates the log to `.bak` and rewrites it
    /// with only the valid prefix, so one torn write cannot poison reads.
    pub fn open(path: &Path) -> Result<Self, HistoryError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut file = Self::open_append(path)?;
        let (mut max_seq, corrupt) = Self::scan(&file)?;

        if corrupt {
            let valid_lines = Self::read_valid_lines(&file)?;
            drop(file);

            let bak_path = path.with_extension("jsonl.bak");
            warn!(
                path = %path.display(),
                bak = %bak_path.display(),
                valid_entries = valid_lines.len(),
                "corrupt event log detected, rotating to .bak and preserving valid entries",
            );
            std::fs::rename(path, &bak_path)?;

            {
                let mut new_file = File::create(path)?;
                for line in &valid_lines {
                    new_file.write_all(line.as_bytes())?;
                    new_file.write_all(b"\n")?;
                }
                new_file.sync_all()?;
            }

            file = Self::open_append(path)?;
            max_seq = Self::scan(&file)?.0;
        }

        Ok(Self {
            inner: Mutex::new(JsonlInner {
                file,
                path: path.to_owned(),
                next_seq: max_seq + 1,
            }),
        })
    }

    fn open_append(path: &Path) -> Result<File, HistoryError> {
        Ok(OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?)
    }

    /// Scan for the maximum sequence number. Returns `(max_seq, corrupt)`
    /// where `corrupt` is true if a parse error was encountered.
    fn scan(file: &File) -> Result<(u64, bool), HistoryError> {
        let mut reader = BufReader::new(file.try_clone()?);
        reader.seek(SeekFrom::Start(0))?;

        let mut max_seq = 0u64;
        let mut corrupt = false;
        let mut line = String::new();

        loop {
            line.clear();
            match reader.read_line(&mut line) {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                    corrupt = true;
                    break;
                }
                Err(e) => return Err(e.into()),
            }

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            match serde_json::from_str::<LogRecord>(trimmed) {
                Ok(record) => max_seq = max_seq.max(record.seq),
                Err(_) => {
                    corrupt = true;
                    break;
                }
            }
        }

        Ok((max_seq, corrupt))
    }

    /// Read all parseable lines, stopping at the first corrupt entry.
    fn read_valid_lines(file: &File) -> Result<Vec<String>, HistoryError> {
        let mut reader = BufReader::new(file.try_clone()?);
        reader.seek(SeekFrom::Start(0))?;

        let mut valid_lines = Vec::new();
        let mut line = String::new();

        loop {
            line.clear();
            match reader.read_line(&mut line) {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::InvalidData => break,
                Err(e) => return Err(e.into()),
            }

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            if serde_json::from_str::<LogRecord>(trimmed).is_err() {
                break;
            }
            valid_lines.push(trimmed.to_string());
        }

        Ok(valid_lines)
    }

    /// Read every record currently in the log, skipping a corrupt tail.
    fn read_records(inner: &JsonlInner) -> Result<Vec<LogRecord>, HistoryError> {
        let mut reader = BufReader::new(inner.file.try_clone()?);
        reader.seek(SeekFrom::Start(0))?;

        let mut records = Vec::new();
        let mut line = String::new();
        loop {
            line.clear();
            match reader.read_line(&mut line) {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::InvalidData => break,
                Err(e) => return Err(e.into()),
            }

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<LogRecord>(trimmed) {
                Ok(record) => records.push(record),
                Err(e) => {
                    warn!(
                        path = %inner.path.display(),
                        error = %e,
                        "corrupt event log entry, stopping replay at corruption point",
                    );
                    break;
                }
            }
        }
        Ok(records)
    }

    /// Rewrite the log keeping only records accepted by `keep`, via a
    /// temp file and atomic rename.
    fn rewrite(
        inner: &mut JsonlInner,
        mut keep: impl FnMut(&LogRecord) -> bool,
    ) -> Result<u64, HistoryError> {
        let records = Self::read_records(inner)?;
        let tmp_path = inner.path.with_extension("jsonl.tmp");

        let mut removed = 0u64;
        {
            let mut tmp_file = File::create(&tmp_path)?;
            for record in &records {
                if keep(record) {
                    let json = serde_json::to_vec(&LogRecordRef {
                        seq: record.seq,
                        event: &record.event,
                    })?;
                    tmp_file.write_all(&json)?;
                    tmp_file.write_all(b"\n")?;
                } else {
                    removed += 1;
                }
            }
            tmp_file.sync_all()?;
        }

        std::fs::rename(&tmp_path, &inner.path)?;
        inner.file = Self::open_append(&inner.path)?;
        Ok(removed)
    }
}

#[async_trait]
impl HistoryBackend for JsonlBackend {
    async fn append(&self, event: &Event) -> Result<(), HistoryError> {
        self.append_batch(std::slice::from_ref(event)).await
    }

    /// Write the whole batch, then one fsync: the durability point.
    async fn append_batch(&self, events: &[Event]) -> Result<(), HistoryError> {
        if events.is_empty() {
            return Ok(());
        }
        let mut inner = self.inner.lock();
        for event in events {
            let seq = inner.next_seq;
            inner.next_seq += 1;
            let mut json = serde_json::to_vec(&LogRecordRef { seq, event })?;
            json.push(b'\n');
            inner.file.write_all(&json)?;
        }
        inner.file.sync_all()?;
        Ok(())
    }

    async fn stream(
        &self,
        filter: &HistoryFilter,
        visitor: EventVisitor<'_>,
    ) -> Result<(), HistoryError> {
        let matching: Vec<Event> = {
            let inner = self.inner.lock();
            Self::read_records(&inner)?
                .into_iter()
                .map(|r| r.event)
                .filter(|e| filter.matches(e))
                .collect()
        };
        for event in matching {
            visitor(event);
        }
        Ok(())
    }

    async fn delete_session(&self, session_id: &SessionId) -> Result<(), HistoryError> {
        let mut inner = self.inner.lock();
        Self::rewrite(&mut inner, |r| r.event.meta.session_id != *session_id)?;
        Ok(())
    }

    async fn has_session_events(&self, session_id: &SessionId) -> Result<bool, HistoryError> {
        let inner = self.inner.lock();
        Ok(Self::read_records(&inner)?
            .iter()
            .any(|r| r.event.meta.session_id == *session_id))
    }

    async fn prune_before(&self, cutoff_ms: u64, limit: u64) -> Result<u64, HistoryError> {
        let mut inner = self.inner.lock();
        let mut deleted = 0u64;
        let removed = Self::rewrite(&mut inner, |r| {
            if deleted < limit && r.event.meta.timestamp_ms < cutoff_ms {
                deleted += 1;
                false
            } else {
                true
            }
        })?;
        Ok(removed)
    }
}

#[cfg(test)]
#[path = "jsonl_tests.rs"]
mod tests;
