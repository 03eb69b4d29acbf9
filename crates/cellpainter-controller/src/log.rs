// Copyright 2026 the cell-paint contributors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// A copy of the License is included in the LICENSE file at the root
// of this workspace.

//! The run log, grounded on `LogEntry`/`Log` in
//! `original_source/cellpainter/log.py`: an append-only JSONL-able list of
//! entries, each either a `Checkpoint` timestamp, a paired `Duration`
//! end/start, or an error. `Log::checkpoints`/`Log::durations` mirror the
//! source's same-named properties; `Log::write_jsonl`/`from_jsonl` mirror
//! `utils.serializer.write_jsonl`/`from_jsonl`.

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use cellpainter_repr::metadata::Metadata;

/// A fatal or non-fatal error recorded against a [`LogEntry`], matching
/// `log.Error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogError {
    pub message: String,
    pub fatal: bool,
}

/// One entry in the run log. `t0` set marks this as the closing half of a
/// `Duration`; `source` names what kind of event this is (`"checkpoint"`,
/// `"duration"`, `"wash"`, `"disp"`, `"incu"`, `"robotarm"`, `"error"`).
/// `wall_time` is the absolute instant the entry was recorded, carried
/// alongside the clock-relative `t` so a JSONL log can be correlated
/// against other systems (device logs, operator notes) after the fact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub wall_time: DateTime<Utc>,
    pub t: f64,
    pub t0: Option<f64>,
    #[serde(default)]
    pub metadata: Metadata,
    pub source: String,
    pub name: Option<String>,
    pub msg: Option<String>,
    pub err: Option<LogError>,
}

impl LogEntry {
    pub fn checkpoint(t: f64, name: &str, metadata: Metadata) -> LogEntry {
        LogEntry {
            wall_time: Utc::now(),
            t,
            t0: None,
            metadata,
            source: "checkpoint".to_string(),
            name: Some(name.to_string()),
            msg: None,
            err: None,
        }
    }

    pub fn duration(t: f64, t0: f64, name: &str, metadata: Metadata) -> LogEntry {
        LogEntry {
            wall_time: Utc::now(),
            t,
            t0: Some(t0),
            metadata,
            source: "duration".to_string(),
            name: Some(name.to_string()),
            msg: None,
            err: None,
        }
    }

    pub fn device(t: f64, source: &str, name: Option<String>, metadata: Metadata) -> LogEntry {
        LogEntry {
            wall_time: Utc::now(),
            t,
            t0: None,
            metadata,
            source: source.to_string(),
            name,
            msg: None,
            err: None,
        }
    }

    pub fn error(t: f64, message: impl Into<String>, fatal: bool) -> LogEntry {
        LogEntry {
            wall_time: Utc::now(),
            t,
            t0: None,
            metadata: Metadata::new(),
            source: "error".to_string(),
            name: None,
            msg: None,
            err: Some(LogError {
                message: message.into(),
                fatal,
            }),
        }
    }

    /// The interval this entry closes, if it is a `Duration` end.
    pub fn duration_secs(&self) -> Option<f64> {
        self.t0.map(|t0| self.t - t0)
    }

    pub fn is_end(&self) -> bool {
        self.t0.is_some()
    }

    fn is_end_or_checkpoint(&self) -> bool {
        self.is_end() || self.source == "checkpoint"
    }
}

/// An append-only run log, matching `log.Log(list[LogEntry])`. `run_id` is
/// generated fresh per run so entries from two overlapping runs (e.g. an
/// operator re-launching after a crash) can never be confused once merged
/// into one historical estimator log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Log {
    pub run_id: Uuid,
    pub entries: Vec<LogEntry>,
}

impl Default for Log {
    fn default() -> Log {
        Log::new()
    }
}

impl Log {
    pub fn new() -> Log {
        Log {
            run_id: Uuid::new_v4(),
            entries: Vec::new(),
        }
    }

    pub fn push(&mut self, entry: LogEntry) {
        self.entries.push(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `name -> t` for every recorded checkpoint, matching `Log.checkpoints`.
    pub fn checkpoints(&self) -> HashMap<String, f64> {
        self.entries
            .iter()
            .filter(|e| e.source == "checkpoint")
            .filter_map(|e| e.name.clone().map(|n| (n, e.t)))
            .collect()
    }

    /// `name -> observed duration` for every closed `Duration`, matching
    /// `Log.durations`.
    pub fn durations(&self) -> HashMap<String, f64> {
        self.entries
            .iter()
            .filter(|e| e.source == "duration")
            .filter_map(|e| Some((e.name.clone()?, e.duration_secs()?)))
            .collect()
    }

    /// Every distinct metadata id mentioned anywhere in the log, matching
    /// `Log.ids`.
    pub fn ids(&self) -> HashSet<String> {
        self.entries.iter().filter_map(|e| e.metadata.id.clone()).collect()
    }

    /// Ids of entries that represent a completed command or checkpoint,
    /// matching `Log.finished` / `LogEntry.is_end_or_inf`.
    pub fn finished(&self) -> HashSet<String> {
        self.entries
            .iter()
            .filter(|e| e.is_end_or_checkpoint())
            .filter_map(|e| e.metadata.id.clone())
            .collect()
    }

    /// Every recorded error, matching `Log.errors`.
    pub fn errors(&self) -> Vec<&LogError> {
        self.entries.iter().filter_map(|e| e.err.as_ref()).collect()
    }

    pub fn num_plates(&self) -> usize {
        self.entries
            .iter()
            .filter_map(|e| e.metadata.plate_id.as_ref())
            .filter_map(|id| id.parse::<usize>().ok())
            .max()
            .unwrap_or(0)
    }

    pub fn write_jsonl(&self, path: impl AsRef<Path>) -> io::Result<()> {
        let mut file = File::create(path)?;
        for entry in &self.entries {
            let line = serde_json::to_string(entry)?;
            writeln!(file, "{line}")?;
        }
        Ok(())
    }

    /// Rebuilds a `Log` from a JSONL file of bare `LogEntry` lines. The
    /// original `run_id` isn't part of that per-line format (it's run-level
    /// metadata, not an event), so this assigns a fresh one; callers that
    /// care about the originating run read it from the entries' timestamps
    /// instead.
    pub fn from_jsonl(path: impl AsRef<Path>) -> io::Result<Log> {
        let file = File::open(path)?;
        let mut entries = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            entries.push(serde_json::from_str(&line)?);
        }
        Ok(Log {
            run_id: Uuid::new_v4(),
            entries,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checkpoints_reads_back_the_checkpoint_times() {
        let mut log = Log::new();
        log.push(LogEntry::checkpoint(1.0, "batch 0", Metadata::new()));
        log.push(LogEntry::checkpoint(5.0, "batch 1", Metadata::new()));
        let checkpoints = log.checkpoints();
        assert_eq!(checkpoints.get("batch 0"), Some(&1.0));
        assert_eq!(checkpoints.get("batch 1"), Some(&5.0));
    }

    #[test]
    fn durations_computes_the_closed_interval() {
        let mut log = Log::new();
        log.push(LogEntry::checkpoint(1.0, "batch 0", Metadata::new()));
        log.push(LogEntry::duration(4.5, 1.0, "batch 0", Metadata::new()));
        assert_eq!(log.durations().get("batch 0"), Some(&3.5));
    }

    #[test]
    fn errors_collects_every_fatal_and_non_fatal_entry() {
        let mut log = Log::new();
        log.push(LogEntry::error(1.0, "retrying", false));
        log.push(LogEntry::error(2.0, "giving up", true));
        let errors = log.errors();
        assert_eq!(errors.len(), 2);
        assert!(!errors[0].fatal);
        assert!(errors[1].fatal);
    }

    #[test]
    fn jsonl_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.jsonl");
        let mut log = Log::new();
        log.push(LogEntry::checkpoint(1.0, "batch 0", Metadata::new().with_plate_id("1")));
        log.push(LogEntry::duration(3.0, 1.0, "batch 0", Metadata::new()));
        log.write_jsonl(&path).unwrap();
        let read_back = Log::from_jsonl(&path).unwrap();
        assert_eq!(read_back.entries, log.entries);
    }

    #[test]
    fn finished_only_counts_ids_on_ends_and_checkpoints() {
        let mut log = Log::new();
        log.push(LogEntry::checkpoint(1.0, "c", Metadata::new().with_id("cmd1")));
        log.push(LogEntry::device(1.0, "robotarm", Some("move".to_string()), Metadata::new().with_id("cmd2")));
        let finished = log.finished();
        assert!(finished.contains("cmd1"));
        assert!(!finished.contains("cmd2"));
    }
}
