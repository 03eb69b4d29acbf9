// Copyright 2026 the cell-paint contributors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// A copy of the License is included in the LICENSE file at the root
// of this workspace.

//! The historical-log-backed duration estimator, grounded on
//! `original_source/timings.py`: averages observed `(source, arg)`
//! durations from a JSONL event log, then layers a static override table on
//! top exactly as `Estimates.update(overrides)` does. A miss is a hard
//! error per spec §4.9 — the commented-out `2.5s` default in the source is
//! deliberately not ported.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

/// The four devices the estimator tracks durations for, matching
/// `timings.py`'s `Literal['wash', 'disp', 'robotarm', 'incu']`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Source {
    Wash,
    Disp,
    Robotarm,
    Incu,
}

impl Source {
    pub fn name(&self) -> &'static str {
        match self {
            Source::Wash => "wash",
            Source::Disp => "disp",
            Source::Robotarm => "robotarm",
            Source::Incu => "incu",
        }
    }

    fn parse(s: &str) -> Option<Source> {
        match s {
            "wash" => Some(Source::Wash),
            "disp" => Some(Source::Disp),
            "robotarm" => Some(Source::Robotarm),
            "incu" => Some(Source::Incu),
            _ => None,
        }
    }
}

/// Everything that can go wrong loading or querying an [`Estimator`].
#[derive(Debug, Error)]
pub enum EstimatorError {
    #[error("reading estimator log {path:?}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed estimator log line {line_no} of {path:?}: {source}")]
    Json {
        path: String,
        line_no: usize,
        #[source]
        source: serde_json::Error,
    },
    /// No log entry, nor override, has ever recorded this `(source, arg)`
    /// pair. Spec §4.9: lookup must fail loudly rather than fall back to a
    /// default.
    #[error("no duration estimate for ({0}, {1:?}); add a log entry or override")]
    MissingEstimate(&'static str, String),
}

#[derive(Deserialize)]
struct LogLine {
    source: Option<String>,
    arg: Option<String>,
    duration: Option<f64>,
}

/// A `(device, argument) -> seconds` lookup table built from historical
/// averages and operator overrides.
#[derive(Debug, Clone, Default)]
pub struct Estimator {
    table: HashMap<(Source, String), f64>,
}

impl Estimator {
    /// An estimator with no entries at all; every lookup fails. Useful as a
    /// base to layer overrides onto in tests.
    pub fn empty() -> Estimator {
        Estimator {
            table: HashMap::new(),
        }
    }

    /// Loads a JSONL historical event log (one `{"source", "arg",
    /// "duration"}` object per line; unrelated lines and fields are
    /// ignored) and averages every observed duration per `(source, arg)`,
    /// matching `estimates_from`.
    pub fn from_log_file(path: impl AsRef<Path>) -> Result<Estimator, EstimatorError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| EstimatorError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let reader = BufReader::new(file);

        let mut sums: HashMap<(Source, String), (f64, usize)> = HashMap::new();
        for (line_no, line) in reader.lines().enumerate() {
            let line = line.map_err(|source| EstimatorError::Io {
                path: path.display().to_string(),
                source,
            })?;
            if line.trim().is_empty() {
                continue;
            }
            let parsed: LogLine = serde_json::from_str(&line).map_err(|source| EstimatorError::Json {
                path: path.display().to_string(),
                line_no: line_no + 1,
                source,
            })?;
            let (Some(source), Some(arg), Some(duration)) = (parsed.source, parsed.arg, parsed.duration) else {
                continue;
            };
            let Some(source) = Source::parse(&source) else {
                continue;
            };
            let entry = sums.entry((source, arg)).or_insert((0.0, 0));
            entry.0 += duration;
            entry.1 += 1;
        }

        let table = sums
            .into_iter()
            .map(|(k, (total, count))| (k, total / count as f64))
            .collect();
        Ok(Estimator { table })
    }

    /// Layers `overrides` on top of this estimator's table, overwriting any
    /// existing entry for the same key — matching `Estimates.update(overrides)`.
    pub fn with_overrides(mut self, overrides: impl IntoIterator<Item = ((Source, String), f64)>) -> Estimator {
        for (k, v) in overrides {
            self.table.insert(k, v);
        }
        self
    }

    /// The standard operator override table, structurally grounded on
    /// `timings.py`'s `overrides` dict (the specific numbers there are
    /// site-tuned historical constants; these are representative stand-ins
    /// for the same purpose: robot-arm moves and device handshakes whose
    /// measured time is noisy enough that a fixed value beats an average).
    pub fn standard_overrides() -> Vec<((Source, String), f64)> {
        vec![
            ((Source::Robotarm, "noop".to_string()), 0.5),
            ((Source::Incu, "get_climate".to_string()), 1.1),
            ((Source::Disp, "TestCommunications".to_string()), 1.2),
            ((Source::Wash, "TestCommunications".to_string()), 1.3),
            ((Source::Robotarm, "r7 put return".to_string()), 2.7),
            ((Source::Robotarm, "r5 put return".to_string()), 2.7),
            ((Source::Robotarm, "r3 put return".to_string()), 2.7),
            ((Source::Robotarm, "r7 get prep".to_string()), 3.0),
            ((Source::Robotarm, "r5 get prep".to_string()), 4.0),
            ((Source::Robotarm, "r3 get prep".to_string()), 5.0),
            ((Source::Robotarm, "r1 get prep".to_string()), 6.0),
            ((Source::Robotarm, "r1 get transfer".to_string()), 6.0),
            ((Source::Robotarm, "out1 get prep".to_string()), 10.0),
            ((Source::Robotarm, "out1 get transfer".to_string()), 10.0),
        ]
    }

    /// Inserts or overwrites a single estimate, used by tests and by
    /// callers building a fixture table from scratch.
    pub fn insert(&mut self, source: Source, arg: impl Into<String>, secs: f64) {
        self.table.insert((source, arg.into()), secs);
    }

    /// Looks up the estimated duration for `(source, arg)`. Fails loudly on
    /// a miss rather than falling back to a default, per spec §4.9.
    pub fn estimate(&self, source: Source, arg: &str) -> Result<f64, EstimatorError> {
        self.table
            .get(&(source, arg.to_string()))
            .copied()
            .ok_or_else(|| EstimatorError::MissingEstimate(source.name(), arg.to_string()))
    }

    /// Whether `(source, arg)` has a recorded estimate, without producing an
    /// error — used by the optimizer's fast pre-check (spec §4.5: "missing
    /// estimates surface during planning").
    pub fn contains(&self, source: Source, arg: &str) -> bool {
        self.table.contains_key(&(source, arg.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn averages_repeated_observations() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"source":"wash","arg":"Run a.LHC","duration":10.0}}"#).unwrap();
        writeln!(file, r#"{{"source":"wash","arg":"Run a.LHC","duration":20.0}}"#).unwrap();
        writeln!(file, r#"{{"unrelated":"line"}}"#).unwrap();
        let estimator = Estimator::from_log_file(file.path()).unwrap();
        assert_eq!(estimator.estimate(Source::Wash, "Run a.LHC").unwrap(), 15.0);
    }

    #[test]
    fn overrides_win_over_log_averages() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"source":"robotarm","arg":"noop","duration":99.0}}"#).unwrap();
        let estimator = Estimator::from_log_file(file.path())
            .unwrap()
            .with_overrides(Estimator::standard_overrides());
        assert_eq!(estimator.estimate(Source::Robotarm, "noop").unwrap(), 0.5);
    }

    #[test]
    fn missing_key_is_a_hard_error() {
        let estimator = Estimator::empty();
        let err = estimator.estimate(Source::Incu, "nonexistent").unwrap_err();
        assert!(matches!(err, EstimatorError::MissingEstimate(_, _)));
    }

    #[test]
    fn loading_the_same_log_twice_is_deterministic() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"source":"disp","arg":"x","duration":5.0}}"#).unwrap();
        writeln!(file, r#"{{"source":"disp","arg":"x","duration":7.0}}"#).unwrap();
        let a = Estimator::from_log_file(file.path()).unwrap();
        let b = Estimator::from_log_file(file.path()).unwrap();
        assert_eq!(a.estimate(Source::Disp, "x").unwrap(), b.estimate(Source::Disp, "x").unwrap());
    }

    proptest::proptest! {
        /// Invariant 7 (spec §8): the estimator's output is deterministic
        /// given the same input log and overrides, for arbitrary observed
        /// durations (not just the fixed example above).
        #[test]
        fn estimate_is_deterministic_given_the_same_log(
            durations in proptest::collection::vec(0.1f64..500.0, 1..6)
        ) {
            let mut file = tempfile::NamedTempFile::new().unwrap();
            for d in &durations {
                writeln!(file, r#"{{"source":"wash","arg":"Run a.LHC","duration":{d}}}"#).unwrap();
            }
            let a = Estimator::from_log_file(file.path())
                .unwrap()
                .with_overrides(Estimator::standard_overrides());
            let b = Estimator::from_log_file(file.path())
                .unwrap()
                .with_overrides(Estimator::standard_overrides());
            proptest::prop_assert_eq!(
                a.estimate(Source::Wash, "Run a.LHC").unwrap(),
                b.estimate(Source::Wash, "Run a.LHC").unwrap()
            );
        }
    }
}
