// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the furnace-control project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Persistence sink contract and implementations
//!
//! The buffered acquisition path hands data off once per flush as a group
//! name plus ordered per-field value lists, with append-or-replace
//! semantics. File format details beyond that contract belong to external
//! writers; the crate ships a line-delimited JSON sink for standalone runs
//! and an in-memory sink for tests.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Context, Result};
use serde_json::json;

/// Receives one buffered batch per flush.
pub trait PersistenceSink: Send {
    /// Write ordered values for each named field under `group`.
    fn write(&mut self, group: &str, fields: &[(String, Vec<f64>)]) -> Result<()>;

    /// Redirect subsequent writes to output named after an experiment id.
    /// Sinks without file targets ignore this.
    fn retarget(&mut self, _experiment_id: &str) -> Result<()> {
        Ok(())
    }
}

/// Shared handle delegation, so a test can keep a second handle on the sink
/// it passed into the acquisition path.
impl<S: PersistenceSink> PersistenceSink for Arc<Mutex<S>> {
    fn write(&mut self, group: &str, fields: &[(String, Vec<f64>)]) -> Result<()> {
        self.lock()
            .map_err(|_| anyhow!("sink lock poisoned"))?
            .write(group, fields)
    }

    fn retarget(&mut self, experiment_id: &str) -> Result<()> {
        self.lock()
            .map_err(|_| anyhow!("sink lock poisoned"))?
            .retarget(experiment_id)
    }
}

/// Appends one JSON object per flush to a `.jsonl` file.
pub struct JsonlSink {
    directory: PathBuf,
    path: PathBuf,
    file: Option<File>,
}

impl JsonlSink {
    pub fn new(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let directory = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Self {
            directory,
            path,
            file: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn file(&mut self) -> Result<&mut File> {
        match self.file {
            Some(ref mut file) => Ok(file),
            None => {
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&self.path)
                    .with_context(|| format!("opening sink file {}", self.path.display()))?;
                Ok(self.file.insert(file))
            }
        }
    }
}

impl PersistenceSink for JsonlSink {
    fn write(&mut self, group: &str, fields: &[(String, Vec<f64>)]) -> Result<()> {
        let record = json!({
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "group": group,
            "fields": fields
                .iter()
                .map(|(name, values)| (name.clone(), json!(values)))
                .collect::<serde_json::Map<_, _>>(),
        });
        let file = self.file()?;
        writeln!(file, "{record}").context("writing sink record")?;
        Ok(())
    }

    /// Switch to `<experiment_id>.jsonl` in the sink's directory, closing
    /// the previous file.
    fn retarget(&mut self, experiment_id: &str) -> Result<()> {
        self.path = self.directory.join(format!("{experiment_id}.jsonl"));
        self.file = None;
        Ok(())
    }
}

/// In-memory sink recording every flush, for tests.
#[derive(Default)]
pub struct MemorySink {
    pub batches: Vec<(String, Vec<(String, Vec<f64>)>)>,
    pub retargets: Vec<String>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All values flushed so far for one field within one group,
    /// concatenated in flush order.
    pub fn values(&self, group: &str, field: &str) -> Vec<f64> {
        self.batches
            .iter()
            .filter(|(g, _)| g == group)
            .flat_map(|(_, fields)| {
                fields
                    .iter()
                    .filter(|(name, _)| name == field)
                    .flat_map(|(_, values)| values.iter().copied())
            })
            .collect()
    }
}

impl PersistenceSink for MemorySink {
    fn write(&mut self, group: &str, fields: &[(String, Vec<f64>)]) -> Result<()> {
        self.batches.push((group.to_string(), fields.to_vec()));
        Ok(())
    }

    fn retarget(&mut self, experiment_id: &str) -> Result<()> {
        self.retargets.push(experiment_id.to_string());
        Ok(())
    }
}
