// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the furnace-control project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Buffered accumulation of telemetry samples
//!
//! Decoded readings accumulate per field until the sample-count threshold is
//! reached, then the whole batch is flushed to the persistence sink and the
//! buffer cleared. Discrete named events are buffered alongside and flushed
//! with the batch. Appends and flushes are driven by a single owner, so a
//! flush can never observe a half-appended sample; every field list has the
//! same length at all times because one reading appends to all of them.

use anyhow::Result;

use crate::sink::PersistenceSink;
use crate::telemetry::TelemetryReading;

/// Group name for the primary per-sample batch.
pub const PRIMARY_GROUP: &str = "temperature_readings";
/// Group name for the lower-frequency control snapshot.
pub const SECONDARY_GROUP: &str = "control_readings";
/// Group name for discrete events.
pub const EVENT_GROUP: &str = "events";

/// A discrete named event pinned to a telemetry frame.
#[derive(Debug, Clone, PartialEq)]
pub struct BufferedEvent {
    pub frame: u64,
    pub key: String,
    pub value: f64,
}

pub struct AcquisitionBuffer {
    /// Field name to pending values, insertion order preserved.
    fields: Vec<(String, Vec<f64>)>,
    events: Vec<BufferedEvent>,
    threshold: usize,
}

impl AcquisitionBuffer {
    /// `threshold` is the sample count at which the buffer is considered
    /// full, nominally one second's worth of samples at the telemetry
    /// frequency.
    pub fn new(threshold: usize) -> Self {
        let fields = ["counter", "temperature_a", "temperature_b"]
            .into_iter()
            .map(|name| (name.to_string(), Vec::with_capacity(threshold)))
            .collect();
        Self {
            fields,
            events: Vec::new(),
            threshold,
        }
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Number of buffered samples.
    pub fn len(&self) -> usize {
        self.fields.first().map_or(0, |(_, values)| values.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() >= self.threshold
    }

    /// Append one decoded reading to every field list.
    pub fn append(&mut self, reading: &TelemetryReading) {
        for (name, values) in &mut self.fields {
            let value = match name.as_str() {
                "counter" => reading.counter as f64,
                "temperature_a" => f64::from(reading.temperature_a),
                "temperature_b" => f64::from(reading.temperature_b),
                _ => continue,
            };
            values.push(value);
        }
    }

    /// Buffer a discrete event against the given frame.
    pub fn push_event(&mut self, frame: u64, key: impl Into<String>, value: f64) {
        self.events.push(BufferedEvent {
            frame,
            key: key.into(),
            value,
        });
    }

    pub fn pending_events(&self) -> usize {
        self.events.len()
    }

    /// Flush all buffered samples to the sink and clear the field lists.
    ///
    /// The batch is handed to the sink before anything is cleared, so a
    /// sink failure leaves the buffer intact and no sample is lost.
    pub fn flush(&mut self, sink: &mut dyn PersistenceSink) -> Result<()> {
        sink.write(PRIMARY_GROUP, &self.fields)?;
        for (_, values) in &mut self.fields {
            values.clear();
        }
        Ok(())
    }

    /// Flush buffered events, grouped by key, then clear. Each distinct key
    /// becomes one group `events/<key>` with parallel frame and value lists,
    /// keeping the sink contract purely numeric.
    pub fn flush_events(&mut self, sink: &mut dyn PersistenceSink) -> Result<()> {
        if self.events.is_empty() {
            return Ok(());
        }
        let mut keys: Vec<&str> = self.events.iter().map(|e| e.key.as_str()).collect();
        keys.sort_unstable();
        keys.dedup();
        for key in keys {
            let matching = self.events.iter().filter(|e| e.key == key);
            let frames: Vec<f64> = matching.clone().map(|e| e.frame as f64).collect();
            let values: Vec<f64> = matching.map(|e| e.value).collect();
            let fields = [
                ("frame".to_string(), frames),
                ("value".to_string(), values),
            ];
            sink.write(&format!("{EVENT_GROUP}/{key}"), &fields)?;
        }
        self.events.clear();
        Ok(())
    }
}
