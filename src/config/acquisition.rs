// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the furnace-control project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Acquisition and persistence configuration

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Configuration for the acquisition session and its output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcquisitionConfig {
    /// Interval in milliseconds between register poll passes.
    pub read_interval_ms: u64,

    /// Output file for buffered readings. Each acquisition run retargets
    /// output to `<experiment id>.jsonl` in the same directory.
    pub filepath: PathBuf,

    /// Campaign name; spaces are replaced with underscores in experiment
    /// ids derived from it.
    pub campaign: String,

    /// Largest setpoint change accepted in one step, in degrees.
    pub max_setpoint_step: f32,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            read_interval_ms: 500,
            filepath: PathBuf::from("data/furnace.jsonl"),
            campaign: "default campaign".to_string(),
            max_setpoint_step: 25.0,
        }
    }
}
