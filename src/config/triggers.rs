// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the furnace-control project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Trigger timer configuration

use serde::{Deserialize, Serialize};

/// One PLC timer. Position in the list maps to the timer's register block
/// on the trigger PLC, so order matters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimerConfig {
    /// Unique timer name; camera timers must match their camera's name.
    pub name: String,

    /// Initial pulse frequency in Hz, written at startup.
    pub frequency_hz: f64,
}

/// Configuration for the trigger PLC timers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggersConfig {
    /// Timers in register-block order.
    pub timers: Vec<TimerConfig>,

    /// Name of the reference timer; every other timer's frame target is
    /// derived from the reference target by frequency ratio.
    pub reference: String,
}

impl Default for TriggersConfig {
    fn default() -> Self {
        Self {
            timers: vec![
                TimerConfig {
                    name: "furnace".to_string(),
                    frequency_hz: 50.0,
                },
                TimerConfig {
                    name: "widefov".to_string(),
                    frequency_hz: 10.0,
                },
                TimerConfig {
                    name: "narrowfov".to_string(),
                    frequency_hz: 10.0,
                },
            ],
            reference: "furnace".to_string(),
        }
    }
}
