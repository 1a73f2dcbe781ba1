// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the furnace-control project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Modbus client configuration
//!
//! Network settings for the two Modbus/TCP devices the controller talks
//! to: the furnace PLC and the trigger PLC.

use serde::{Deserialize, Serialize};

/// Configuration for the Modbus/TCP connections.
///
/// The furnace and the trigger timers are separate PLCs, each with its own
/// address and port. The request timeout applies to every individual
/// Modbus request on either connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModbusConfig {
    /// Address of the furnace PLC.
    pub furnace_address: String,

    /// TCP port of the furnace PLC.
    pub furnace_port: u16,

    /// Address of the trigger PLC.
    pub trigger_address: String,

    /// TCP port of the trigger PLC.
    pub trigger_port: u16,

    /// Per-request timeout in milliseconds.
    pub request_timeout_ms: u64,
}

impl Default for ModbusConfig {
    fn default() -> Self {
        Self {
            furnace_address: "192.168.0.159".to_string(),
            furnace_port: 502,
            trigger_address: "192.168.0.160".to_string(),
            trigger_port: 502,
            request_timeout_ms: 1000,
        }
    }
}
