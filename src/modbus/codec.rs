// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the furnace-control project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Binary encoding of PLC values across Modbus registers
//!
//! All floating-point process variables are IEEE-754 32-bit values split
//! across two consecutive 16-bit registers. The PLC firmware uses big-endian
//! bytes within each word and little-endian word order (low word first).
//! That convention lives here and nowhere else; every read and write in the
//! system goes through these functions.

/// Value substituted when a register pair decodes to NaN.
///
/// Device transients can momentarily produce invalid float bit patterns;
/// those must not propagate NaN into channel state or stored data.
pub const FLOAT_SENTINEL: f32 = 0.0;

/// Encode a 32-bit float into two registers, low word first.
pub fn encode_float32(value: f32) -> [u16; 2] {
    let bytes = value.to_be_bytes();
    let high = u16::from_be_bytes([bytes[0], bytes[1]]);
    let low = u16::from_be_bytes([bytes[2], bytes[3]]);
    [low, high]
}

/// Decode two registers (low word first) into a 32-bit float.
///
/// A bit pattern that parses to NaN yields [`FLOAT_SENTINEL`] instead.
pub fn decode_float32(words: [u16; 2]) -> f32 {
    let [low, high] = words;
    let hb = high.to_be_bytes();
    let lb = low.to_be_bytes();
    let value = f32::from_be_bytes([hb[0], hb[1], lb[0], lb[1]]);
    if value.is_nan() {
        FLOAT_SENTINEL
    } else {
        value
    }
}

/// Project a coil bit onto an integer index.
///
/// Used where a coil semantically selects between two options, e.g. the
/// high-heater choice or the ASPC heating/cooling direction.
pub fn coil_as_index(bit: bool) -> u8 {
    u8::from(bit)
}
