// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the furnace-control project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Error types for the furnace control system
//!
//! The taxonomy separates recoverable protocol failures from user input
//! errors and sequencing failures:
//! - [`TransportError`]: socket or timeout failure at the Modbus or telemetry
//!   layer; flags the connection as down, never terminates the process
//! - [`DecodeError`]: malformed telemetry packet; the sample is dropped
//! - [`ValidationError`]: user-supplied value out of bounds; rejected at the
//!   setter with prior state unchanged
//! - [`AcquisitionError`]: failure while sequencing an acquisition start/stop

use std::time::Duration;
use thiserror::Error;

/// Failure at the Modbus or telemetry transport layer.
///
/// Transport errors are recoverable: the owning loop closes the connection,
/// marks itself disconnected and waits for an explicit reconnect request.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Socket-level I/O failure.
    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),

    /// The device answered with a Modbus exception or the client library
    /// reported a protocol-level failure.
    #[error("modbus protocol failure: {0}")]
    Protocol(String),

    /// A request did not complete within the configured timeout.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// An operation was attempted while the transport is closed.
    #[error("transport is not connected")]
    NotConnected,
}

/// Malformed telemetry packet.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The received byte count does not match the fixed packet size.
    #[error("packet length {got} does not match expected {expected}")]
    Length { expected: usize, got: usize },

    /// The frame counter went backwards between two successful decodes,
    /// indicating a corrupted or re-ordered stream.
    #[error("frame counter regressed from {previous} to {current}")]
    CounterRegression { previous: u64, current: u64 },
}

/// User-supplied value rejected at a setter.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// Trigger frequencies must be strictly positive.
    #[error("frequency must be positive, got {0}")]
    NonPositiveFrequency(f64),

    /// Acquisition durations must be strictly positive.
    #[error("duration must be positive, got {0}")]
    NonPositiveDuration(f64),

    /// The named trigger does not exist.
    #[error("unknown trigger '{0}'")]
    UnknownTrigger(String),

    /// Targets cannot be scaled before the reference trigger has a known,
    /// non-zero frequency.
    #[error("reference trigger '{0}' has no usable frequency")]
    ReferenceFrequencyUnset(String),

    /// A setpoint change larger than the configured maximum step.
    #[error("setpoint step {step:.2} exceeds maximum {max:.2}")]
    SetpointStepTooLarge { step: f32, max: f32 },
}

/// Failure raised by a user-facing control setter, which can fail either on
/// validation or on the register write itself.
#[derive(Debug, Error)]
pub enum ControlError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Failure while sequencing an acquisition start or stop.
///
/// The orchestrator surfaces these to the caller without retrying; the
/// acquisition coil and `acquiring` flag are guaranteed to stay consistent.
#[derive(Debug, Error)]
pub enum AcquisitionError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Every camera subsystem failed to arm; the timers were not enabled.
    #[error("no acquisition subsystem is ready")]
    NoSubsystemReady,

    /// The metadata collaborator refused a field update or a flush.
    #[error("metadata store failure: {0}")]
    Metadata(String),
}
