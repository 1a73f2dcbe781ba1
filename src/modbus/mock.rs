// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the furnace-control project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Deterministic in-memory Modbus transport
//!
//! Stores register state in plain word maps and runs every float value
//! through the same codec as the TCP transport, so the rest of the system
//! can be exercised without hardware. Faults can be armed to fail the
//! nth following operation, which the orchestrator tests use to inject
//! transport failures mid-sequence.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::codec::{decode_float32, encode_float32};
use super::transport::ModbusTransport;
use crate::error::TransportError;

/// Record of a write issued through the mock, for assertions on strobe
/// coils and write ordering.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    Coil(u16, bool),
    Registers(u16, Vec<u16>),
}

#[derive(Default)]
pub struct MockTransport {
    coils: HashMap<u16, bool>,
    input: HashMap<u16, u16>,
    holding: HashMap<u16, u16>,
    connected: bool,
    /// Writes in issue order.
    pub writes: Vec<WriteOp>,
    /// When set, the counter decrements on every operation and the
    /// operation that reaches zero fails.
    fail_after: Option<u32>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            connected: true,
            ..Self::default()
        }
    }

    /// Arm a fault: the `n`th operation from now (1-based) fails with a
    /// protocol error, subsequent operations succeed again.
    pub fn fail_after(&mut self, n: u32) {
        self.fail_after = Some(n);
    }

    fn check_fault(&mut self) -> Result<(), TransportError> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }
        if let Some(n) = self.fail_after {
            if n <= 1 {
                self.fail_after = None;
                return Err(TransportError::Protocol("injected fault".into()));
            }
            self.fail_after = Some(n - 1);
        }
        Ok(())
    }

    /// Seed a float into two input registers through the real codec.
    pub fn set_float_input(&mut self, addr: u16, value: f32) {
        let words = encode_float32(value);
        self.input.insert(addr, words[0]);
        self.input.insert(addr + 1, words[1]);
    }

    /// Seed a float into two holding registers through the real codec.
    pub fn set_float_holding(&mut self, addr: u16, value: f32) {
        let words = encode_float32(value);
        self.holding.insert(addr, words[0]);
        self.holding.insert(addr + 1, words[1]);
    }

    /// Decode the float currently stored at a holding register pair.
    pub fn float_holding(&self, addr: u16) -> f32 {
        let low = self.holding.get(&addr).copied().unwrap_or(0);
        let high = self.holding.get(&(addr + 1)).copied().unwrap_or(0);
        decode_float32([low, high])
    }

    pub fn set_coil(&mut self, addr: u16, value: bool) {
        self.coils.insert(addr, value);
    }

    pub fn coil(&self, addr: u16) -> bool {
        self.coils.get(&addr).copied().unwrap_or(false)
    }

    /// Count the writes issued to one coil, strobe assertions rely on this.
    pub fn coil_writes(&self, addr: u16) -> usize {
        self.writes
            .iter()
            .filter(|w| matches!(w, WriteOp::Coil(a, _) if *a == addr))
            .count()
    }
}

/// Transport facade over a mock kept behind a shared handle.
///
/// Higher layers take ownership of their transport, which would make the
/// mock unreachable for test assertions. `SharedMock::new` returns both the
/// facade to hand over and a handle the test keeps for seeding registers
/// and inspecting writes.
pub struct SharedMock(Arc<Mutex<MockTransport>>);

impl SharedMock {
    pub fn new() -> (Self, Arc<Mutex<MockTransport>>) {
        let inner = Arc::new(Mutex::new(MockTransport::new()));
        (Self(inner.clone()), inner)
    }
}

#[async_trait]
impl ModbusTransport for SharedMock {
    async fn connect(&mut self) -> Result<(), TransportError> {
        self.0.lock().await.connect().await
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.0.lock().await.close().await
    }

    fn is_connected(&self) -> bool {
        // The owner serializes operations, so the inner lock is free here.
        self.0.try_lock().map(|m| m.is_connected()).unwrap_or(false)
    }

    async fn read_coils(&mut self, addr: u16, count: u16) -> Result<Vec<bool>, TransportError> {
        self.0.lock().await.read_coils(addr, count).await
    }

    async fn read_holding_registers(
        &mut self,
        addr: u16,
        count: u16,
    ) -> Result<Vec<u16>, TransportError> {
        self.0.lock().await.read_holding_registers(addr, count).await
    }

    async fn read_input_registers(
        &mut self,
        addr: u16,
        count: u16,
    ) -> Result<Vec<u16>, TransportError> {
        self.0.lock().await.read_input_registers(addr, count).await
    }

    async fn write_coil(&mut self, addr: u16, value: bool) -> Result<(), TransportError> {
        self.0.lock().await.write_coil(addr, value).await
    }

    async fn write_registers(&mut self, addr: u16, words: &[u16]) -> Result<(), TransportError> {
        self.0.lock().await.write_registers(addr, words).await
    }
}

#[async_trait]
impl ModbusTransport for MockTransport {
    async fn connect(&mut self) -> Result<(), TransportError> {
        self.connected = true;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.connected = false;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn read_coils(&mut self, addr: u16, count: u16) -> Result<Vec<bool>, TransportError> {
        self.check_fault()?;
        Ok((0..count)
            .map(|i| self.coils.get(&(addr + i)).copied().unwrap_or(false))
            .collect())
    }

    async fn read_holding_registers(
        &mut self,
        addr: u16,
        count: u16,
    ) -> Result<Vec<u16>, TransportError> {
        self.check_fault()?;
        Ok((0..count)
            .map(|i| self.holding.get(&(addr + i)).copied().unwrap_or(0))
            .collect())
    }

    async fn read_input_registers(
        &mut self,
        addr: u16,
        count: u16,
    ) -> Result<Vec<u16>, TransportError> {
        self.check_fault()?;
        Ok((0..count)
            .map(|i| self.input.get(&(addr + i)).copied().unwrap_or(0))
            .collect())
    }

    async fn write_coil(&mut self, addr: u16, value: bool) -> Result<(), TransportError> {
        self.check_fault()?;
        self.coils.insert(addr, value);
        self.writes.push(WriteOp::Coil(addr, value));
        Ok(())
    }

    async fn write_registers(&mut self, addr: u16, words: &[u16]) -> Result<(), TransportError> {
        self.check_fault()?;
        for (i, word) in words.iter().enumerate() {
            self.holding.insert(addr + i as u16, *word);
        }
        self.writes.push(WriteOp::Registers(addr, words.to_vec()));
        Ok(())
    }
}
