// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the furnace-control project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Modbus transport abstraction
//!
//! A narrow interface over a Modbus/TCP master connection with explicit
//! connect/close/reconnect semantics. The production implementation wraps a
//! tokio-modbus client context; [`super::mock::MockTransport`] provides a
//! deterministic in-memory stand-in with the identical encode/decode path,
//! which the whole test suite relies on.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tokio_modbus::client::{tcp, Client, Context, Reader, Writer};
use tokio_modbus::Slave;

use super::codec::{decode_float32, encode_float32};
use crate::error::TransportError;

/// Minimal Modbus master interface.
///
/// All operations fail with [`TransportError`] on socket or timeout failure;
/// callers must not assume a partial write succeeded. Writes of one logical
/// float value are always issued as a single two-register call so concurrent
/// writers cannot interleave half a value.
#[async_trait]
pub trait ModbusTransport: Send {
    async fn connect(&mut self) -> Result<(), TransportError>;
    async fn close(&mut self) -> Result<(), TransportError>;
    fn is_connected(&self) -> bool;

    async fn read_coils(&mut self, addr: u16, count: u16) -> Result<Vec<bool>, TransportError>;
    async fn read_holding_registers(
        &mut self,
        addr: u16,
        count: u16,
    ) -> Result<Vec<u16>, TransportError>;
    async fn read_input_registers(
        &mut self,
        addr: u16,
        count: u16,
    ) -> Result<Vec<u16>, TransportError>;
    async fn write_coil(&mut self, addr: u16, value: bool) -> Result<(), TransportError>;
    async fn write_registers(&mut self, addr: u16, words: &[u16]) -> Result<(), TransportError>;

    /// Read a single coil as a bool.
    async fn read_coil(&mut self, addr: u16) -> Result<bool, TransportError> {
        let bits = self.read_coils(addr, 1).await?;
        Ok(bits.first().copied().unwrap_or(false))
    }

    /// Read a single coil projected onto an integer index.
    async fn read_coil_as_index(&mut self, addr: u16) -> Result<u8, TransportError> {
        Ok(super::codec::coil_as_index(self.read_coil(addr).await?))
    }

    /// Read and decode a float from two input registers.
    async fn read_float_input(&mut self, addr: u16) -> Result<f32, TransportError> {
        let words = self.read_input_registers(addr, 2).await?;
        Ok(decode_float32([words[0], words[1]]))
    }

    /// Read and decode a float from two holding registers.
    async fn read_float_holding(&mut self, addr: u16) -> Result<f32, TransportError> {
        let words = self.read_holding_registers(addr, 2).await?;
        Ok(decode_float32([words[0], words[1]]))
    }

    /// Encode and write a float across two holding registers in one call.
    async fn write_float(&mut self, addr: u16, value: f32) -> Result<(), TransportError> {
        let words = encode_float32(value);
        self.write_registers(addr, &words).await
    }
}

/// A transport shared between the read loop, the write-path setters and the
/// orchestrator. Request/response operations serialize on the mutex.
pub type SharedTransport = Arc<Mutex<Box<dyn ModbusTransport>>>;

/// Wrap a transport for shared ownership.
pub fn shared(transport: impl ModbusTransport + 'static) -> SharedTransport {
    Arc::new(Mutex::new(Box::new(transport)))
}

/// Modbus/TCP master over tokio-modbus.
pub struct TcpTransport {
    addr: SocketAddr,
    slave: Slave,
    request_timeout: Duration,
    ctx: Option<Context>,
}

impl TcpTransport {
    pub fn new(addr: SocketAddr, request_timeout: Duration) -> Self {
        Self {
            addr,
            slave: Slave(1),
            request_timeout,
            ctx: None,
        }
    }

    fn ctx(&mut self) -> Result<&mut Context, TransportError> {
        self.ctx.as_mut().ok_or(TransportError::NotConnected)
    }
}

#[async_trait]
impl ModbusTransport for TcpTransport {
    async fn connect(&mut self) -> Result<(), TransportError> {
        let connect = tcp::connect_slave(self.addr, self.slave);
        let ctx = match timeout(self.request_timeout, connect).await {
            Err(_) => return Err(TransportError::Timeout(self.request_timeout)),
            Ok(res) => res.map_err(|e| TransportError::Protocol(e.to_string()))?,
        };
        self.ctx = Some(ctx);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if let Some(mut ctx) = self.ctx.take() {
            // A failed disconnect still leaves the context dropped.
            let _ = ctx.disconnect().await;
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.ctx.is_some()
    }

    async fn read_coils(&mut self, addr: u16, count: u16) -> Result<Vec<bool>, TransportError> {
        let deadline = self.request_timeout;
        let ctx = self.ctx()?;
        match timeout(deadline, ctx.read_coils(addr, count)).await {
            Err(_) => Err(TransportError::Timeout(deadline)),
            Ok(Err(e)) => Err(TransportError::Protocol(e.to_string())),
            Ok(Ok(Err(code))) => Err(TransportError::Protocol(code.to_string())),
            Ok(Ok(Ok(bits))) => Ok(bits),
        }
    }

    async fn read_holding_registers(
        &mut self,
        addr: u16,
        count: u16,
    ) -> Result<Vec<u16>, TransportError> {
        let deadline = self.request_timeout;
        let ctx = self.ctx()?;
        match timeout(deadline, ctx.read_holding_registers(addr, count)).await {
            Err(_) => Err(TransportError::Timeout(deadline)),
            Ok(Err(e)) => Err(TransportError::Protocol(e.to_string())),
            Ok(Ok(Err(code))) => Err(TransportError::Protocol(code.to_string())),
            Ok(Ok(Ok(words))) => Ok(words),
        }
    }

    async fn read_input_registers(
        &mut self,
        addr: u16,
        count: u16,
    ) -> Result<Vec<u16>, TransportError> {
        let deadline = self.request_timeout;
        let ctx = self.ctx()?;
        match timeout(deadline, ctx.read_input_registers(addr, count)).await {
            Err(_) => Err(TransportError::Timeout(deadline)),
            Ok(Err(e)) => Err(TransportError::Protocol(e.to_string())),
            Ok(Ok(Err(code))) => Err(TransportError::Protocol(code.to_string())),
            Ok(Ok(Ok(words))) => Ok(words),
        }
    }

    async fn write_coil(&mut self, addr: u16, value: bool) -> Result<(), TransportError> {
        let deadline = self.request_timeout;
        let ctx = self.ctx()?;
        match timeout(deadline, ctx.write_single_coil(addr, value)).await {
            Err(_) => Err(TransportError::Timeout(deadline)),
            Ok(Err(e)) => Err(TransportError::Protocol(e.to_string())),
            Ok(Ok(Err(code))) => Err(TransportError::Protocol(code.to_string())),
            Ok(Ok(Ok(()))) => Ok(()),
        }
    }

    async fn write_registers(&mut self, addr: u16, words: &[u16]) -> Result<(), TransportError> {
        let deadline = self.request_timeout;
        let ctx = self.ctx()?;
        match timeout(deadline, ctx.write_multiple_registers(addr, words)).await {
            Err(_) => Err(TransportError::Timeout(deadline)),
            Ok(Err(e)) => Err(TransportError::Protocol(e.to_string())),
            Ok(Ok(Err(code))) => Err(TransportError::Protocol(code.to_string())),
            Ok(Ok(Ok(()))) => Ok(()),
        }
    }
}
