// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the furnace-control project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Modbus layer: register codec and transport
//!
//! For avoiding confusion with the Modbus master/slave terminology, this
//! module uses the terms "client" and "device": the client is this process,
//! the device is the PLC answering requests.

pub mod codec;
pub mod mock;
pub mod transport;

pub use codec::{decode_float32, encode_float32, FLOAT_SENTINEL};
pub use mock::{MockTransport, SharedMock, WriteOp};
pub use transport::{shared, ModbusTransport, SharedTransport, TcpTransport};
