// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the furnace-control project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Telemetry TCP stream client
//!
//! The PLC exposes a second socket next to the Modbus port. On connect, the
//! client sends a short ASCII activation string; the PLC then pushes
//! unframed fixed-size packets. Since there is no delimiter, every receive
//! requests exactly one packet's worth of bytes.

use std::net::SocketAddr;
use std::time::Duration;

use log::debug;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::error::TransportError;

/// Activation string expected by the PLC before it starts streaming.
const ACTIVATION: &[u8] = b"1";

pub struct TelemetryClient {
    addr: SocketAddr,
    recv_timeout: Duration,
    packet_size: usize,
    stream: Option<TcpStream>,
}

impl TelemetryClient {
    pub fn new(addr: SocketAddr, packet_size: usize, recv_timeout: Duration) -> Self {
        Self {
            addr,
            recv_timeout,
            packet_size,
            stream: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Connect and send the activation string.
    pub async fn connect(&mut self) -> Result<(), TransportError> {
        let mut stream = TcpStream::connect(self.addr).await?;
        stream.write_all(ACTIVATION).await?;
        debug!("telemetry stream activated on {}", self.addr);
        self.stream = Some(stream);
        Ok(())
    }

    pub async fn close(&mut self) -> Result<(), TransportError> {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.shutdown().await;
        }
        Ok(())
    }

    /// Receive exactly one packet.
    ///
    /// Returns `Ok(None)` when no packet arrived within the receive timeout,
    /// which is a non-event for the stream loop. Any other socket failure
    /// closes the connection and is returned as a [`TransportError`].
    pub async fn recv_packet(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        let packet_size = self.packet_size;
        let deadline = self.recv_timeout;
        let stream = self.stream.as_mut().ok_or(TransportError::NotConnected)?;

        let mut buf = vec![0u8; packet_size];
        match timeout(deadline, stream.read_exact(&mut buf)).await {
            Err(_) => Ok(None),
            Ok(Ok(_)) => Ok(Some(buf)),
            Ok(Err(e)) => {
                self.stream = None;
                Err(TransportError::Io(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    /// Serve `packets` fixed-size packets after reading the activation byte.
    async fn serve_packets(packets: Vec<Vec<u8>>) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut activation = [0u8; 1];
            socket.read_exact(&mut activation).await.unwrap();
            assert_eq!(&activation, b"1");
            for packet in packets {
                socket.write_all(&packet).await.unwrap();
            }
            // Hold the socket open briefly so the client sees a timeout
            // rather than a reset.
            tokio::time::sleep(Duration::from_millis(200)).await;
        });
        addr
    }

    #[tokio::test]
    async fn activates_and_receives_exact_packets() {
        let packet: Vec<u8> = (0u8..12).collect();
        let addr = serve_packets(vec![packet.clone(), packet.clone()]).await;

        let mut client = TelemetryClient::new(addr, 12, Duration::from_millis(100));
        client.connect().await.unwrap();
        assert_eq!(client.recv_packet().await.unwrap(), Some(packet.clone()));
        assert_eq!(client.recv_packet().await.unwrap(), Some(packet));
        // Stream drained: next receive times out without error.
        assert_eq!(client.recv_packet().await.unwrap(), None);
    }

    #[tokio::test]
    async fn recv_without_connect_is_an_error() {
        let mut client = TelemetryClient::new(
            "127.0.0.1:1".parse().unwrap(),
            12,
            Duration::from_millis(10),
        );
        assert!(matches!(
            client.recv_packet().await,
            Err(TransportError::NotConnected)
        ));
    }
}
