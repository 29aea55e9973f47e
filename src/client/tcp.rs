// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! TCP client connections

use std::{io, net::SocketAddr};

use async_trait::async_trait;
use tokio::net::TcpStream;

use super::{BoxedTransport, Client, ClientConfig, Connector, Protocol};

use crate::Result;

/// Opens TCP connections to a fixed socket address.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    socket_addr: SocketAddr,
}

impl TcpConnector {
    #[must_use]
    pub const fn new(socket_addr: SocketAddr) -> Self {
        Self { socket_addr }
    }

    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        self.socket_addr
    }
}

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self) -> io::Result<BoxedTransport> {
        log::debug!("Connecting to {}", self.socket_addr);
        let stream = TcpStream::connect(self.socket_addr).await?;
        stream.set_nodelay(true)?;
        Ok(Box::new(stream))
    }
}

/// Establish a direct connection to a Modbus TCP coupler.
pub async fn connect(socket_addr: SocketAddr) -> Result<Client> {
    connect_with_config(socket_addr, ClientConfig::default()).await
}

/// Establish a direct connection to a Modbus TCP coupler with custom
/// settings.
pub async fn connect_with_config(socket_addr: SocketAddr, config: ClientConfig) -> Result<Client> {
    let client = Client::new(TcpConnector::new(socket_addr), Protocol::Tcp, config);
    client.start().await?;
    Ok(client)
}
