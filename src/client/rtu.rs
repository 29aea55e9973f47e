// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! RTU client connections

use std::{
    io,
    sync::{Mutex, PoisonError},
};

use async_trait::async_trait;

use super::{BoxedTransport, Client, ClientConfig, Connector, Protocol, Transport};

use crate::Result;

/// Hands out a single, already opened byte stream.
///
/// Serial ports are opened by the caller. Once the stream has been
/// handed out further connection attempts fail.
#[derive(Debug)]
pub struct StreamConnector {
    transport: Mutex<Option<BoxedTransport>>,
}

impl StreamConnector {
    pub fn new(transport: impl Transport) -> Self {
        Self {
            transport: Mutex::new(Some(Box::new(transport))),
        }
    }
}

#[async_trait]
impl Connector for StreamConnector {
    async fn connect(&self) -> io::Result<BoxedTransport> {
        self.transport
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "stream already in use"))
    }
}

/// Connect to RTU devices through `connector`.
pub async fn connect(connector: impl Connector, config: ClientConfig) -> Result<Client> {
    let client = Client::new(connector, Protocol::Rtu, config);
    client.start().await?;
    Ok(client)
}

/// Talk to RTU devices over an already opened byte stream, e.g. a serial
/// port.
///
/// The stream cannot be reopened, so the client stops when it is lost.
pub async fn attach(transport: impl Transport, config: ClientConfig) -> Result<Client> {
    connect(
        StreamConnector::new(transport),
        config.with_auto_reconnect(false),
    )
    .await
}
