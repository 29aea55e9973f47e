// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Synchronous Modbus client access

use tokio::runtime::Runtime;

use super::{
    Client as AsyncClient, ClientConfig, ClientState, Connector, ExceptionResult, Protocol,
    Reader as AsyncReader, Writer as AsyncWriter,
};

use crate::{
    frame::{Address, Coil, Message, Quantity, Word},
    Result,
};

/// A synchronous Modbus client that owns its own runtime.
#[derive(Debug)]
pub struct Client {
    runtime: Runtime,
    async_client: AsyncClient,
}

impl Client {
    /// Connect through `connector` and block until connected.
    pub fn connect(
        connector: impl Connector,
        protocol: Protocol,
        config: ClientConfig,
    ) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let async_client = AsyncClient::new(connector, protocol, config);
        runtime.block_on(async_client.start())?;
        Ok(Self {
            runtime,
            async_client,
        })
    }

    #[must_use]
    pub fn state(&self) -> ClientState {
        self.async_client.state()
    }

    /// Send `request` and block until the response arrives.
    pub fn send(&self, request: Message) -> Result<Message> {
        self.runtime.block_on(self.async_client.send(request))
    }

    pub fn stop(&self) {
        self.runtime.block_on(self.async_client.stop());
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.runtime.block_on(self.async_client.stop());
    }
}

/// Establish a blocking connection to a Modbus TCP coupler.
#[cfg(feature = "tcp")]
pub fn connect_tcp(socket_addr: std::net::SocketAddr, config: ClientConfig) -> Result<Client> {
    Client::connect(
        super::tcp::TcpConnector::new(socket_addr),
        Protocol::Tcp,
        config,
    )
}

/// A transport independent synchronous reader trait.
pub trait Reader {
    fn read_coils(
        &self,
        unit_id: u8,
        addr: Address,
        cnt: Quantity,
    ) -> Result<ExceptionResult<Vec<Coil>>>;
    fn read_discrete_inputs(
        &self,
        unit_id: u8,
        addr: Address,
        cnt: Quantity,
    ) -> Result<ExceptionResult<Vec<Coil>>>;
    fn read_holding_registers(
        &self,
        unit_id: u8,
        addr: Address,
        cnt: Quantity,
    ) -> Result<ExceptionResult<Vec<Word>>>;
    fn read_input_registers(
        &self,
        unit_id: u8,
        addr: Address,
        cnt: Quantity,
    ) -> Result<ExceptionResult<Vec<Word>>>;
    fn read_write_multiple_registers(
        &self,
        unit_id: u8,
        read_addr: Address,
        read_count: Quantity,
        write_addr: Address,
        write_data: &[Word],
    ) -> Result<ExceptionResult<Vec<Word>>>;
    fn read_fifo_queue(
        &self,
        unit_id: u8,
        addr: Address,
    ) -> Result<ExceptionResult<Vec<Word>>>;
}

/// A transport independent synchronous writer trait.
pub trait Writer {
    fn write_single_coil(
        &self,
        unit_id: u8,
        addr: Address,
        coil: Coil,
    ) -> Result<ExceptionResult<()>>;
    fn write_multiple_coils(
        &self,
        unit_id: u8,
        addr: Address,
        coils: &[Coil],
    ) -> Result<ExceptionResult<()>>;
    fn write_single_register(
        &self,
        unit_id: u8,
        addr: Address,
        word: Word,
    ) -> Result<ExceptionResult<()>>;
    fn write_multiple_registers(
        &self,
        unit_id: u8,
        addr: Address,
        words: &[Word],
    ) -> Result<ExceptionResult<()>>;
    fn masked_write_register(
        &self,
        unit_id: u8,
        addr: Address,
        and_mask: Word,
        or_mask: Word,
    ) -> Result<ExceptionResult<()>>;
}

impl Reader for Client {
    fn read_coils(
        &self,
        unit_id: u8,
        addr: Address,
        cnt: Quantity,
    ) -> Result<ExceptionResult<Vec<Coil>>> {
        self.runtime
            .block_on(self.async_client.read_coils(unit_id, addr, cnt))
    }

    fn read_discrete_inputs(
        &self,
        unit_id: u8,
        addr: Address,
        cnt: Quantity,
    ) -> Result<ExceptionResult<Vec<Coil>>> {
        self.runtime
            .block_on(self.async_client.read_discrete_inputs(unit_id, addr, cnt))
    }

    fn read_holding_registers(
        &self,
        unit_id: u8,
        addr: Address,
        cnt: Quantity,
    ) -> Result<ExceptionResult<Vec<Word>>> {
        self.runtime
            .block_on(self.async_client.read_holding_registers(unit_id, addr, cnt))
    }

    fn read_input_registers(
        &self,
        unit_id: u8,
        addr: Address,
        cnt: Quantity,
    ) -> Result<ExceptionResult<Vec<Word>>> {
        self.runtime
            .block_on(self.async_client.read_input_registers(unit_id, addr, cnt))
    }

    fn read_write_multiple_registers(
        &self,
        unit_id: u8,
        read_addr: Address,
        read_count: Quantity,
        write_addr: Address,
        write_data: &[Word],
    ) -> Result<ExceptionResult<Vec<Word>>> {
        self.runtime
            .block_on(self.async_client.read_write_multiple_registers(
                unit_id, read_addr, read_count, write_addr, write_data,
            ))
    }

    fn read_fifo_queue(
        &self,
        unit_id: u8,
        addr: Address,
    ) -> Result<ExceptionResult<Vec<Word>>> {
        self.runtime
            .block_on(self.async_client.read_fifo_queue(unit_id, addr))
    }
}

impl Writer for Client {
    fn write_single_coil(
        &self,
        unit_id: u8,
        addr: Address,
        coil: Coil,
    ) -> Result<ExceptionResult<()>> {
        self.runtime
            .block_on(self.async_client.write_single_coil(unit_id, addr, coil))
    }

    fn write_multiple_coils(
        &self,
        unit_id: u8,
        addr: Address,
        coils: &[Coil],
    ) -> Result<ExceptionResult<()>> {
        self.runtime
            .block_on(self.async_client.write_multiple_coils(unit_id, addr, coils))
    }

    fn write_single_register(
        &self,
        unit_id: u8,
        addr: Address,
        word: Word,
    ) -> Result<ExceptionResult<()>> {
        self.runtime
            .block_on(self.async_client.write_single_register(unit_id, addr, word))
    }

    fn write_multiple_registers(
        &self,
        unit_id: u8,
        addr: Address,
        words: &[Word],
    ) -> Result<ExceptionResult<()>> {
        self.runtime
            .block_on(self.async_client.write_multiple_registers(unit_id, addr, words))
    }

    fn masked_write_register(
        &self,
        unit_id: u8,
        addr: Address,
        and_mask: Word,
        or_mask: Word,
    ) -> Result<ExceptionResult<()>> {
        self.runtime
            .block_on(self.async_client.masked_write_register(
                unit_id, addr, and_mask, or_mask,
            ))
    }
}
