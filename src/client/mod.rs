// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Asynchronous client with request correlation

use std::{
    collections::VecDeque,
    fmt,
    future::Future,
    io,
    pin::Pin,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    task::{Context, Poll},
    time::Duration,
};

use async_trait::async_trait;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::{mpsc, oneshot},
    task::JoinHandle,
};

use crate::{
    frame::{Address, Coil, ExceptionCode, Message, Payload, Quantity, Word},
    Error, ProtocolError, Result,
};

mod driver;
mod pending;

pub use self::pending::PendingKey;

use self::{
    driver::{Command, Driver},
    pending::PendingTable,
};

#[cfg(feature = "rtu")]
pub mod rtu;

#[cfg(feature = "tcp")]
pub mod tcp;

#[cfg(feature = "sync")]
pub mod sync;

/// A byte stream to a device.
pub trait Transport: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T> Transport for T where T: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl fmt::Debug for dyn Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Transport")
    }
}

pub type BoxedTransport = Box<dyn Transport>;

/// Opens byte streams, initially and after a connection loss.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self) -> io::Result<BoxedTransport>;
}

/// Envelope used on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    /// Unit id and CRC, one request at a time.
    Rtu,
    /// MBAP header, requests are correlated by transaction id.
    Tcp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Stopped,
    Starting,
    Running,
    Reconnecting,
}

/// Client settings.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Time to live of a pending request.
    pub response_timeout: Duration,

    /// Period of the timeout sweep.
    pub sweep_interval: Duration,

    pub auto_reconnect: bool,

    /// Wait time before each reconnect attempt.
    pub reconnect_delay: Duration,

    /// Keep requests submitted while reconnecting instead of failing them.
    pub queue_while_disconnected: bool,

    /// Treat the connection as lost if no bytes arrive for this long while
    /// responses are outstanding.
    pub read_timeout: Option<Duration>,

    /// Pause after each RTU frame.
    pub inter_frame_delay: Option<Duration>,

    /// Number of buffered unmatched responses.
    pub unmatched_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            response_timeout: Duration::from_secs(3),
            sweep_interval: Duration::from_millis(250),
            auto_reconnect: true,
            reconnect_delay: Duration::from_secs(10),
            queue_while_disconnected: false,
            read_timeout: None,
            inter_frame_delay: None,
            unmatched_capacity: 64,
        }
    }
}

impl ClientConfig {
    #[must_use]
    pub fn with_response_timeout(mut self, response_timeout: Duration) -> Self {
        self.response_timeout = response_timeout;
        self
    }

    #[must_use]
    pub fn with_sweep_interval(mut self, sweep_interval: Duration) -> Self {
        self.sweep_interval = sweep_interval;
        self
    }

    #[must_use]
    pub fn with_auto_reconnect(mut self, auto_reconnect: bool) -> Self {
        self.auto_reconnect = auto_reconnect;
        self
    }

    #[must_use]
    pub fn with_reconnect_delay(mut self, reconnect_delay: Duration) -> Self {
        self.reconnect_delay = reconnect_delay;
        self
    }

    #[must_use]
    pub fn with_queue_while_disconnected(mut self, queue_while_disconnected: bool) -> Self {
        self.queue_while_disconnected = queue_while_disconnected;
        self
    }

    #[must_use]
    pub fn with_read_timeout(mut self, read_timeout: Option<Duration>) -> Self {
        self.read_timeout = read_timeout;
        self
    }

    #[must_use]
    pub fn with_inter_frame_delay(mut self, inter_frame_delay: Option<Duration>) -> Self {
        self.inter_frame_delay = inter_frame_delay;
        self
    }

    #[must_use]
    pub fn with_unmatched_capacity(mut self, unmatched_capacity: usize) -> Self {
        self.unmatched_capacity = unmatched_capacity;
        self
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone)]
pub(crate) struct StateCell(Arc<Mutex<ClientState>>);

impl StateCell {
    fn new() -> Self {
        Self(Arc::new(Mutex::new(ClientState::Stopped)))
    }

    pub(crate) fn get(&self) -> ClientState {
        *lock(&self.0)
    }

    pub(crate) fn set(&self, state: ClientState) {
        let mut current = lock(&self.0);
        if *current != state {
            log::info!("Client state: {:?} -> {state:?}", *current);
            *current = state;
        }
    }

    /// Switch from `Stopped` to `Starting`.
    fn begin_start(&self) -> bool {
        let mut current = lock(&self.0);
        if *current != ClientState::Stopped {
            return false;
        }
        log::info!("Client state: {:?} -> {:?}", *current, ClientState::Starting);
        *current = ClientState::Starting;
        true
    }
}

struct Shared {
    protocol: Protocol,
    config: ClientConfig,
    connector: Arc<dyn Connector>,
    pending: PendingTable,
    state: StateCell,
    commands: Mutex<Option<mpsc::UnboundedSender<Command>>>,
    driver: Mutex<Option<JoinHandle<()>>>,
    sweeper: Mutex<Option<oneshot::Sender<()>>>,
    unmatched_tx: mpsc::Sender<Message>,
    unmatched_rx: Mutex<Option<mpsc::Receiver<Message>>>,
}

/// Asynchronous Modbus client.
///
/// Requests may be submitted concurrently from any task. Every submitted
/// request resolves eventually with its response, an error response, a
/// timeout or a connection failure.
///
/// Cloning yields another handle to the same client.
#[derive(Clone)]
pub struct Client {
    shared: Arc<Shared>,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("protocol", &self.shared.protocol)
            .field("state", &self.state())
            .field("pending", &self.pending_len())
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Create a stopped client.
    pub fn new(connector: impl Connector, protocol: Protocol, config: ClientConfig) -> Self {
        let (unmatched_tx, unmatched_rx) = mpsc::channel(config.unmatched_capacity.max(1));
        Self {
            shared: Arc::new(Shared {
                protocol,
                config,
                connector: Arc::new(connector),
                pending: PendingTable::default(),
                state: StateCell::new(),
                commands: Mutex::new(None),
                driver: Mutex::new(None),
                sweeper: Mutex::new(None),
                unmatched_tx,
                unmatched_rx: Mutex::new(Some(unmatched_rx)),
            }),
        }
    }

    /// Connect and start processing requests.
    ///
    /// Does nothing if the client is not stopped.
    ///
    /// # Errors
    ///
    /// Fails if the initial connection cannot be established. The client
    /// stays stopped in this case.
    pub async fn start(&self) -> Result<()> {
        let shared = &self.shared;
        if !shared.state.begin_start() {
            return Ok(());
        }
        let transport = match shared.connector.connect().await {
            Ok(transport) => transport,
            Err(err) => {
                log::warn!("Failed to connect: {err}");
                shared.state.set(ClientState::Stopped);
                return Err(err.into());
            }
        };
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (sweeper_tx, sweeper_rx) = oneshot::channel();
        let driver = Driver {
            protocol: shared.protocol,
            config: shared.config.clone(),
            connector: Arc::clone(&shared.connector),
            pending: shared.pending.clone(),
            state: shared.state.clone(),
            commands: commands_rx,
            unmatched: shared.unmatched_tx.clone(),
            backlog: VecDeque::new(),
            in_flight: None,
        };
        *lock(&shared.commands) = Some(commands_tx);
        *lock(&shared.sweeper) = Some(sweeper_tx);
        tokio::spawn(driver::sweep(
            shared.pending.clone(),
            shared.config.clone(),
            sweeper_rx,
        ));
        shared.state.set(ClientState::Running);
        *lock(&shared.driver) = Some(tokio::spawn(driver.run(transport)));
        Ok(())
    }

    /// Disconnect and fail all pending requests.
    pub async fn stop(&self) {
        let commands = lock(&self.shared.commands).take();
        let sweeper = lock(&self.shared.sweeper).take();
        let driver = lock(&self.shared.driver).take();
        if let Some(commands) = commands {
            let _ = commands.send(Command::Stop);
        }
        if let Some(sweeper) = sweeper {
            let _ = sweeper.send(());
        }
        if let Some(driver) = driver {
            if let Err(err) = driver.await {
                log::warn!("Connection task failed: {err}");
            }
        }
        self.shared.pending.fail_all(|| Error::ConnectionLost);
        self.shared.state.set(ClientState::Stopped);
    }

    #[must_use]
    pub fn state(&self) -> ClientState {
        self.shared.state.get()
    }

    #[must_use]
    pub fn protocol(&self) -> Protocol {
        self.shared.protocol
    }

    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.shared.config
    }

    /// Number of requests waiting for their response.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.shared.pending.len()
    }

    /// Responses that did not match any pending request.
    ///
    /// Only available once, `None` afterwards.
    #[must_use]
    pub fn take_unmatched(&self) -> Option<mpsc::Receiver<Message>> {
        lock(&self.shared.unmatched_rx).take()
    }

    /// Submit `request` without waiting for the response.
    ///
    /// Fails fast with [`Error::NotConnected`] if the client is stopped, or
    /// reconnecting without queueing requests.
    pub fn send_async(&self, request: Message) -> ResponseHandle {
        let shared = &self.shared;
        let (tx, rx) = oneshot::channel();
        let accepting = match shared.state.get() {
            ClientState::Running => true,
            ClientState::Reconnecting => shared.config.queue_while_disconnected,
            ClientState::Stopped | ClientState::Starting => false,
        };
        if !accepting {
            let _ = tx.send(Err(Error::NotConnected));
            return ResponseHandle::new(None, shared.pending.clone(), rx);
        }
        let key = shared.pending.insert(shared.protocol, request, tx);
        if let Some(key) = key {
            let sent = lock(&shared.commands)
                .as_ref()
                .is_some_and(|commands| commands.send(Command::Send(key)).is_ok());
            if !sent {
                shared.pending.resolve(key, Err(Error::NotConnected));
            }
        }
        ResponseHandle::new(key, shared.pending.clone(), rx)
    }

    /// Submit `request` and wait for the response.
    pub async fn send(&self, request: Message) -> Result<Message> {
        self.send_async(request).await
    }

    /// Send `request` and split off exception responses.
    pub async fn call(&self, request: Message) -> Result<ExceptionResult<Message>> {
        let response = self.send(request).await?;
        match response.error() {
            Some(exception) => Ok(Err(exception)),
            None => Ok(Ok(response)),
        }
    }
}

/// Response or exception code of a successfully transmitted request.
pub type ExceptionResult<T> = std::result::Result<T, ExceptionCode>;

/// The eventual outcome of a submitted request.
#[derive(Debug)]
#[must_use = "the response is lost if the handle is dropped"]
pub struct ResponseHandle {
    key: Option<PendingKey>,
    pending: PendingTable,
    receiver: oneshot::Receiver<Result<Message>>,
}

impl ResponseHandle {
    fn new(
        key: Option<PendingKey>,
        pending: PendingTable,
        receiver: oneshot::Receiver<Result<Message>>,
    ) -> Self {
        Self {
            key,
            pending,
            receiver,
        }
    }

    /// The identity of the request in the pending table.
    #[must_use]
    pub fn key(&self) -> Option<PendingKey> {
        self.key
    }

    /// Withdraw the request.
    ///
    /// Resolves the handle with [`Error::Cancelled`] and returns `true`
    /// unless the request has already been resolved. Bytes that have
    /// already been written are not retracted.
    pub fn cancel(&self) -> bool {
        self.key
            .is_some_and(|key| self.pending.resolve(key, Err(Error::Cancelled)))
    }
}

impl Future for ResponseHandle {
    type Output = Result<Message>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map(|res| res.unwrap_or(Err(Error::ConnectionLost)))
    }
}

fn unexpected_payload(response: &Message) -> Error {
    ProtocolError::InvalidData(format!(
        "unexpected payload for function {}: {:?}",
        response.function(),
        response.payload()
    ))
    .into()
}

fn expect_bits(response: &Message) -> Result<Vec<Coil>> {
    response
        .bits_values()
        .map(<[_]>::to_vec)
        .ok_or_else(|| unexpected_payload(response))
}

fn expect_words(response: &Message) -> Result<Vec<Word>> {
    match response.payload() {
        Some(Payload::Registers(_) | Payload::ReadWrite(_)) => {
            response.words().ok_or_else(|| unexpected_payload(response))
        }
        _ => Err(unexpected_payload(response)),
    }
}

/// Asynchronous _Modbus_ reader
#[async_trait]
pub trait Reader {
    /// Read multiple coils (0x01)
    async fn read_coils(
        &self,
        unit_id: u8,
        addr: Address,
        cnt: Quantity,
    ) -> Result<ExceptionResult<Vec<Coil>>>;

    /// Read multiple discrete inputs (0x02)
    async fn read_discrete_inputs(
        &self,
        unit_id: u8,
        addr: Address,
        cnt: Quantity,
    ) -> Result<ExceptionResult<Vec<Coil>>>;

    /// Read multiple holding registers (0x03)
    async fn read_holding_registers(
        &self,
        unit_id: u8,
        addr: Address,
        cnt: Quantity,
    ) -> Result<ExceptionResult<Vec<Word>>>;

    /// Read multiple input registers (0x04)
    async fn read_input_registers(
        &self,
        unit_id: u8,
        addr: Address,
        cnt: Quantity,
    ) -> Result<ExceptionResult<Vec<Word>>>;

    /// Read and write multiple holding registers (0x17)
    ///
    /// The write operation is performed before the read unlike
    /// the name of the operation might suggest!
    async fn read_write_multiple_registers(
        &self,
        unit_id: u8,
        read_addr: Address,
        read_count: Quantity,
        write_addr: Address,
        write_data: &[Word],
    ) -> Result<ExceptionResult<Vec<Word>>>;

    /// Read the FIFO queue with its count register at `addr` (0x18)
    async fn read_fifo_queue(&self, unit_id: u8, addr: Address)
        -> Result<ExceptionResult<Vec<Word>>>;
}

/// Asynchronous Modbus writer
#[async_trait]
pub trait Writer {
    /// Write a single coil (0x05)
    async fn write_single_coil(
        &self,
        unit_id: u8,
        addr: Address,
        coil: Coil,
    ) -> Result<ExceptionResult<()>>;

    /// Write a single holding register (0x06)
    async fn write_single_register(
        &self,
        unit_id: u8,
        addr: Address,
        word: Word,
    ) -> Result<ExceptionResult<()>>;

    /// Write multiple coils (0x0F)
    async fn write_multiple_coils(
        &self,
        unit_id: u8,
        addr: Address,
        coils: &[Coil],
    ) -> Result<ExceptionResult<()>>;

    /// Write multiple holding registers (0x10)
    async fn write_multiple_registers(
        &self,
        unit_id: u8,
        addr: Address,
        words: &[Word],
    ) -> Result<ExceptionResult<()>>;

    /// Set or clear individual bits of a holding register (0x16)
    async fn masked_write_register(
        &self,
        unit_id: u8,
        addr: Address,
        and_mask: Word,
        or_mask: Word,
    ) -> Result<ExceptionResult<()>>;
}

#[async_trait]
impl Reader for Client {
    async fn read_coils(
        &self,
        unit_id: u8,
        addr: Address,
        cnt: Quantity,
    ) -> Result<ExceptionResult<Vec<Coil>>> {
        let request = Message::read_coils_request(unit_id, addr, cnt)?;
        match self.call(request).await? {
            Ok(response) => expect_bits(&response).map(Ok),
            Err(exception) => Ok(Err(exception)),
        }
    }

    async fn read_discrete_inputs(
        &self,
        unit_id: u8,
        addr: Address,
        cnt: Quantity,
    ) -> Result<ExceptionResult<Vec<Coil>>> {
        let request = Message::read_discrete_inputs_request(unit_id, addr, cnt)?;
        match self.call(request).await? {
            Ok(response) => expect_bits(&response).map(Ok),
            Err(exception) => Ok(Err(exception)),
        }
    }

    async fn read_holding_registers(
        &self,
        unit_id: u8,
        addr: Address,
        cnt: Quantity,
    ) -> Result<ExceptionResult<Vec<Word>>> {
        let request = Message::read_holding_registers_request(unit_id, addr, cnt)?;
        match self.call(request).await? {
            Ok(response) => expect_words(&response).map(Ok),
            Err(exception) => Ok(Err(exception)),
        }
    }

    async fn read_input_registers(
        &self,
        unit_id: u8,
        addr: Address,
        cnt: Quantity,
    ) -> Result<ExceptionResult<Vec<Word>>> {
        let request = Message::read_input_registers_request(unit_id, addr, cnt)?;
        match self.call(request).await? {
            Ok(response) => expect_words(&response).map(Ok),
            Err(exception) => Ok(Err(exception)),
        }
    }

    async fn read_write_multiple_registers(
        &self,
        unit_id: u8,
        read_addr: Address,
        read_count: Quantity,
        write_addr: Address,
        write_data: &[Word],
    ) -> Result<ExceptionResult<Vec<Word>>> {
        let request = Message::read_write_registers_request(
            unit_id, read_addr, read_count, write_addr, write_data,
        )?;
        match self.call(request).await? {
            Ok(response) => expect_words(&response).map(Ok),
            Err(exception) => Ok(Err(exception)),
        }
    }

    async fn read_fifo_queue(
        &self,
        unit_id: u8,
        addr: Address,
    ) -> Result<ExceptionResult<Vec<Word>>> {
        let request = Message::read_fifo_queue_request(unit_id, addr);
        match self.call(request).await? {
            Ok(response) => expect_words(&response).map(Ok),
            Err(exception) => Ok(Err(exception)),
        }
    }
}

#[async_trait]
impl Writer for Client {
    async fn write_single_coil(
        &self,
        unit_id: u8,
        addr: Address,
        coil: Coil,
    ) -> Result<ExceptionResult<()>> {
        let request = Message::write_coil_request(unit_id, addr, coil);
        Ok(self.call(request).await?.map(drop))
    }

    async fn write_single_register(
        &self,
        unit_id: u8,
        addr: Address,
        word: Word,
    ) -> Result<ExceptionResult<()>> {
        let request = Message::write_register_request(unit_id, addr, word);
        Ok(self.call(request).await?.map(drop))
    }

    async fn write_multiple_coils(
        &self,
        unit_id: u8,
        addr: Address,
        coils: &[Coil],
    ) -> Result<ExceptionResult<()>> {
        let request = Message::write_coils_request(unit_id, addr, coils)?;
        Ok(self.call(request).await?.map(drop))
    }

    async fn write_multiple_registers(
        &self,
        unit_id: u8,
        addr: Address,
        words: &[Word],
    ) -> Result<ExceptionResult<()>> {
        let request = Message::write_registers_request(unit_id, addr, words)?;
        Ok(self.call(request).await?.map(drop))
    }

    async fn masked_write_register(
        &self,
        unit_id: u8,
        addr: Address,
        and_mask: Word,
        or_mask: Word,
    ) -> Result<ExceptionResult<()>> {
        let request = Message::mask_write_register_request(unit_id, addr, and_mask, or_mask);
        Ok(self.call(request).await?.map(drop))
    }
}
