// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Connection task: writes requests, dispatches responses and reconnects.

use std::{collections::VecDeque, io, sync::Arc};

use futures_util::{SinkExt as _, StreamExt as _};
use tokio::{
    sync::{mpsc, oneshot},
    time::{self, Instant, MissedTickBehavior},
};
use tokio_util::codec::Framed;

use super::{
    pending::{PendingKey, PendingTable},
    BoxedTransport, ClientConfig, ClientState, Connector, Protocol, StateCell,
};

use crate::{
    codec::{encode_pdu_to_bytes, rtu, tcp},
    error::invalid_argument,
    frame::{tcp::TcpAdu, Message},
    Error, ProtocolError,
};

#[derive(Debug)]
pub(crate) enum Command {
    Send(PendingKey),
    Stop,
}

/// A decoded response and its transaction id, if any.
#[derive(Debug)]
struct Inbound {
    transaction_id: Option<u16>,
    message: Message,
}

enum Link {
    Rtu(Framed<BoxedTransport, rtu::ClientCodec>),
    Tcp(Framed<BoxedTransport, tcp::ClientCodec>),
}

impl Link {
    fn new(protocol: Protocol, transport: BoxedTransport) -> Self {
        match protocol {
            Protocol::Rtu => Self::Rtu(Framed::new(transport, rtu::ClientCodec)),
            Protocol::Tcp => Self::Tcp(Framed::new(transport, tcp::ClientCodec)),
        }
    }

    async fn send(&mut self, key: PendingKey, request: Message) -> io::Result<()> {
        match (self, key) {
            (Self::Rtu(framed), _) => framed.send(request).await,
            (Self::Tcp(framed), PendingKey::Transaction(transaction_id)) => {
                framed
                    .send(TcpAdu {
                        transaction_id,
                        message: request,
                    })
                    .await
            }
            (Self::Tcp(_), PendingKey::Sequence(_)) => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "TCP request without transaction id",
            )),
        }
    }

    async fn next(&mut self) -> Option<io::Result<Inbound>> {
        match self {
            Self::Rtu(framed) => framed.next().await.map(|res| {
                res.map(|message| Inbound {
                    transaction_id: None,
                    message,
                })
            }),
            Self::Tcp(framed) => framed.next().await.map(|res| {
                res.map(
                    |TcpAdu {
                         transaction_id,
                         message,
                     }| Inbound {
                        transaction_id: Some(transaction_id),
                        message,
                    },
                )
            }),
        }
    }
}

enum Exit {
    Stop,
    Lost(io::Error),
}

pub(crate) struct Driver {
    pub(crate) protocol: Protocol,
    pub(crate) config: ClientConfig,
    pub(crate) connector: Arc<dyn Connector>,
    pub(crate) pending: PendingTable,
    pub(crate) state: StateCell,
    pub(crate) commands: mpsc::UnboundedReceiver<Command>,
    pub(crate) unmatched: mpsc::Sender<Message>,
    /// Submitted requests that have not been written yet.
    pub(crate) backlog: VecDeque<PendingKey>,
    /// The written RTU request that is awaiting its response.
    pub(crate) in_flight: Option<PendingKey>,
}

impl Driver {
    pub(crate) async fn run(mut self, transport: BoxedTransport) {
        let mut link = Link::new(self.protocol, transport);
        loop {
            let err = match self.serve(&mut link).await {
                Exit::Stop => break,
                Exit::Lost(err) => err,
            };
            log::warn!("Connection lost: {err}");
            self.in_flight = None;
            let stopped = self.drain_commands();
            let failed = if self.config.queue_while_disconnected && self.config.auto_reconnect {
                let backlog = &self.backlog;
                self.pending
                    .fail_unless(|key| backlog.contains(key), || Error::ConnectionLost)
            } else {
                self.backlog.clear();
                self.pending.fail_all(|| Error::ConnectionLost)
            };
            if failed > 0 {
                log::debug!("Failed {failed} in-flight request(s)");
            }
            if stopped || !self.config.auto_reconnect {
                break;
            }
            self.state.set(ClientState::Reconnecting);
            match self.reconnect().await {
                Some(transport) => {
                    link = Link::new(self.protocol, transport);
                    self.state.set(ClientState::Running);
                }
                None => break,
            }
        }
        self.shutdown();
    }

    /// Returns `None` if the client has been stopped while waiting.
    async fn reconnect(&mut self) -> Option<BoxedTransport> {
        loop {
            let delay = time::sleep(self.config.reconnect_delay);
            tokio::pin!(delay);
            loop {
                tokio::select! {
                    () = &mut delay => break,
                    cmd = self.commands.recv() => match cmd {
                        None | Some(Command::Stop) => return None,
                        Some(Command::Send(key)) => self.enqueue_disconnected(key),
                    },
                }
            }
            log::info!("Reconnecting");
            match self.connector.connect().await {
                Ok(transport) => {
                    log::info!("Reconnected");
                    return Some(transport);
                }
                Err(err) => {
                    log::warn!("Failed to reconnect: {err}");
                }
            }
        }
    }

    fn enqueue_disconnected(&mut self, key: PendingKey) {
        if self.config.queue_while_disconnected {
            self.backlog.push_back(key);
        } else {
            self.pending.resolve(key, Err(Error::NotConnected));
        }
    }

    /// Move submitted requests into the backlog, returns `true` if the
    /// client has been stopped.
    fn drain_commands(&mut self) -> bool {
        let mut stopped = false;
        while let Ok(cmd) = self.commands.try_recv() {
            match cmd {
                Command::Send(key) => self.backlog.push_back(key),
                Command::Stop => stopped = true,
            }
        }
        stopped
    }

    fn shutdown(&mut self) {
        self.commands.close();
        let _ = self.drain_commands();
        self.backlog.clear();
        let failed = self.pending.fail_all(|| Error::ConnectionLost);
        if failed > 0 {
            log::debug!("Failed {failed} pending request(s) on shutdown");
        }
        self.state.set(ClientState::Stopped);
    }

    async fn serve(&mut self, link: &mut Link) -> Exit {
        let mut tick = time::interval(self.config.sweep_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_activity = Instant::now();
        loop {
            match self.write_backlog(link).await {
                Ok(true) => last_activity = Instant::now(),
                Ok(false) => {}
                Err(err) => return Exit::Lost(err),
            }
            tokio::select! {
                cmd = self.commands.recv() => match cmd {
                    None | Some(Command::Stop) => return Exit::Stop,
                    Some(Command::Send(key)) => self.backlog.push_back(key),
                },
                inbound = link.next() => match inbound {
                    None => {
                        return Exit::Lost(io::Error::new(
                            io::ErrorKind::UnexpectedEof,
                            "connection closed by peer",
                        ));
                    }
                    Some(Err(err)) => return Exit::Lost(err),
                    Some(Ok(inbound)) => {
                        last_activity = Instant::now();
                        self.dispatch(inbound);
                    }
                },
                _ = tick.tick() => {
                    if let Some(read_timeout) = self.config.read_timeout {
                        if self.awaiting_response() && last_activity.elapsed() >= read_timeout {
                            return Exit::Lost(io::Error::new(
                                io::ErrorKind::TimedOut,
                                format!("no data received within {read_timeout:?}"),
                            ));
                        }
                    }
                },
            }
        }
    }

    fn awaiting_response(&self) -> bool {
        match self.protocol {
            Protocol::Rtu => self
                .in_flight
                .is_some_and(|key| self.pending.contains(key)),
            Protocol::Tcp => self.pending.len() > self.backlog.len(),
        }
    }

    /// Write queued requests, RTU requests one at a time.
    ///
    /// Returns `true` if anything has been written.
    async fn write_backlog(&mut self, link: &mut Link) -> io::Result<bool> {
        let mut written = false;
        loop {
            if let Some(key) = self.in_flight {
                if self.pending.contains(key) {
                    return Ok(written);
                }
                self.in_flight = None;
            }
            let Some(key) = self.backlog.pop_front() else {
                return Ok(written);
            };
            // Skip requests that have expired or have been cancelled meanwhile.
            let Some(request) = self.pending.request(key) else {
                continue;
            };
            // Only write failures affect the connection.
            if let Err(err) = encode_pdu_to_bytes(&request) {
                log::warn!("Failed to encode {key:?}: {err}");
                self.pending.resolve(key, Err(invalid_argument(err.to_string())));
                continue;
            }
            log::debug!("Call {key:?}: {request:?}");
            link.send(key, request).await?;
            written = true;
            if self.protocol == Protocol::Rtu {
                self.in_flight = Some(key);
                if let Some(delay) = self.config.inter_frame_delay {
                    time::sleep(delay).await;
                }
            }
        }
    }

    fn dispatch(&mut self, inbound: Inbound) {
        let Inbound {
            transaction_id,
            message,
        } = inbound;
        let taken = match (transaction_id, self.in_flight) {
            (Some(transaction_id), _) => {
                self.pending.take(PendingKey::Transaction(transaction_id))
            }
            (None, Some(key)) => self
                .pending
                .take_if(key, |request| request.unit_id() == message.unit_id()),
            (None, None) => None,
        };
        let Some((request, sender)) = taken else {
            self.forward_unmatched(transaction_id, message);
            return;
        };
        if transaction_id.is_none() {
            self.in_flight = None;
        }
        let result = if request.function().value() == message.function().value() {
            log::debug!("Response: {message:?}");
            Ok(message.complete_with(&request))
        } else {
            Err(ProtocolError::FunctionMismatch {
                request: request.function(),
                response: message.function(),
            }
            .into())
        };
        // The receiver may already be gone.
        let _ = sender.send(result);
    }

    fn forward_unmatched(&self, transaction_id: Option<u16>, message: Message) {
        match transaction_id {
            Some(transaction_id) => log::warn!(
                "Unmatched response with transaction id {transaction_id}: {message:?}"
            ),
            None => log::warn!("Unmatched response: {message:?}"),
        }
        if let Err(err) = self.unmatched.try_send(message) {
            match err {
                mpsc::error::TrySendError::Full(_) => {
                    log::warn!("Dropped unmatched response, channel is full");
                }
                mpsc::error::TrySendError::Closed(_) => {
                    log::debug!("Dropped unmatched response, nobody is listening");
                }
            }
        }
    }
}

/// Expire pending requests until `shutdown` fires or is dropped.
pub(crate) async fn sweep(
    pending: PendingTable,
    config: ClientConfig,
    mut shutdown: oneshot::Receiver<()>,
) {
    let mut tick = time::interval(config.sweep_interval);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = tick.tick() => {
                let expired = pending.expire(config.response_timeout);
                if expired > 0 {
                    log::debug!("Expired {expired} pending request(s)");
                }
            }
        }
    }
}
