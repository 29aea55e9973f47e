// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! MBAP stream codecs.

use std::{
    collections::HashMap,
    io::{self, Error, ErrorKind},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use byteorder::{BigEndian, ByteOrder as _};
use tokio_util::codec::{Decoder, Encoder};

use super::{decode_pdu, encode_pdu_to_bytes};

use crate::{
    bytes::BytesMut,
    frame::{
        tcp::{TcpAdu, TcpFrame, TransactionId, HEADER_LEN, PROTOCOL_ID},
        Direction, Message,
    },
};

fn decode_frame(buf: &mut BytesMut) -> io::Result<Option<TcpFrame>> {
    if buf.len() < HEADER_LEN {
        return Ok(None);
    }
    let protocol_id = BigEndian::read_u16(&buf[2..4]);
    if protocol_id != PROTOCOL_ID {
        return Err(Error::new(
            ErrorKind::InvalidData,
            format!("invalid protocol id: 0x{protocol_id:04X}"),
        ));
    }
    // len = bytes of PDU + one byte (unit id)
    let len = usize::from(BigEndian::read_u16(&buf[4..6]));
    if len == 0 {
        return Err(Error::new(ErrorKind::InvalidData, "invalid length: 0"));
    }
    if buf.len() < HEADER_LEN + len - 1 {
        return Ok(None);
    }
    let adu = buf.split_to(HEADER_LEN + len - 1);
    TcpFrame::decode(&adu).map(Some)
}

fn decode_adu(frame: TcpFrame, direction: Direction) -> io::Result<TcpAdu> {
    let TcpFrame {
        transaction_id,
        unit_id,
        pdu,
        ..
    } = frame;
    let message = decode_pdu(unit_id, pdu, direction)?;
    Ok(TcpAdu {
        transaction_id,
        message,
    })
}

fn encode_adu(adu: &TcpAdu, buf: &mut BytesMut) -> io::Result<()> {
    let pdu = encode_pdu_to_bytes(&adu.message)?;
    TcpFrame::new(adu.transaction_id, adu.message.unit_id(), pdu).encode(buf);
    Ok(())
}

/// Requests received by a server that have not been answered yet.
///
/// Cloning yields another handle to the same table.
#[derive(Debug, Default, Clone)]
pub struct TransactionTable {
    requests: Arc<Mutex<HashMap<TransactionId, Message>>>,
}

impl TransactionTable {
    fn lock(&self) -> MutexGuard<'_, HashMap<TransactionId, Message>> {
        self.requests.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Remember `request`, returns a previous unanswered request with the
    /// same transaction id.
    pub fn insert(&self, transaction_id: TransactionId, request: Message) -> Option<Message> {
        self.lock().insert(transaction_id, request)
    }

    pub fn remove(&self, transaction_id: TransactionId) -> Option<Message> {
        self.lock().remove(&transaction_id)
    }

    #[must_use]
    pub fn contains(&self, transaction_id: TransactionId) -> bool {
        self.lock().contains_key(&transaction_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

/// Decodes responses and encodes requests.
///
/// Correlation of transaction ids is left to the caller. Responses with a
/// malformed PDU are logged and skipped, the MBAP header keeps the stream
/// in sync.
#[derive(Debug, Default)]
pub struct ClientCodec;

impl Decoder for ClientCodec {
    type Item = TcpAdu;
    type Error = io::Error;

    fn decode(&mut self, buf: &mut BytesMut) -> io::Result<Option<TcpAdu>> {
        while let Some(frame) = decode_frame(buf)? {
            let transaction_id = frame.transaction_id;
            match decode_adu(frame, Direction::Response) {
                Ok(adu) => return Ok(Some(adu)),
                Err(err) => {
                    log::warn!("Dropped response with transaction id {transaction_id}: {err}");
                }
            }
        }
        Ok(None)
    }
}

impl Encoder<TcpAdu> for ClientCodec {
    type Error = io::Error;

    fn encode(&mut self, adu: TcpAdu, buf: &mut BytesMut) -> io::Result<()> {
        encode_adu(&adu, buf)
    }
}

/// Decodes requests and encodes responses.
///
/// Every decoded request is kept in the [`TransactionTable`] until the
/// response with the same transaction id has been encoded.
#[derive(Debug, Default)]
pub struct ServerCodec {
    transactions: TransactionTable,
}

impl ServerCodec {
    #[must_use]
    pub fn new(transactions: TransactionTable) -> Self {
        Self { transactions }
    }

    #[must_use]
    pub fn transactions(&self) -> &TransactionTable {
        &self.transactions
    }
}

impl Decoder for ServerCodec {
    type Item = TcpAdu;
    type Error = io::Error;

    fn decode(&mut self, buf: &mut BytesMut) -> io::Result<Option<TcpAdu>> {
        let Some(frame) = decode_frame(buf)? else {
            return Ok(None);
        };
        let adu = decode_adu(frame, Direction::Request)?;
        if self
            .transactions
            .insert(adu.transaction_id, adu.message.clone())
            .is_some()
        {
            log::warn!(
                "Replaced unanswered request with transaction id {}",
                adu.transaction_id
            );
        }
        Ok(Some(adu))
    }
}

impl Encoder<TcpAdu> for ServerCodec {
    type Error = io::Error;

    fn encode(&mut self, adu: TcpAdu, buf: &mut BytesMut) -> io::Result<()> {
        if self.transactions.remove(adu.transaction_id).is_none() {
            log::warn!(
                "Encoding response for unknown transaction id {}",
                adu.transaction_id
            );
        }
        encode_adu(&adu, buf)
    }
}
