// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! TCP envelope: MBAP header and PDU.

use std::io;

use byteorder::{BigEndian, ByteOrder as _};

use super::{Message, UnitId};

use crate::{
    bytes::{BufMut as _, Bytes, BytesMut},
    error::invalid_data,
};

pub type TransactionId = u16;

/// Size of the MBAP header including the unit id.
pub const HEADER_LEN: usize = 7;

/// The only protocol id defined for Modbus.
pub const PROTOCOL_ID: u16 = 0x0000;

/// A single MBAP frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcpFrame {
    pub transaction_id: TransactionId,
    pub protocol_id: u16,
    pub unit_id: UnitId,
    pub pdu: Bytes,
}

impl TcpFrame {
    #[must_use]
    pub const fn new(transaction_id: TransactionId, unit_id: UnitId, pdu: Bytes) -> Self {
        Self {
            transaction_id,
            protocol_id: PROTOCOL_ID,
            unit_id,
            pdu,
        }
    }

    /// Value of the length field: unit id plus PDU.
    #[must_use]
    pub fn length(&self) -> u16 {
        super::u16_len(self.pdu.len() + 1)
    }

    /// Parse a complete frame.
    ///
    /// # Errors
    ///
    /// Fails on a foreign protocol id or if the length field does not
    /// match the number of bytes.
    pub fn decode(adu: &[u8]) -> io::Result<Self> {
        if adu.len() < HEADER_LEN + 1 {
            return Err(invalid_data(format!("MBAP frame too short: {} bytes", adu.len())));
        }
        let transaction_id = BigEndian::read_u16(&adu[0..2]);
        let protocol_id = BigEndian::read_u16(&adu[2..4]);
        let length = usize::from(BigEndian::read_u16(&adu[4..6]));
        if protocol_id != PROTOCOL_ID {
            return Err(invalid_data(format!("invalid protocol id: 0x{protocol_id:04X}")));
        }
        if length + HEADER_LEN - 1 != adu.len() {
            return Err(invalid_data(format!(
                "length field {length} does not match frame size {}",
                adu.len()
            )));
        }
        Ok(Self {
            transaction_id,
            protocol_id,
            unit_id: adu[6],
            pdu: Bytes::copy_from_slice(&adu[HEADER_LEN..]),
        })
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        buf.reserve(HEADER_LEN + self.pdu.len());
        buf.put_u16(self.transaction_id);
        buf.put_u16(self.protocol_id);
        buf.put_u16(self.length());
        buf.put_u8(self.unit_id);
        buf.put_slice(&self.pdu);
    }
}

/// A decoded message together with its transaction id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcpAdu {
    pub transaction_id: TransactionId,
    pub message: Message,
}
