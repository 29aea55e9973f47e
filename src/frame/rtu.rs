// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! RTU envelope: unit id, PDU and CRC-16.

use std::io;

use super::{Checksum, UnitId};

use crate::{
    bytes::{BufMut as _, Bytes, BytesMut},
    codec::rtu::{calc_crc, update_crc},
    error::{invalid_data, ValidationError},
};

/// Unit id plus CRC.
pub const ENVELOPE_LEN: usize = 3;

/// A single RTU frame as transmitted over a serial line.
///
/// `crc` is the CRC that has been received or the CRC that will be sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtuFrame {
    pub unit_id: UnitId,
    pub pdu: Bytes,
    pub crc: u16,
}

impl RtuFrame {
    /// Wrap `pdu` for sending with a freshly computed CRC.
    #[must_use]
    pub fn new(unit_id: UnitId, pdu: Bytes) -> Self {
        let crc = update_crc(calc_crc(&[unit_id]), &pdu);
        Self { unit_id, pdu, crc }
    }

    /// Split a complete ADU into its parts without checking the CRC.
    ///
    /// # Errors
    ///
    /// Fails if `adu` is too short to hold unit id, function code and CRC.
    pub fn decode(adu: &[u8]) -> io::Result<Self> {
        if adu.len() < ENVELOPE_LEN + 1 {
            return Err(invalid_data(format!("RTU frame too short: {} bytes", adu.len())));
        }
        let (head, crc) = adu.split_at(adu.len() - 2);
        Ok(Self {
            unit_id: head[0],
            pdu: Bytes::copy_from_slice(&head[1..]),
            // Low byte first
            crc: u16::from_le_bytes([crc[0], crc[1]]),
        })
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        buf.reserve(self.len());
        buf.put_u8(self.unit_id);
        buf.put_slice(&self.pdu);
        buf.put_u16_le(self.crc);
    }

    /// Number of bytes on the wire.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pdu.len() + ENVELOPE_LEN
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pdu.is_empty()
    }

    /// The CRC over unit id and PDU.
    #[must_use]
    pub fn computed_crc(&self) -> u16 {
        update_crc(calc_crc(&[self.unit_id]), &self.pdu)
    }

    #[must_use]
    pub fn checksum(&self) -> Checksum {
        Checksum {
            given: self.crc,
            computed: self.computed_crc(),
        }
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.checksum().is_valid()
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        let Checksum { given, computed } = self.checksum();
        if given != computed {
            return Err(ValidationError::CrcMismatch { given, computed });
        }
        Ok(())
    }
}
