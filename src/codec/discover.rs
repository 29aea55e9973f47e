// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Frame length discovery for byte streams without a length prefix.

use std::io::{self, Error, ErrorKind};

use byteorder::{BigEndian, ByteOrder as _};

use super::MAX_PDU_SIZE;

use crate::frame::{Direction, FunctionCode, EXCEPTION_FLAG};

/// Determine the length of the PDU at the start of `buf`.
///
/// `buf` starts with the function code. Returns `Ok(None)` as long as the
/// PDU has not been received completely, otherwise the number of bytes from
/// the function code through the end of the payload. Trailing bytes after
/// the PDU are ignored.
///
/// Encapsulated interface transport never reports a length.
///
/// # Errors
///
/// Fails with [`ErrorKind::InvalidData`] for function codes that are not
/// part of the function table or if a byte count claims more than
/// [`MAX_PDU_SIZE`] bytes. The stream is out of sync in both cases.
pub fn discover_pdu_len(buf: &[u8], direction: Direction) -> io::Result<Option<usize>> {
    let Some(&fn_code) = buf.first() else {
        // incomplete frame
        return Ok(None);
    };
    let len = if fn_code & EXCEPTION_FLAG != 0 {
        Some(2)
    } else {
        let function = FunctionCode::new(fn_code);
        if function.is_custom() {
            return Err(Error::new(
                ErrorKind::InvalidData,
                format!("cannot determine frame length of function 0x{fn_code:02X}"),
            ));
        }
        match direction {
            Direction::Request => request_pdu_len(function, buf),
            Direction::Response => response_pdu_len(function, buf),
        }
    };
    let Some(len) = len else {
        return Ok(None);
    };
    if len > MAX_PDU_SIZE {
        return Err(Error::new(
            ErrorKind::InvalidData,
            format!("claimed PDU size of {len} bytes exceeds {MAX_PDU_SIZE}"),
        ));
    }
    if buf.len() < len {
        // incomplete frame
        return Ok(None);
    }
    Ok(Some(len))
}

/// Fixed header plus the byte count found at `offset`.
fn with_byte_count(buf: &[u8], offset: usize, header_len: usize) -> Option<usize> {
    buf.get(offset)
        .map(|byte_count| header_len + usize::from(*byte_count))
}

fn request_pdu_len(function: FunctionCode, buf: &[u8]) -> Option<usize> {
    use FunctionCode as F;
    match function {
        F::ReadCoils
        | F::ReadDiscreteInputs
        | F::ReadHoldingRegisters
        | F::ReadInputRegisters
        | F::WriteSingleCoil
        | F::WriteSingleRegister
        | F::Diagnostics => Some(5),
        F::ReadExceptionStatus
        | F::GetCommEventCounter
        | F::GetCommEventLog
        | F::ReportServerId => Some(1),
        F::WriteMultipleCoils | F::WriteMultipleRegisters => with_byte_count(buf, 5, 6),
        F::ReadFileRecord | F::WriteFileRecord => with_byte_count(buf, 1, 2),
        F::MaskWriteRegister => Some(7),
        F::ReadWriteMultipleRegisters => with_byte_count(buf, 9, 10),
        F::ReadFifoQueue => Some(3),
        F::EncapsulatedInterfaceTransport | F::Custom(_) => None,
    }
}

fn response_pdu_len(function: FunctionCode, buf: &[u8]) -> Option<usize> {
    use FunctionCode as F;
    match function {
        F::ReadCoils
        | F::ReadDiscreteInputs
        | F::ReadHoldingRegisters
        | F::ReadInputRegisters
        | F::GetCommEventLog
        | F::ReportServerId
        | F::ReadFileRecord
        | F::WriteFileRecord
        | F::ReadWriteMultipleRegisters => with_byte_count(buf, 1, 2),
        F::WriteSingleCoil
        | F::WriteSingleRegister
        | F::WriteMultipleCoils
        | F::WriteMultipleRegisters
        | F::Diagnostics
        | F::GetCommEventCounter => Some(5),
        F::ReadExceptionStatus => Some(2),
        F::MaskWriteRegister => Some(7),
        F::ReadFifoQueue => buf
            .get(1..3)
            .map(|byte_count| 3 + usize::from(BigEndian::read_u16(byte_count))),
        F::EncapsulatedInterfaceTransport | F::Custom(_) => None,
    }
}
