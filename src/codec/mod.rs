// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Payload codec: the byte layouts of all modelled functions.

use std::io::{self, Cursor, Error, ErrorKind};

use byteorder::{BigEndian, ReadBytesExt as _};

use crate::{
    bytes::{Buf as _, BufMut as _, Bytes, BytesMut},
    frame::{
        BitBlock, Coil, Direction, ExceptionCode, FunctionCode, MaskWrite, Message, Payload,
        Quantity, ReadWriteRegisters, RegisterBlock, UnitId, EXCEPTION_FLAG,
    },
};

pub mod discover;
pub mod rtu;
pub mod tcp;

/// Maximum request/response PDU size.
///
/// As defined for both RTU and TCP.
pub const MAX_PDU_SIZE: usize = 253;

#[allow(clippy::cast_possible_truncation)]
fn u8_len(len: usize) -> u8 {
    // This type conversion should always be safe, because either
    // the caller is responsible to pass a valid usize or the
    // possible values are limited by the protocol.
    debug_assert!(len <= u8::MAX.into());
    len as u8
}

fn invalid_input(function: FunctionCode, payload: &Payload) -> Error {
    Error::new(
        ErrorKind::InvalidInput,
        format!("function {function} cannot encode payload {payload:?}"),
    )
}

/// Serialize the PDU of `message` into `buf`.
///
/// The layout follows from the payload: requests and responses of the same
/// function differ in which optional parts are present.
///
/// # Errors
///
/// Fails if payload and function do not fit together or the PDU exceeds
/// [`MAX_PDU_SIZE`]. Nothing is written to `buf` in this case.
pub fn encode_pdu(buf: &mut BytesMut, message: &Message) -> io::Result<()> {
    let mut pdu = BytesMut::new();
    let function = message.function();
    let Some(payload) = message.payload() else {
        let exception = message.error().unwrap_or(ExceptionCode::ServerDeviceFailure);
        debug_assert!(function.value() < EXCEPTION_FLAG);
        buf.put_u8(function.value() | EXCEPTION_FLAG);
        buf.put_u8(exception.value());
        return Ok(());
    };
    pdu.put_u8(function.value());
    match (function, payload) {
        (
            FunctionCode::ReadCoils | FunctionCode::ReadDiscreteInputs,
            Payload::Bits(BitBlock {
                address,
                count,
                bits,
            }),
        ) => {
            if let Some(bits) = bits {
                pdu.put_u8(u8_len(packed_coils_size(bits)));
                encode_packed_coils(&mut pdu, bits);
            } else {
                pdu.put_u16(*address);
                pdu.put_u16(*count);
            }
        }
        (
            FunctionCode::WriteSingleCoil,
            Payload::Bits(BitBlock {
                address,
                bits: Some(bits),
                ..
            }),
        ) if bits.len() == 1 => {
            pdu.put_u16(*address);
            pdu.put_u16(bool_to_coil(bits[0]));
        }
        (
            FunctionCode::WriteMultipleCoils,
            Payload::Bits(BitBlock {
                address,
                count,
                bits,
            }),
        ) => {
            pdu.put_u16(*address);
            pdu.put_u16(*count);
            if let Some(bits) = bits {
                pdu.put_u8(u8_len(packed_coils_size(bits)));
                encode_packed_coils(&mut pdu, bits);
            }
        }
        (
            FunctionCode::ReadHoldingRegisters | FunctionCode::ReadInputRegisters,
            Payload::Registers(RegisterBlock {
                address,
                count,
                data,
            }),
        ) => {
            if let Some(data) = data {
                pdu.put_u8(u8_len(data.len()));
                pdu.put_slice(data);
            } else {
                pdu.put_u16(*address);
                pdu.put_u16(*count);
            }
        }
        (
            FunctionCode::WriteSingleRegister,
            Payload::Registers(RegisterBlock {
                address,
                data: Some(data),
                ..
            }),
        ) if data.len() == 2 => {
            pdu.put_u16(*address);
            pdu.put_slice(data);
        }
        (
            FunctionCode::WriteMultipleRegisters,
            Payload::Registers(RegisterBlock {
                address,
                count,
                data,
            }),
        ) => {
            pdu.put_u16(*address);
            pdu.put_u16(*count);
            if let Some(data) = data {
                pdu.put_u8(u8_len(data.len()));
                pdu.put_slice(data);
            }
        }
        (
            FunctionCode::MaskWriteRegister,
            Payload::MaskWrite(MaskWrite {
                address,
                and_mask,
                or_mask,
            }),
        ) => {
            pdu.put_u16(*address);
            pdu.put_u16(*and_mask);
            pdu.put_u16(*or_mask);
        }
        (
            FunctionCode::ReadWriteMultipleRegisters,
            Payload::ReadWrite(ReadWriteRegisters {
                read_address,
                read_count,
                write_address,
                data,
            }),
        ) => {
            if let Some(write_address) = write_address {
                pdu.put_u16(*read_address);
                pdu.put_u16(*read_count);
                pdu.put_u16(*write_address);
                pdu.put_u16(crate::frame::u16_len(data.len() / 2));
            }
            pdu.put_u8(u8_len(data.len()));
            pdu.put_slice(data);
        }
        (
            FunctionCode::ReadFifoQueue,
            Payload::Registers(RegisterBlock { address, data, .. }),
        ) => {
            if let Some(data) = data {
                pdu.put_u16(crate::frame::u16_len(2 + data.len()));
                pdu.put_u16(crate::frame::u16_len(data.len() / 2));
                pdu.put_slice(data);
            } else {
                pdu.put_u16(*address);
            }
        }
        (_, Payload::Raw(data)) => {
            pdu.put_slice(data);
        }
        (function, payload) => {
            return Err(invalid_input(function, payload));
        }
    }
    if pdu.len() > MAX_PDU_SIZE {
        return Err(Error::new(ErrorKind::InvalidInput, "PDU size exceeded"));
    }
    buf.put_slice(&pdu);
    Ok(())
}

/// Serialize the PDU of `message` into a new buffer.
pub fn encode_pdu_to_bytes(message: &Message) -> io::Result<Bytes> {
    let mut buf = BytesMut::new();
    encode_pdu(&mut buf, message)?;
    Ok(buf.freeze())
}

fn read_u16_be(reader: &mut impl io::Read) -> io::Result<u16> {
    reader.read_u16::<BigEndian>()
}

/// Parse the PDU of a request sent to `unit_id`.
pub fn decode_request_pdu(unit_id: UnitId, bytes: Bytes) -> io::Result<Message> {
    decode_pdu(unit_id, bytes, Direction::Request)
}

/// Parse the PDU of a response from `unit_id`.
pub fn decode_response_pdu(unit_id: UnitId, bytes: Bytes) -> io::Result<Message> {
    decode_pdu(unit_id, bytes, Direction::Response)
}

/// Parse a PDU traveling in `direction`.
///
/// A function code with the exception flag set always yields an exception
/// message. Functions without a dedicated layout yield [`Payload::Raw`].
///
/// # Errors
///
/// Fails with [`ErrorKind::InvalidData`] on malformed content.
pub fn decode_pdu(unit_id: UnitId, bytes: Bytes, direction: Direction) -> io::Result<Message> {
    if bytes.len() > MAX_PDU_SIZE {
        return Err(Error::new(ErrorKind::InvalidData, "PDU size exceeded"));
    }
    let Some(&fn_code) = bytes.first() else {
        return Err(Error::new(ErrorKind::InvalidData, "empty PDU"));
    };
    if fn_code & EXCEPTION_FLAG != 0 {
        return decode_exception_pdu(unit_id, &bytes);
    }
    let function = FunctionCode::new(fn_code);
    let rdr = &mut Cursor::new(&bytes);
    rdr.advance(1);
    let payload = match direction {
        Direction::Request => decode_request_payload(function, rdr, &bytes)?,
        Direction::Response => decode_response_payload(function, rdr, &bytes)?,
    };
    let Some(payload) = payload else {
        return Ok(Message::new(unit_id, function, Payload::Raw(bytes.slice(1..))));
    };
    // Verify that all data has been consumed and decoded.
    if rdr.has_remaining() {
        return Err(Error::new(
            ErrorKind::InvalidData,
            format!("undecoded {direction:?} data of function {function}"),
        ));
    }
    Ok(Message::new(unit_id, function, payload))
}

fn decode_exception_pdu(unit_id: UnitId, bytes: &[u8]) -> io::Result<Message> {
    let [fn_err_code, exception] = bytes else {
        return Err(Error::new(
            ErrorKind::InvalidData,
            format!("invalid exception PDU size: {}", bytes.len()),
        ));
    };
    Ok(Message::exception(
        unit_id,
        FunctionCode::new(fn_err_code & !EXCEPTION_FLAG),
        ExceptionCode::new(*exception),
    ))
}

fn take_bytes(rdr: &mut Cursor<&Bytes>, bytes: &Bytes, len: usize) -> io::Result<Bytes> {
    #[allow(clippy::cast_possible_truncation)]
    let start = rdr.position() as usize;
    if bytes.len() < start + len {
        return Err(Error::new(ErrorKind::InvalidData, "too short"));
    }
    rdr.advance(len);
    Ok(bytes.slice(start..start + len))
}

fn decode_request_payload(
    function: FunctionCode,
    rdr: &mut Cursor<&Bytes>,
    bytes: &Bytes,
) -> io::Result<Option<Payload>> {
    let payload = match function {
        FunctionCode::ReadCoils | FunctionCode::ReadDiscreteInputs => Payload::Bits(BitBlock {
            address: read_u16_be(rdr)?,
            count: read_u16_be(rdr)?,
            bits: None,
        }),
        FunctionCode::ReadHoldingRegisters | FunctionCode::ReadInputRegisters => {
            Payload::Registers(RegisterBlock {
                address: read_u16_be(rdr)?,
                count: read_u16_be(rdr)?,
                data: None,
            })
        }
        FunctionCode::WriteSingleCoil => decode_write_single_coil(rdr)?,
        FunctionCode::WriteSingleRegister => decode_write_single_register(rdr, bytes)?,
        FunctionCode::WriteMultipleCoils => {
            let address = read_u16_be(rdr)?;
            let count = read_u16_be(rdr)?;
            let byte_count = usize::from(rdr.read_u8()?);
            if byte_count != packed_coils_len(count) {
                return Err(Error::new(ErrorKind::InvalidData, "invalid byte count"));
            }
            let packed_coils = take_bytes(rdr, bytes, byte_count)?;
            Payload::Bits(BitBlock {
                address,
                count,
                bits: Some(decode_packed_coils(&packed_coils, count)),
            })
        }
        FunctionCode::WriteMultipleRegisters => {
            let address = read_u16_be(rdr)?;
            let count = read_u16_be(rdr)?;
            let byte_count = usize::from(rdr.read_u8()?);
            if byte_count != usize::from(count) * 2 {
                return Err(Error::new(ErrorKind::InvalidData, "invalid quantity"));
            }
            Payload::Registers(RegisterBlock {
                address,
                count,
                data: Some(take_bytes(rdr, bytes, byte_count)?),
            })
        }
        FunctionCode::MaskWriteRegister => decode_mask_write(rdr)?,
        FunctionCode::ReadWriteMultipleRegisters => {
            let read_address = read_u16_be(rdr)?;
            let read_count = read_u16_be(rdr)?;
            let write_address = read_u16_be(rdr)?;
            let write_count = read_u16_be(rdr)?;
            let byte_count = usize::from(rdr.read_u8()?);
            if byte_count != usize::from(write_count) * 2 {
                return Err(Error::new(
                    ErrorKind::InvalidData,
                    "invalid write quantity",
                ));
            }
            Payload::ReadWrite(ReadWriteRegisters {
                read_address,
                read_count,
                write_address: Some(write_address),
                data: take_bytes(rdr, bytes, byte_count)?,
            })
        }
        FunctionCode::ReadFifoQueue => Payload::Registers(RegisterBlock {
            address: read_u16_be(rdr)?,
            count: 0,
            data: None,
        }),
        _ => return Ok(None),
    };
    Ok(Some(payload))
}

fn decode_response_payload(
    function: FunctionCode,
    rdr: &mut Cursor<&Bytes>,
    bytes: &Bytes,
) -> io::Result<Option<Payload>> {
    let payload = match function {
        FunctionCode::ReadCoils | FunctionCode::ReadDiscreteInputs => {
            let byte_count = rdr.read_u8()?;
            let packed_coils = take_bytes(rdr, bytes, byte_count.into())?;
            // Here we have no information about the exact requested quantity
            // so we just unpack the whole bytes.
            let count = Quantity::from(byte_count) * 8;
            Payload::Bits(BitBlock {
                address: 0,
                count,
                bits: Some(decode_packed_coils(&packed_coils, count)),
            })
        }
        FunctionCode::ReadHoldingRegisters | FunctionCode::ReadInputRegisters => {
            let byte_count = rdr.read_u8()?;
            if byte_count % 2 != 0 {
                return Err(Error::new(ErrorKind::InvalidData, "invalid quantity"));
            }
            Payload::Registers(RegisterBlock {
                address: 0,
                count: (byte_count / 2).into(),
                data: Some(take_bytes(rdr, bytes, byte_count.into())?),
            })
        }
        FunctionCode::WriteSingleCoil => decode_write_single_coil(rdr)?,
        FunctionCode::WriteSingleRegister => decode_write_single_register(rdr, bytes)?,
        FunctionCode::WriteMultipleCoils => Payload::Bits(BitBlock {
            address: read_u16_be(rdr)?,
            count: read_u16_be(rdr)?,
            bits: None,
        }),
        FunctionCode::WriteMultipleRegisters => Payload::Registers(RegisterBlock {
            address: read_u16_be(rdr)?,
            count: read_u16_be(rdr)?,
            data: None,
        }),
        FunctionCode::MaskWriteRegister => decode_mask_write(rdr)?,
        FunctionCode::ReadWriteMultipleRegisters => {
            let byte_count = rdr.read_u8()?;
            if byte_count % 2 != 0 {
                return Err(Error::new(ErrorKind::InvalidData, "invalid quantity"));
            }
            Payload::ReadWrite(ReadWriteRegisters {
                read_address: 0,
                read_count: (byte_count / 2).into(),
                write_address: None,
                data: take_bytes(rdr, bytes, byte_count.into())?,
            })
        }
        FunctionCode::ReadFifoQueue => {
            let byte_count = read_u16_be(rdr)?;
            let count = read_u16_be(rdr)?;
            if u32::from(byte_count) != 2 + 2 * u32::from(count) {
                return Err(Error::new(ErrorKind::InvalidData, "invalid FIFO count"));
            }
            Payload::Registers(RegisterBlock {
                address: 0,
                count,
                data: Some(take_bytes(rdr, bytes, usize::from(count) * 2)?),
            })
        }
        _ => return Ok(None),
    };
    Ok(Some(payload))
}

fn decode_write_single_coil(rdr: &mut Cursor<&Bytes>) -> io::Result<Payload> {
    let address = read_u16_be(rdr)?;
    let value = coil_to_bool(read_u16_be(rdr)?)?;
    Ok(Payload::Bits(BitBlock {
        address,
        count: 1,
        bits: Some(vec![value]),
    }))
}

fn decode_write_single_register(rdr: &mut Cursor<&Bytes>, bytes: &Bytes) -> io::Result<Payload> {
    let address = read_u16_be(rdr)?;
    Ok(Payload::Registers(RegisterBlock {
        address,
        count: 1,
        data: Some(take_bytes(rdr, bytes, 2)?),
    }))
}

fn decode_mask_write(rdr: &mut Cursor<&Bytes>) -> io::Result<Payload> {
    Ok(Payload::MaskWrite(MaskWrite {
        address: read_u16_be(rdr)?,
        and_mask: read_u16_be(rdr)?,
        or_mask: read_u16_be(rdr)?,
    }))
}

fn bool_to_coil(state: bool) -> u16 {
    if state {
        0xFF00
    } else {
        0x0000
    }
}

fn coil_to_bool(coil: u16) -> io::Result<bool> {
    match coil {
        0xFF00 => Ok(true),
        0x0000 => Ok(false),
        _ => Err(Error::new(
            ErrorKind::InvalidData,
            format!("invalid coil value: 0x{coil:04X}"),
        )),
    }
}

fn packed_coils_len(count: Quantity) -> usize {
    (usize::from(count) + 7) / 8
}

fn packed_coils_size(coils: &[Coil]) -> usize {
    (coils.len() + 7) / 8
}

fn encode_packed_coils(buf: &mut BytesMut, coils: &[Coil]) -> usize {
    let packed_coils_size = packed_coils_size(coils);
    let offset = buf.len();
    buf.resize(offset + packed_coils_size, 0);
    let buf = &mut buf[offset..];
    for (i, b) in coils.iter().enumerate() {
        let v = u8::from(*b); // 0 or 1
        buf[i / 8] |= v << (i % 8);
    }
    packed_coils_size
}

fn decode_packed_coils(bytes: &[u8], count: u16) -> Vec<Coil> {
    let mut res = Vec::with_capacity(count.into());
    for i in 0usize..count.into() {
        res.push((bytes[i / 8] >> (i % 8)) & 0b1 > 0);
    }
    res
}
