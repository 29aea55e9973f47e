// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! RTU stream codecs.

use std::io;

use tokio_util::codec::{Decoder, Encoder};

use super::{decode_pdu, discover::discover_pdu_len, encode_pdu_to_bytes};

use crate::{
    bytes::BytesMut,
    frame::{
        rtu::{RtuFrame, ENVELOPE_LEN},
        Direction, Message,
    },
};

const CRC_INIT: u16 = 0xFFFF;

/// CRC-16/MODBUS of `buf`.
#[must_use]
pub fn calc_crc(buf: &[u8]) -> u16 {
    update_crc(CRC_INIT, buf)
}

/// Continue the CRC calculation `crc` with more bytes.
#[must_use]
pub fn update_crc(mut crc: u16, buf: &[u8]) -> u16 {
    for x in buf {
        crc ^= u16::from(*x);
        for _ in 0..8 {
            if (crc & 0x0001) != 0 {
                crc >>= 1;
                crc ^= 0xA001;
            } else {
                crc >>= 1;
            }
        }
    }
    crc
}

fn decode_frame(buf: &mut BytesMut, direction: Direction) -> io::Result<Option<RtuFrame>> {
    if buf.is_empty() {
        return Ok(None);
    }
    let pdu_len = match discover_pdu_len(&buf[1..], direction) {
        Ok(Some(pdu_len)) => pdu_len,
        Ok(None) => {
            // incomplete frame
            return Ok(None);
        }
        Err(err) => {
            log::warn!(
                "Failed to find frame boundary in {} buffered byte(s): {err}",
                buf.len()
            );
            return Err(err);
        }
    };
    let adu_len = pdu_len + ENVELOPE_LEN;
    if buf.len() < adu_len {
        return Ok(None);
    }
    let adu = buf.split_to(adu_len);
    RtuFrame::decode(&adu).map(Some)
}

/// Decode one RTU frame from the front of `buf`.
///
/// A CRC mismatch is not rejected, see [`Message::validate`].
pub fn decode_message(buf: &mut BytesMut, direction: Direction) -> io::Result<Option<Message>> {
    let Some(frame) = decode_frame(buf, direction)? else {
        return Ok(None);
    };
    let checksum = frame.checksum();
    if !checksum.is_valid() {
        log::warn!(
            "CRC mismatch in frame from unit {}: given = 0x{:04X}, computed = 0x{:04X}",
            frame.unit_id,
            checksum.given,
            checksum.computed
        );
    }
    let message = decode_pdu(frame.unit_id, frame.pdu, direction)?;
    Ok(Some(message.with_checksum(checksum)))
}

/// Append `message` as RTU frame to `buf`.
pub fn encode_message(message: &Message, buf: &mut BytesMut) -> io::Result<()> {
    let pdu = encode_pdu_to_bytes(message)?;
    RtuFrame::new(message.unit_id(), pdu).encode(buf);
    Ok(())
}

/// Decodes responses and encodes requests.
#[derive(Debug, Default)]
pub struct ClientCodec;

impl Decoder for ClientCodec {
    type Item = Message;
    type Error = io::Error;

    fn decode(&mut self, buf: &mut BytesMut) -> io::Result<Option<Message>> {
        decode_message(buf, Direction::Response)
    }
}

impl Encoder<Message> for ClientCodec {
    type Error = io::Error;

    fn encode(&mut self, request: Message, buf: &mut BytesMut) -> io::Result<()> {
        encode_message(&request, buf)
    }
}

/// Decodes requests and encodes responses.
#[derive(Debug, Default)]
pub struct ServerCodec;

impl Decoder for ServerCodec {
    type Item = Message;
    type Error = io::Error;

    fn decode(&mut self, buf: &mut BytesMut) -> io::Result<Option<Message>> {
        decode_message(buf, Direction::Request)
    }
}

impl Encoder<Message> for ServerCodec {
    type Error = io::Error;

    fn encode(&mut self, response: Message, buf: &mut BytesMut) -> io::Result<()> {
        encode_message(&response, buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::{
        error::ValidationError,
        frame::{ExceptionCode, FunctionCode},
    };

    #[test]
    fn test_calc_crc() {
        let msg = [0x01, 0x03, 0x08, 0x2B, 0x00, 0x02];
        assert_eq!(calc_crc(&msg), 0x63B6);

        let msg = [0x01, 0x03, 0x04, 0x00, 0x20, 0x00, 0x00];
        assert_eq!(calc_crc(&msg), 0xF9FB);

        let msg = [0x01, 0x03, 0x00, 0x00, 0x00, 0x01];
        assert_eq!(calc_crc(&msg), 0x0A84);
    }

    #[test]
    fn crc_changes_with_every_single_bit() {
        let msg = [0x01, 0x03, 0x00, 0x00, 0x00, 0x01];
        let crc = calc_crc(&msg);
        for i in 0..msg.len() * 8 {
            let mut flipped = msg;
            flipped[i / 8] ^= 1 << (i % 8);
            assert_ne!(calc_crc(&flipped), crc);
        }
    }

    #[test]
    fn update_crc_continues_calculation() {
        let msg = [0x01, 0x03, 0x08, 0x2B, 0x00, 0x02];
        assert_eq!(update_crc(calc_crc(&msg[..1]), &msg[1..]), calc_crc(&msg));
    }

    mod client {

        use super::*;

        #[test]
        fn decode_partly_received_message() {
            let mut codec = ClientCodec;
            let mut buf = BytesMut::from(
                &[
                    0x12, // unit id
                    0x02, // function code
                    0x03, // byte count
                    0x00, // data
                    0x00, // data
                    0x00, // data
                    0x00, // CRC first byte
                          // missing crc second byte
                ][..],
            );
            let res = codec.decode(&mut buf).unwrap();
            assert!(res.is_none());
            assert_eq!(buf.len(), 7);
        }

        #[test]
        fn decode_read_holding_registers_response() {
            let mut codec = ClientCodec;
            let mut buf = BytesMut::from(
                &[
                    0x01, 0x03, 0x06, 0x00, 0x01, 0x00, 0x02, 0x00, 0x03, 0xFD, 0x74, 0x01,
                ][..],
            );
            let msg = codec.decode(&mut buf).unwrap().unwrap();
            assert_eq!(buf.len(), 1);
            assert_eq!(msg.unit_id(), 1);
            assert_eq!(msg.function(), FunctionCode::ReadHoldingRegisters);
            assert_eq!(msg.words(), Some(vec![1, 2, 3]));
            assert!(msg.validate().is_ok());
        }

        #[test]
        fn decode_exception_message() {
            let mut codec = ClientCodec;
            let mut buf = BytesMut::from(&[0x66, 0x82, 0x03, 0xB1, 0x7E][..]);
            let msg = codec.decode(&mut buf).unwrap().unwrap();
            assert!(buf.is_empty());
            assert_eq!(msg.unit_id(), 0x66);
            assert_eq!(msg.function(), FunctionCode::ReadDiscreteInputs);
            assert_eq!(msg.error(), Some(ExceptionCode::IllegalDataValue));
        }

        #[test]
        fn decode_with_invalid_crc() {
            let mut codec = ClientCodec;
            let mut buf = BytesMut::from(
                &[
                    0x01, 0x03, 0x06, 0x00, 0x01, 0x00, 0x02, 0x00, 0x03, 0xFD, 0x75,
                ][..],
            );
            let msg = codec.decode(&mut buf).unwrap().unwrap();
            assert!(buf.is_empty());
            assert_eq!(msg.words(), Some(vec![1, 2, 3]));
            assert_eq!(
                msg.validate(),
                Err(ValidationError::CrcMismatch {
                    given: 0x75FD,
                    computed: 0x74FD,
                })
            );
        }

        #[test]
        fn decode_unknown_function() {
            let mut codec = ClientCodec;
            let mut buf = BytesMut::from(&[0x01, 0x66, 0x00, 0x00][..]);
            let err = codec.decode(&mut buf).unwrap_err();
            assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        }

        #[test]
        fn encode_read_holding_registers_request() {
            let mut codec = ClientCodec;
            let mut buf = BytesMut::new();
            let req = Message::read_holding_registers_request(1, 0x02, 3).unwrap();
            codec.encode(req, &mut buf).unwrap();
            assert_eq!(
                &buf[..],
                &[0x01, 0x03, 0x00, 0x02, 0x00, 0x03, 0xA4, 0x0B]
            );
        }

        #[test]
        fn encode_write_coil_request() {
            let mut codec = ClientCodec;
            let mut buf = BytesMut::new();
            codec
                .encode(Message::write_coil_request(1, 0x13, true), &mut buf)
                .unwrap();
            codec
                .encode(Message::write_coil_request(1, 0x13, false), &mut buf)
                .unwrap();
            assert_eq!(
                &buf[..],
                &[
                    0x01, 0x05, 0x00, 0x13, 0xFF, 0x00, 0x7D, 0xFF, //
                    0x01, 0x05, 0x00, 0x13, 0x00, 0x00, 0x3C, 0x0F,
                ]
            );
        }
    }

    mod server {

        use super::*;

        #[test]
        fn decode_partly_received_message_0x16() {
            let mut codec = ServerCodec;
            let mut buf = BytesMut::from(
                &[
                    0x12, // unit id
                    0x16, // function code
                    0x00, // irrelevant
                    0x00, // irrelevant
                ][..],
            );
            let res = codec.decode(&mut buf).unwrap();
            assert!(res.is_none());
            assert_eq!(buf.len(), 4);
        }

        #[test]
        fn decode_partly_received_message_0x0f() {
            let mut codec = ServerCodec;
            let mut buf = BytesMut::from(
                &[
                    0x12, // unit id
                    0x0F, // function code
                    0x00, // irrelevant
                    0x00, // irrelevant
                ][..],
            );
            let res = codec.decode(&mut buf).unwrap();
            assert!(res.is_none());
            assert_eq!(buf.len(), 4);
        }

        #[test]
        fn decode_read_holding_registers_request() {
            let mut codec = ServerCodec;
            let mut buf =
                BytesMut::from(&[0x01, 0x03, 0x00, 0x02, 0x00, 0x03, 0xA4, 0x0B][..]);
            let msg = codec.decode(&mut buf).unwrap().unwrap();
            assert!(buf.is_empty());
            assert_eq!(
                msg.payload(),
                Message::read_holding_registers_request(1, 0x02, 3)
                    .unwrap()
                    .payload()
            );
            assert!(msg.validate().is_ok());
        }

        #[test]
        fn encode_exception_response() {
            let mut codec = ServerCodec;
            let mut buf = BytesMut::new();
            let rsp = Message::exception(
                0x66,
                FunctionCode::ReadDiscreteInputs,
                ExceptionCode::IllegalDataValue,
            );
            codec.encode(rsp, &mut buf).unwrap();
            assert_eq!(&buf[..], &[0x66, 0x82, 0x03, 0xB1, 0x7E]);
        }
    }
}
