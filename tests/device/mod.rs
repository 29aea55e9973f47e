// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! An in-memory device for driving real clients.

use std::{
    io,
    ops::Range,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use futures::{SinkExt as _, StreamExt as _};
use modbus_engine::{
    client::{BoxedTransport, Connector},
    codec::{rtu, tcp},
    frame::{tcp::TcpAdu, BitBlock, RegisterBlock},
    ExceptionCode, FunctionCode, Message, Payload,
};
use tokio::{io::DuplexStream, sync::mpsc};
use tokio_util::codec::Framed;

pub const UNIT_ID: u8 = 1;

const REGISTER_COUNT: usize = 0x100;

/// Opens a new in-memory stream on every connect.
///
/// The device ends are delivered on the receiver returned by
/// [`duplex_connector`]. Dropping that receiver refuses further
/// connections.
#[derive(Debug)]
pub struct DuplexConnector {
    devices: mpsc::UnboundedSender<DuplexStream>,
}

pub fn duplex_connector() -> (DuplexConnector, mpsc::UnboundedReceiver<DuplexStream>) {
    let (devices, rx) = mpsc::unbounded_channel();
    (DuplexConnector { devices }, rx)
}

#[async_trait]
impl Connector for DuplexConnector {
    async fn connect(&self) -> io::Result<BoxedTransport> {
        let (client, device) = tokio::io::duplex(4096);
        self.devices
            .send(device)
            .map_err(|_| io::Error::new(io::ErrorKind::ConnectionRefused, "no device"))?;
        Ok(Box::new(client))
    }
}

#[derive(Debug)]
struct Registers {
    coils: Vec<bool>,
    holding: Vec<u16>,
}

/// Coils and holding registers of a single unit.
#[derive(Debug, Clone)]
pub struct Device {
    unit_id: u8,
    registers: Arc<Mutex<Registers>>,
}

fn range(address: u16, count: usize) -> Result<Range<usize>, ExceptionCode> {
    let start = usize::from(address);
    let end = start + count;
    if count == 0 || end > REGISTER_COUNT {
        return Err(ExceptionCode::IllegalDataAddress);
    }
    Ok(start..end)
}

impl Device {
    pub fn new(unit_id: u8) -> Self {
        Self {
            unit_id,
            registers: Arc::new(Mutex::new(Registers {
                coils: vec![false; REGISTER_COUNT],
                holding: vec![0; REGISTER_COUNT],
            })),
        }
    }

    pub fn set_holding(&self, address: u16, words: &[u16]) {
        let start = usize::from(address);
        self.registers.lock().unwrap().holding[start..start + words.len()].copy_from_slice(words);
    }

    pub fn holding(&self, address: u16) -> u16 {
        self.registers.lock().unwrap().holding[usize::from(address)]
    }

    pub fn coil(&self, address: u16) -> bool {
        self.registers.lock().unwrap().coils[usize::from(address)]
    }

    /// The response to `request`, `None` if it is addressed to another unit.
    pub fn respond(&self, request: &Message) -> Option<Message> {
        if request.unit_id() != self.unit_id {
            return None;
        }
        let function = request.function();
        let response = request
            .payload()
            .ok_or(ExceptionCode::IllegalFunction)
            .and_then(|payload| self.process(function, payload))
            .unwrap_or_else(|exception| Message::exception(self.unit_id, function, exception));
        Some(response)
    }

    fn process(&self, function: FunctionCode, payload: &Payload) -> Result<Message, ExceptionCode> {
        let unit_id = self.unit_id;
        let mut registers = self.registers.lock().unwrap();
        let response = match (function, payload) {
            (
                FunctionCode::ReadCoils,
                Payload::Bits(BitBlock { address, count, .. }),
            ) => {
                let range = range(*address, usize::from(*count))?;
                Message::read_coils_response(unit_id, &registers.coils[range])
            }
            (
                FunctionCode::WriteSingleCoil,
                Payload::Bits(BitBlock {
                    address,
                    bits: Some(bits),
                    ..
                }),
            ) => {
                let value = *bits.first().ok_or(ExceptionCode::IllegalDataValue)?;
                let range = range(*address, 1)?;
                registers.coils[range.start] = value;
                Ok(Message::write_coil_response(unit_id, *address, value))
            }
            (
                FunctionCode::WriteMultipleCoils,
                Payload::Bits(BitBlock {
                    address,
                    count,
                    bits: Some(bits),
                }),
            ) => {
                let range = range(*address, bits.len())?;
                registers.coils[range].copy_from_slice(bits);
                Message::write_coils_response(unit_id, *address, *count)
            }
            (
                FunctionCode::ReadHoldingRegisters,
                Payload::Registers(RegisterBlock { address, count, .. }),
            ) => {
                let range = range(*address, usize::from(*count))?;
                Message::read_holding_registers_response(unit_id, &registers.holding[range])
            }
            (FunctionCode::WriteSingleRegister, Payload::Registers(block)) => {
                let word = *block.words().first().ok_or(ExceptionCode::IllegalDataValue)?;
                let range = range(block.address, 1)?;
                registers.holding[range.start] = word;
                Ok(Message::write_register_response(unit_id, block.address, word))
            }
            (FunctionCode::WriteMultipleRegisters, Payload::Registers(block)) => {
                let words = block.words();
                let range = range(block.address, words.len())?;
                registers.holding[range].copy_from_slice(&words);
                Message::write_registers_response(unit_id, block.address, block.count)
            }
            (FunctionCode::MaskWriteRegister, Payload::MaskWrite(mask)) => {
                let range = range(mask.address, 1)?;
                let current = registers.holding[range.start];
                registers.holding[range.start] = mask.apply(current);
                Ok(Message::mask_write_register_response(
                    unit_id,
                    mask.address,
                    mask.and_mask,
                    mask.or_mask,
                ))
            }
            (FunctionCode::ReadWriteMultipleRegisters, Payload::ReadWrite(read_write)) => {
                let write_address = read_write
                    .write_address
                    .ok_or(ExceptionCode::IllegalDataValue)?;
                let words = read_write.words();
                let write_range = range(write_address, words.len())?;
                let read_range =
                    range(read_write.read_address, usize::from(read_write.read_count))?;
                registers.holding[write_range].copy_from_slice(&words);
                Message::read_write_registers_response(unit_id, &registers.holding[read_range])
            }
            _ => return Err(ExceptionCode::IllegalFunction),
        };
        response.map_err(|_| ExceptionCode::ServerDeviceFailure)
    }
}

/// Answer RTU requests with `respond` until the stream is closed.
pub async fn serve_rtu(
    stream: DuplexStream,
    respond: impl Fn(&Message) -> Option<Message> + Send,
) -> anyhow::Result<()> {
    let mut framed = Framed::new(stream, rtu::ServerCodec);
    while let Some(request) = framed.next().await {
        let request = request?;
        if let Some(response) = respond(&request) {
            framed.send(response).await?;
        }
    }
    Ok(())
}

/// Answer MBAP requests with `respond` until the stream is closed.
pub async fn serve_tcp(
    stream: DuplexStream,
    respond: impl Fn(&Message) -> Option<Message> + Send,
) -> anyhow::Result<()> {
    let mut framed = Framed::new(stream, tcp::ServerCodec::default());
    while let Some(adu) = framed.next().await {
        let TcpAdu {
            transaction_id,
            message,
        } = adu?;
        if let Some(response) = respond(&message) {
            framed
                .send(TcpAdu {
                    transaction_id,
                    message: response,
                })
                .await?;
        }
    }
    Ok(())
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
