// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message model.

mod code;
pub mod rtu;
pub mod tcp;

pub use self::code::*;

use crate::{
    bytes::{BufMut as _, Bytes, BytesMut},
    codec::MAX_PDU_SIZE,
    error::{invalid_argument, ValidationError},
    Result,
};

/// A Modbus protocol address is represented by 16 bit from `0` to `65535`.
///
/// This *protocol address* uses 0-based indexing, while the *coil address* or
/// *register address* is often specified as a number with 1-based indexing.
/// Please consult the specification of your devices if 1-based coil/register
/// addresses need to be converted to 0-based protocol addresses by subtracting 1.
pub type Address = u16;

/// A Coil represents a single bit.
///
/// - `true` is equivalent to `ON`, `1` and `0xFF00`.
/// - `false` is equivalent to `OFF`, `0` and `0x0000`.
pub type Coil = bool;

/// Modbus uses 16 bit for its data items.
///
/// Transmitted using a big-endian representation.
pub type Word = u16;

/// Number of items to process.
pub type Quantity = u16;

/// Target device address, `0` is the broadcast address on serial lines.
pub type UnitId = u8;

/// Maximum number of coils or discrete inputs per read request.
pub const MAX_READ_BITS: Quantity = 0x07D0;

/// Maximum number of coils per write request.
pub const MAX_WRITE_BITS: Quantity = 0x07B0;

/// Maximum number of registers per read request.
pub const MAX_READ_REGISTERS: Quantity = 0x7D;

/// Maximum number of registers per write request.
pub const MAX_WRITE_REGISTERS: Quantity = 0x79;

/// Maximum number of registers written by a read/write request.
pub const MAX_READ_WRITE_REGISTERS: Quantity = 0x79;

/// Maximum number of values in a FIFO queue response.
pub const MAX_FIFO_COUNT: Quantity = 0x31;

/// Whether a message travels from client to server or back.
///
/// Request and response layouts differ for the same function code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Request,
    Response,
}

/// An addressed block of single-bit registers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitBlock {
    pub address: Address,
    pub count: Quantity,
    /// Bit values, index 0 belongs to the lowest address.
    pub bits: Option<Vec<Coil>>,
}

/// An addressed block of 16-bit registers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterBlock {
    pub address: Address,
    pub count: Quantity,
    /// Raw big-endian register data of even length.
    pub data: Option<Bytes>,
}

impl RegisterBlock {
    /// Decoded register values, empty without data.
    #[must_use]
    pub fn words(&self) -> Vec<Word> {
        self.data.as_deref().map(bytes_to_words).unwrap_or_default()
    }
}

/// Parameters of a mask write register operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaskWrite {
    pub address: Address,
    pub and_mask: Word,
    pub or_mask: Word,
}

impl MaskWrite {
    /// The register content after applying the masks to `current`.
    #[must_use]
    pub const fn apply(&self, current: Word) -> Word {
        (current & self.and_mask) | (self.or_mask & !self.and_mask)
    }
}

/// Combined read and write of holding registers.
///
/// Requests carry the write address and the values to write. Responses
/// only carry the values that have been read and leave `write_address`
/// empty, because the written registers are not echoed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadWriteRegisters {
    pub read_address: Address,
    pub read_count: Quantity,
    pub write_address: Option<Address>,
    /// Raw big-endian register data of even length.
    pub data: Bytes,
}

impl ReadWriteRegisters {
    #[must_use]
    pub const fn direction(&self) -> Direction {
        if self.write_address.is_some() {
            Direction::Request
        } else {
            Direction::Response
        }
    }

    #[must_use]
    pub fn words(&self) -> Vec<Word> {
        bytes_to_words(&self.data)
    }
}

/// Function specific content of a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Bits(BitBlock),
    Registers(RegisterBlock),
    MaskWrite(MaskWrite),
    ReadWrite(ReadWriteRegisters),
    /// Unstructured bytes following the function code of functions
    /// without a dedicated layout.
    Raw(Bytes),
}

/// CRC values of a frame received over a serial line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checksum {
    pub given: u16,
    pub computed: u16,
}

impl Checksum {
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.given == self.computed
    }
}

/// A decoded Modbus message: the envelope fields plus either a payload or
/// an exception.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    unit_id: UnitId,
    function: FunctionCode,
    body: std::result::Result<Payload, ExceptionCode>,
    checksum: Option<Checksum>,
}

impl Message {
    pub(crate) const fn new(unit_id: UnitId, function: FunctionCode, payload: Payload) -> Self {
        Self {
            unit_id,
            function,
            body: Ok(payload),
            checksum: None,
        }
    }

    /// An exception response for `function`.
    #[must_use]
    pub const fn exception(
        unit_id: UnitId,
        function: FunctionCode,
        exception: ExceptionCode,
    ) -> Self {
        Self {
            unit_id,
            function,
            body: Err(exception),
            checksum: None,
        }
    }

    /// A message with an arbitrary function code and unstructured data.
    ///
    /// # Errors
    ///
    /// Fails if `function` has the exception flag set or if the PDU would
    /// exceed [`MAX_PDU_SIZE`](crate::codec::MAX_PDU_SIZE).
    pub fn custom(unit_id: UnitId, function: u8, data: impl Into<Bytes>) -> Result<Self> {
        if function & EXCEPTION_FLAG != 0 {
            return Err(invalid_argument(format!(
                "function code 0x{function:02X} has the exception flag set"
            )));
        }
        let data = data.into();
        if data.len() >= MAX_PDU_SIZE {
            return Err(invalid_argument(format!(
                "{} data bytes exceed the PDU size of {MAX_PDU_SIZE}",
                data.len()
            )));
        }
        Ok(Self::new(
            unit_id,
            FunctionCode::new(function),
            Payload::Raw(data),
        ))
    }

    pub fn read_coils_request(unit_id: UnitId, address: Address, count: Quantity) -> Result<Self> {
        check_range(address, count, MAX_READ_BITS)?;
        Ok(Self::bits(
            unit_id,
            FunctionCode::ReadCoils,
            address,
            count,
            None,
        ))
    }

    pub fn read_discrete_inputs_request(
        unit_id: UnitId,
        address: Address,
        count: Quantity,
    ) -> Result<Self> {
        check_range(address, count, MAX_READ_BITS)?;
        Ok(Self::bits(
            unit_id,
            FunctionCode::ReadDiscreteInputs,
            address,
            count,
            None,
        ))
    }

    /// Response to a read coils request.
    ///
    /// The address is unknown to the wire format and set to `0`. The bits
    /// are padded with `false` to whole bytes, exactly as transmitted. The
    /// client trims them to the requested count on receipt.
    pub fn read_coils_response(unit_id: UnitId, bits: &[Coil]) -> Result<Self> {
        Self::packed_bits_response(unit_id, FunctionCode::ReadCoils, bits)
    }

    pub fn read_discrete_inputs_response(unit_id: UnitId, bits: &[Coil]) -> Result<Self> {
        Self::packed_bits_response(unit_id, FunctionCode::ReadDiscreteInputs, bits)
    }

    fn packed_bits_response(
        unit_id: UnitId,
        function: FunctionCode,
        bits: &[Coil],
    ) -> Result<Self> {
        check_len(bits.len(), MAX_READ_BITS)?;
        let mut bits = bits.to_vec();
        bits.resize((bits.len() + 7) / 8 * 8, false);
        let count = u16_len(bits.len());
        Ok(Self::bits(unit_id, function, 0, count, Some(bits)))
    }

    #[must_use]
    pub fn write_coil_request(unit_id: UnitId, address: Address, value: Coil) -> Self {
        Self::bits(
            unit_id,
            FunctionCode::WriteSingleCoil,
            address,
            1,
            Some(vec![value]),
        )
    }

    /// The echo of a write coil request.
    #[must_use]
    pub fn write_coil_response(unit_id: UnitId, address: Address, value: Coil) -> Self {
        Self::write_coil_request(unit_id, address, value)
    }

    pub fn write_coils_request(unit_id: UnitId, address: Address, bits: &[Coil]) -> Result<Self> {
        let count = check_len(bits.len(), MAX_WRITE_BITS)?;
        check_range(address, count, MAX_WRITE_BITS)?;
        Ok(Self::bits(
            unit_id,
            FunctionCode::WriteMultipleCoils,
            address,
            count,
            Some(bits.to_vec()),
        ))
    }

    pub fn write_coils_response(
        unit_id: UnitId,
        address: Address,
        count: Quantity,
    ) -> Result<Self> {
        check_range(address, count, MAX_WRITE_BITS)?;
        Ok(Self::bits(
            unit_id,
            FunctionCode::WriteMultipleCoils,
            address,
            count,
            None,
        ))
    }

    pub fn read_holding_registers_request(
        unit_id: UnitId,
        address: Address,
        count: Quantity,
    ) -> Result<Self> {
        check_range(address, count, MAX_READ_REGISTERS)?;
        Ok(Self::registers(
            unit_id,
            FunctionCode::ReadHoldingRegisters,
            address,
            count,
            None,
        ))
    }

    pub fn read_input_registers_request(
        unit_id: UnitId,
        address: Address,
        count: Quantity,
    ) -> Result<Self> {
        check_range(address, count, MAX_READ_REGISTERS)?;
        Ok(Self::registers(
            unit_id,
            FunctionCode::ReadInputRegisters,
            address,
            count,
            None,
        ))
    }

    pub fn read_holding_registers_response(unit_id: UnitId, words: &[Word]) -> Result<Self> {
        let count = check_len(words.len(), MAX_READ_REGISTERS)?;
        Ok(Self::registers(
            unit_id,
            FunctionCode::ReadHoldingRegisters,
            0,
            count,
            Some(words_to_bytes(words)),
        ))
    }

    pub fn read_input_registers_response(unit_id: UnitId, words: &[Word]) -> Result<Self> {
        let count = check_len(words.len(), MAX_READ_REGISTERS)?;
        Ok(Self::registers(
            unit_id,
            FunctionCode::ReadInputRegisters,
            0,
            count,
            Some(words_to_bytes(words)),
        ))
    }

    #[must_use]
    pub fn write_register_request(unit_id: UnitId, address: Address, word: Word) -> Self {
        Self::registers(
            unit_id,
            FunctionCode::WriteSingleRegister,
            address,
            1,
            Some(words_to_bytes(&[word])),
        )
    }

    /// The echo of a write register request.
    #[must_use]
    pub fn write_register_response(unit_id: UnitId, address: Address, word: Word) -> Self {
        Self::write_register_request(unit_id, address, word)
    }

    pub fn write_registers_request(
        unit_id: UnitId,
        address: Address,
        words: &[Word],
    ) -> Result<Self> {
        let count = check_len(words.len(), MAX_WRITE_REGISTERS)?;
        check_range(address, count, MAX_WRITE_REGISTERS)?;
        Ok(Self::registers(
            unit_id,
            FunctionCode::WriteMultipleRegisters,
            address,
            count,
            Some(words_to_bytes(words)),
        ))
    }

    pub fn write_registers_response(
        unit_id: UnitId,
        address: Address,
        count: Quantity,
    ) -> Result<Self> {
        check_range(address, count, MAX_WRITE_REGISTERS)?;
        Ok(Self::registers(
            unit_id,
            FunctionCode::WriteMultipleRegisters,
            address,
            count,
            None,
        ))
    }

    #[must_use]
    pub const fn mask_write_register_request(
        unit_id: UnitId,
        address: Address,
        and_mask: Word,
        or_mask: Word,
    ) -> Self {
        Self::new(
            unit_id,
            FunctionCode::MaskWriteRegister,
            Payload::MaskWrite(MaskWrite {
                address,
                and_mask,
                or_mask,
            }),
        )
    }

    /// The echo of a mask write register request.
    #[must_use]
    pub const fn mask_write_register_response(
        unit_id: UnitId,
        address: Address,
        and_mask: Word,
        or_mask: Word,
    ) -> Self {
        Self::mask_write_register_request(unit_id, address, and_mask, or_mask)
    }

    /// Write `words` starting at `write_address`, then read `read_count`
    /// registers starting at `read_address`.
    pub fn read_write_registers_request(
        unit_id: UnitId,
        read_address: Address,
        read_count: Quantity,
        write_address: Address,
        words: &[Word],
    ) -> Result<Self> {
        check_range(read_address, read_count, MAX_READ_REGISTERS)?;
        let write_count = check_len(words.len(), MAX_READ_WRITE_REGISTERS)?;
        check_range(write_address, write_count, MAX_READ_WRITE_REGISTERS)?;
        Ok(Self::new(
            unit_id,
            FunctionCode::ReadWriteMultipleRegisters,
            Payload::ReadWrite(ReadWriteRegisters {
                read_address,
                read_count,
                write_address: Some(write_address),
                data: words_to_bytes(words),
            }),
        ))
    }

    pub fn read_write_registers_response(unit_id: UnitId, words: &[Word]) -> Result<Self> {
        let read_count = check_len(words.len(), MAX_READ_REGISTERS)?;
        Ok(Self::new(
            unit_id,
            FunctionCode::ReadWriteMultipleRegisters,
            Payload::ReadWrite(ReadWriteRegisters {
                read_address: 0,
                read_count,
                write_address: None,
                data: words_to_bytes(words),
            }),
        ))
    }

    /// Read the FIFO queue whose count register is located at `address`.
    #[must_use]
    pub fn read_fifo_queue_request(unit_id: UnitId, address: Address) -> Self {
        Self::registers(unit_id, FunctionCode::ReadFifoQueue, address, 0, None)
    }

    pub fn read_fifo_queue_response(unit_id: UnitId, words: &[Word]) -> Result<Self> {
        if words.len() > MAX_FIFO_COUNT.into() {
            return Err(invalid_argument(format!(
                "FIFO count {} exceeds {MAX_FIFO_COUNT}",
                words.len()
            )));
        }
        Ok(Self::registers(
            unit_id,
            FunctionCode::ReadFifoQueue,
            0,
            u16_len(words.len()),
            Some(words_to_bytes(words)),
        ))
    }

    fn bits(
        unit_id: UnitId,
        function: FunctionCode,
        address: Address,
        count: Quantity,
        bits: Option<Vec<Coil>>,
    ) -> Self {
        Self::new(
            unit_id,
            function,
            Payload::Bits(BitBlock {
                address,
                count,
                bits,
            }),
        )
    }

    fn registers(
        unit_id: UnitId,
        function: FunctionCode,
        address: Address,
        count: Quantity,
        data: Option<Bytes>,
    ) -> Self {
        Self::new(
            unit_id,
            function,
            Payload::Registers(RegisterBlock {
                address,
                count,
                data,
            }),
        )
    }

    #[must_use]
    pub const fn unit_id(&self) -> UnitId {
        self.unit_id
    }

    #[must_use]
    pub const fn function(&self) -> FunctionCode {
        self.function
    }

    /// The exception of an exception response.
    #[must_use]
    pub const fn error(&self) -> Option<ExceptionCode> {
        match self.body {
            Ok(_) => None,
            Err(exception) => Some(exception),
        }
    }

    #[must_use]
    pub const fn is_exception(&self) -> bool {
        self.body.is_err()
    }

    #[must_use]
    pub const fn payload(&self) -> Option<&Payload> {
        match &self.body {
            Ok(payload) => Some(payload),
            Err(_) => None,
        }
    }

    /// Splits off the payload, exception responses yield their exception.
    pub fn into_payload(self) -> std::result::Result<Payload, ExceptionCode> {
        self.body
    }

    /// Bit values of a bits payload.
    #[must_use]
    pub fn bits_values(&self) -> Option<&[Coil]> {
        match self.payload()? {
            Payload::Bits(BitBlock {
                bits: Some(bits), ..
            }) => Some(bits),
            _ => None,
        }
    }

    /// Register values of a registers or read/write payload.
    #[must_use]
    pub fn words(&self) -> Option<Vec<Word>> {
        match self.payload()? {
            Payload::Registers(RegisterBlock {
                data: Some(data), ..
            }) => Some(bytes_to_words(data)),
            Payload::ReadWrite(read_write) => Some(read_write.words()),
            _ => None,
        }
    }

    /// CRC values if the message has been received over a serial line.
    #[must_use]
    pub const fn checksum(&self) -> Option<Checksum> {
        self.checksum
    }

    #[must_use]
    pub(crate) fn with_checksum(mut self, checksum: Checksum) -> Self {
        self.checksum = Some(checksum);
        self
    }

    /// Verify the integrity of a received message.
    ///
    /// Messages that have not been received over a serial line are always
    /// valid.
    ///
    /// # Errors
    ///
    /// [`ValidationError::CrcMismatch`] if the given and computed CRC differ.
    pub fn validate(&self) -> std::result::Result<(), ValidationError> {
        match self.checksum {
            Some(Checksum { given, computed }) if given != computed => {
                Err(ValidationError::CrcMismatch { given, computed })
            }
            _ => Ok(()),
        }
    }

    /// Fill in what a response does not carry on the wire from the
    /// matching `request`: start addresses and the exact number of bits.
    #[must_use]
    pub(crate) fn complete_with(mut self, request: &Self) -> Self {
        let (Ok(response), Some(request)) = (&mut self.body, request.payload()) else {
            return self;
        };
        match (self.function, response, request) {
            (
                FunctionCode::ReadCoils | FunctionCode::ReadDiscreteInputs,
                Payload::Bits(response),
                Payload::Bits(request),
            ) => {
                response.address = request.address;
                if let Some(bits) = &mut response.bits {
                    if bits.len() >= request.count.into() {
                        bits.truncate(request.count.into());
                        response.count = request.count;
                    }
                }
            }
            (
                FunctionCode::ReadHoldingRegisters
                | FunctionCode::ReadInputRegisters
                | FunctionCode::ReadFifoQueue,
                Payload::Registers(response),
                Payload::Registers(request),
            ) => {
                response.address = request.address;
            }
            (
                FunctionCode::ReadWriteMultipleRegisters,
                Payload::ReadWrite(response),
                Payload::ReadWrite(request),
            ) => {
                response.read_address = request.read_address;
            }
            _ => {}
        }
        self
    }
}

fn check_range(address: Address, count: Quantity, max_count: Quantity) -> Result<()> {
    if count == 0 || count > max_count {
        return Err(invalid_argument(format!(
            "count {count} out of range 1..={max_count}"
        )));
    }
    if u32::from(address) + u32::from(count) > 0x1_0000 {
        return Err(invalid_argument(format!(
            "address range 0x{address:04X} + {count} exceeds 0xFFFF"
        )));
    }
    Ok(())
}

fn check_len(len: usize, max_count: Quantity) -> Result<Quantity> {
    if len == 0 || len > max_count.into() {
        return Err(invalid_argument(format!(
            "{len} values out of range 1..={max_count}"
        )));
    }
    Ok(u16_len(len))
}

#[allow(clippy::cast_possible_truncation)]
pub(crate) fn u16_len(len: usize) -> u16 {
    // This type conversion should always be safe, because either
    // the caller is responsible to pass a valid usize or the
    // possible values are limited by the protocol.
    debug_assert!(len <= u16::MAX.into());
    len as u16
}

/// Big-endian register data.
#[must_use]
pub fn words_to_bytes(words: &[Word]) -> Bytes {
    let mut buf = BytesMut::with_capacity(words.len() * 2);
    for word in words {
        buf.put_u16(*word);
    }
    buf.freeze()
}

/// Register values of big-endian register data, a trailing odd byte is ignored.
#[must_use]
pub fn bytes_to_words(bytes: &[u8]) -> Vec<Word> {
    bytes
        .chunks_exact(2)
        .map(|chunk| u16::from_be_bytes([chunk[0], chunk[1]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn factories_reject_out_of_range_counts() {
        assert!(Message::read_holding_registers_request(1, 0, MAX_READ_REGISTERS).is_ok());
        assert!(matches!(
            Message::read_holding_registers_request(1, 0, MAX_READ_REGISTERS + 1),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            Message::read_coils_request(1, 0, 0),
            Err(Error::InvalidArgument(_))
        ));
        assert!(Message::read_coils_request(1, 0, MAX_READ_BITS).is_ok());
        assert!(Message::read_coils_request(1, 0, MAX_READ_BITS + 1).is_err());
        assert!(Message::write_registers_request(1, 0, &[0; 0x79]).is_ok());
        assert!(Message::write_registers_request(1, 0, &[0; 0x7A]).is_err());
        assert!(Message::write_registers_response(1, 0, 0x7A).is_err());
        assert!(Message::write_registers_request(1, 0, &[]).is_err());
        assert!(Message::write_coils_request(1, 0, &[true; 0x7B1]).is_err());
        assert!(Message::read_write_registers_request(1, 0, 1, 0, &[0; 0x79]).is_ok());
        assert!(Message::read_write_registers_request(1, 0, 1, 0, &[0; 0x7A]).is_err());
        assert!(Message::read_fifo_queue_response(1, &[0; 0x31]).is_ok());
        assert!(Message::read_fifo_queue_response(1, &[0; 0x32]).is_err());
    }

    #[test]
    fn factories_reject_address_overflow() {
        assert!(Message::read_input_registers_request(1, 0xFFFF, 1).is_ok());
        assert!(Message::read_input_registers_request(1, 0xFFFF, 2).is_err());
        assert!(Message::write_coils_request(1, 0xFFFE, &[true, false]).is_ok());
        assert!(Message::write_coils_request(1, 0xFFFE, &[true, false, true]).is_err());
    }

    #[test]
    fn custom_function_must_not_be_flagged() {
        assert!(Message::custom(1, 0x41, vec![1, 2]).is_ok());
        assert!(matches!(
            Message::custom(1, 0xC1, vec![]),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn custom_function_must_fit_into_a_pdu() {
        assert!(Message::custom(1, 0x41, vec![0; MAX_PDU_SIZE - 1]).is_ok());
        assert!(matches!(
            Message::custom(1, 0x41, vec![0; MAX_PDU_SIZE]),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn read_bits_responses_are_padded_to_whole_bytes() {
        let msg = Message::read_coils_response(1, &[true, false, true]).unwrap();
        assert_eq!(
            msg.payload(),
            Some(&Payload::Bits(BitBlock {
                address: 0,
                count: 8,
                bits: Some(vec![true, false, true, false, false, false, false, false]),
            }))
        );
        let msg = Message::read_discrete_inputs_response(1, &[true; 16]).unwrap();
        assert_eq!(msg.bits_values().map(<[Coil]>::len), Some(16));
        assert!(Message::read_coils_response(1, &vec![true; MAX_READ_BITS.into()]).is_ok());
    }

    #[test]
    fn exception_message_has_no_payload() {
        let msg = Message::exception(
            3,
            FunctionCode::ReadCoils,
            ExceptionCode::IllegalDataAddress,
        );
        assert!(msg.is_exception());
        assert_eq!(msg.error(), Some(ExceptionCode::IllegalDataAddress));
        assert!(msg.payload().is_none());

        let msg = Message::write_register_request(3, 1, 2);
        assert!(!msg.is_exception());
        assert!(msg.error().is_none());
        assert!(msg.payload().is_some());
    }

    #[test]
    fn register_data_is_big_endian() {
        let msg = Message::read_holding_registers_response(1, &[0x0102, 0xA0B0]).unwrap();
        let Some(Payload::Registers(block)) = msg.payload() else {
            panic!("unexpected payload");
        };
        assert_eq!(block.count, 2);
        assert_eq!(block.data.as_deref(), Some(&[0x01, 0x02, 0xA0, 0xB0][..]));
        assert_eq!(msg.words(), Some(vec![0x0102, 0xA0B0]));
    }

    #[test]
    fn mask_write_apply() {
        let mask = MaskWrite {
            address: 4,
            and_mask: 0x00F2,
            or_mask: 0x0025,
        };
        assert_eq!(mask.apply(0x0012), 0x0017);
    }

    #[test]
    fn read_write_direction() {
        let req = Message::read_write_registers_request(1, 0, 2, 10, &[7]).unwrap();
        let rsp = Message::read_write_registers_response(1, &[1, 2]).unwrap();
        let (Some(Payload::ReadWrite(req)), Some(Payload::ReadWrite(rsp))) =
            (req.payload(), rsp.payload())
        else {
            panic!("unexpected payload");
        };
        assert_eq!(req.direction(), Direction::Request);
        assert_eq!(rsp.direction(), Direction::Response);
    }

    #[test]
    fn complete_response_from_request() {
        let request = Message::read_coils_request(1, 0x20, 3).unwrap();
        let response =
            Message::read_coils_response(1, &[true, false, true, true, false, false, false, false])
                .unwrap()
                .complete_with(&request);
        assert_eq!(
            response.payload(),
            Some(&Payload::Bits(BitBlock {
                address: 0x20,
                count: 3,
                bits: Some(vec![true, false, true]),
            }))
        );

        let request = Message::read_input_registers_request(1, 0x99, 2).unwrap();
        let response = Message::read_input_registers_response(1, &[4, 5])
            .unwrap()
            .complete_with(&request);
        let Some(Payload::Registers(block)) = response.payload() else {
            panic!("unexpected payload");
        };
        assert_eq!(block.address, 0x99);
    }

    #[test]
    fn validate_checksum() {
        let msg = Message::write_coil_request(1, 0x13, true);
        assert!(msg.validate().is_ok());

        let msg = msg.with_checksum(Checksum {
            given: 0x1234,
            computed: 0x1234,
        });
        assert!(msg.validate().is_ok());

        let msg = msg.with_checksum(Checksum {
            given: 0x1234,
            computed: 0x4321,
        });
        assert_eq!(
            msg.validate(),
            Err(ValidationError::CrcMismatch {
                given: 0x1234,
                computed: 0x4321
            })
        );
    }
}
