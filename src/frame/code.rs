// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Function, exception and block type code tables.

use std::{
    error,
    fmt::{self, Display},
};

use crate::error::ProtocolError;

/// Bit that flags an exception response in the function code byte.
pub const EXCEPTION_FLAG: u8 = 0x80;

/// The kind of register block a function operates on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockType {
    /// Single-bit read/write registers.
    Coil,
    /// Single-bit read-only registers.
    Discrete,
    /// 16-bit read/write registers.
    Holding,
    /// 16-bit read-only registers.
    Input,
    /// Device diagnostics and identification.
    Diagnostic,
}

impl BlockType {
    /// Width of a single register in bits.
    #[must_use]
    pub const fn bit_width(self) -> u8 {
        match self {
            Self::Coil | Self::Discrete => 1,
            Self::Holding | Self::Input | Self::Diagnostic => 16,
        }
    }

    #[must_use]
    pub const fn is_read_only(self) -> bool {
        match self {
            Self::Coil | Self::Holding => false,
            Self::Discrete | Self::Input | Self::Diagnostic => true,
        }
    }
}

/// Static metadata of a known function code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FunctionInfo {
    pub code: u8,
    pub name: &'static str,
    pub block_type: Option<BlockType>,
    pub is_read: bool,
    /// Code of the read counterpart of a write function or vice versa.
    pub opposite: Option<u8>,
}

const fn info(
    code: u8,
    name: &'static str,
    block_type: Option<BlockType>,
    is_read: bool,
    opposite: Option<u8>,
) -> FunctionInfo {
    FunctionInfo {
        code,
        name,
        block_type,
        is_read,
        opposite,
    }
}

/// All function codes as defined by the protocol specification V1.1b3.
///
/// Following the opposite reference twice does not necessarily lead back
/// to the starting function, e.g. Write Single Coil -> Read Coils ->
/// Write Multiple Coils.
pub static FUNCTION_TABLE: [FunctionInfo; 19] = [
    info(0x01, "Read Coils", Some(BlockType::Coil), true, Some(0x0F)),
    info(0x02, "Read Discrete Inputs", Some(BlockType::Discrete), true, None),
    info(0x03, "Read Holding Registers", Some(BlockType::Holding), true, Some(0x10)),
    info(0x04, "Read Input Registers", Some(BlockType::Input), true, None),
    info(0x05, "Write Single Coil", Some(BlockType::Coil), false, Some(0x01)),
    info(0x06, "Write Single Register", Some(BlockType::Holding), false, Some(0x03)),
    info(0x07, "Read Exception Status", Some(BlockType::Diagnostic), true, None),
    info(0x08, "Diagnostics", Some(BlockType::Diagnostic), true, None),
    info(0x0B, "Get Comm Event Counter", Some(BlockType::Diagnostic), true, None),
    info(0x0C, "Get Comm Event Log", Some(BlockType::Diagnostic), true, None),
    info(0x0F, "Write Multiple Coils", Some(BlockType::Coil), false, Some(0x01)),
    info(0x10, "Write Multiple Registers", Some(BlockType::Holding), false, Some(0x03)),
    info(0x11, "Report Server ID", Some(BlockType::Diagnostic), true, None),
    info(0x14, "Read File Record", None, true, Some(0x15)),
    info(0x15, "Write File Record", None, false, Some(0x14)),
    info(0x16, "Mask Write Register", Some(BlockType::Holding), false, Some(0x03)),
    info(0x17, "Read/Write Multiple Registers", Some(BlockType::Holding), false, None),
    info(0x18, "Read FIFO Queue", Some(BlockType::Holding), true, None),
    info(0x2B, "Encapsulated Interface Transport", Some(BlockType::Diagnostic), true, None),
];

fn function_info(code: u8) -> Option<&'static FunctionInfo> {
    FUNCTION_TABLE.iter().find(|info| info.code == code)
}

/// A Modbus function code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FunctionCode {
    /// 01 (0x01) Read Coils.
    ReadCoils,

    /// 02 (0x02) Read Discrete Inputs
    ReadDiscreteInputs,

    /// 03 (0x03) Read Holding Registers
    ReadHoldingRegisters,

    /// 04 (0x04) Read Input Registers
    ReadInputRegisters,

    /// 05 (0x05) Write Single Coil
    WriteSingleCoil,

    /// 06 (0x06) Write Single Register
    WriteSingleRegister,

    /// 07 (0x07) Read Exception Status (Serial Line only)
    ReadExceptionStatus,

    /// 08 (0x08) Diagnostics (Serial Line only)
    Diagnostics,

    /// 11 (0x0B) Get Comm Event Counter (Serial Line only)
    GetCommEventCounter,

    /// 12 (0x0C) Get Comm Event Log (Serial Line only)
    GetCommEventLog,

    /// 15 (0x0F) Write Multiple Coils
    WriteMultipleCoils,

    /// 16 (0x10) Write Multiple Registers
    WriteMultipleRegisters,

    /// 17 (0x11) Report Server ID (Serial Line only)
    ReportServerId,

    /// 20 (0x14) Read File Record
    ReadFileRecord,

    /// 21 (0x15) Write File Record
    WriteFileRecord,

    /// 22 (0x16) Mask Write Register
    MaskWriteRegister,

    /// 23 (0x17) Read/Write Multiple Registers
    ReadWriteMultipleRegisters,

    /// 24 (0x18) Read FIFO Queue
    ReadFifoQueue,

    /// 43 (0x2B) Encapsulated Interface Transport
    EncapsulatedInterfaceTransport,

    /// User defined function code without metadata.
    Custom(u8),
}

impl FunctionCode {
    /// Create a new [`FunctionCode`] with `value`.
    ///
    /// The exception flag is masked off before the lookup.
    #[must_use]
    pub const fn new(value: u8) -> Self {
        match value & !EXCEPTION_FLAG {
            0x01 => Self::ReadCoils,
            0x02 => Self::ReadDiscreteInputs,
            0x03 => Self::ReadHoldingRegisters,
            0x04 => Self::ReadInputRegisters,
            0x05 => Self::WriteSingleCoil,
            0x06 => Self::WriteSingleRegister,
            0x07 => Self::ReadExceptionStatus,
            0x08 => Self::Diagnostics,
            0x0B => Self::GetCommEventCounter,
            0x0C => Self::GetCommEventLog,
            0x0F => Self::WriteMultipleCoils,
            0x10 => Self::WriteMultipleRegisters,
            0x11 => Self::ReportServerId,
            0x14 => Self::ReadFileRecord,
            0x15 => Self::WriteFileRecord,
            0x16 => Self::MaskWriteRegister,
            0x17 => Self::ReadWriteMultipleRegisters,
            0x18 => Self::ReadFifoQueue,
            0x2B => Self::EncapsulatedInterfaceTransport,
            code => Self::Custom(code),
        }
    }

    /// Gets the [`u8`] value of the current [`FunctionCode`].
    #[must_use]
    pub const fn value(self) -> u8 {
        match self {
            Self::ReadCoils => 0x01,
            Self::ReadDiscreteInputs => 0x02,
            Self::ReadHoldingRegisters => 0x03,
            Self::ReadInputRegisters => 0x04,
            Self::WriteSingleCoil => 0x05,
            Self::WriteSingleRegister => 0x06,
            Self::ReadExceptionStatus => 0x07,
            Self::Diagnostics => 0x08,
            Self::GetCommEventCounter => 0x0B,
            Self::GetCommEventLog => 0x0C,
            Self::WriteMultipleCoils => 0x0F,
            Self::WriteMultipleRegisters => 0x10,
            Self::ReportServerId => 0x11,
            Self::ReadFileRecord => 0x14,
            Self::WriteFileRecord => 0x15,
            Self::MaskWriteRegister => 0x16,
            Self::ReadWriteMultipleRegisters => 0x17,
            Self::ReadFifoQueue => 0x18,
            Self::EncapsulatedInterfaceTransport => 0x2B,
            Self::Custom(code) => code,
        }
    }

    /// Table entry of a known function, `None` for custom functions.
    #[must_use]
    pub fn info(self) -> Option<&'static FunctionInfo> {
        match self {
            Self::Custom(_) => None,
            known => function_info(known.value()),
        }
    }

    #[must_use]
    pub const fn is_custom(self) -> bool {
        matches!(self, Self::Custom(_))
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        self.info().map_or("Custom", |info| info.name)
    }

    #[must_use]
    pub fn block_type(self) -> Option<BlockType> {
        self.info().and_then(|info| info.block_type)
    }

    /// Custom functions are not considered reading.
    #[must_use]
    pub fn is_read(self) -> bool {
        self.info().is_some_and(|info| info.is_read)
    }

    /// The read analog of a write function and vice versa.
    #[must_use]
    pub fn opposite(self) -> Option<Self> {
        self.info()
            .and_then(|info| info.opposite)
            .map(FunctionCode::new)
    }
}

impl Display for FunctionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.value().fmt(f)
    }
}

impl From<u8> for FunctionCode {
    fn from(from: u8) -> Self {
        Self::new(from)
    }
}

impl From<FunctionCode> for u8 {
    fn from(from: FunctionCode) -> Self {
        from.value()
    }
}

/// Look up a function code, falling back to [`FunctionCode::Custom`].
#[must_use]
pub const fn function_for(code: u8) -> FunctionCode {
    FunctionCode::new(code)
}

/// Look up a known function code.
///
/// # Errors
///
/// Fails with [`ProtocolError::UnknownFunction`] if `code` is not part of the
/// function table.
pub fn require_function_for(code: u8) -> Result<FunctionCode, ProtocolError> {
    match FunctionCode::new(code) {
        FunctionCode::Custom(code) => Err(ProtocolError::UnknownFunction(code)),
        known => Ok(known),
    }
}

/// The block type associated with function `code`, if any.
#[must_use]
pub fn block_type_for(code: u8) -> Option<BlockType> {
    FunctionCode::new(code).block_type()
}

/// A server (slave) exception.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExceptionCode {
    /// 0x01
    IllegalFunction,
    /// 0x02
    IllegalDataAddress,
    /// 0x03
    IllegalDataValue,
    /// 0x04
    ServerDeviceFailure,
    /// 0x05
    Acknowledge,
    /// 0x06
    ServerDeviceBusy,
    /// 0x08
    MemoryParityError,
    /// 0x0A
    GatewayPathUnavailable,
    /// 0x0B
    GatewayTargetDevice,
    /// None of the above.
    ///
    /// Although encoding one of the predefined values as this is possible, it is not recommended.
    /// Instead, prefer to use [`Self::new()`] to prevent such ambiguities.
    Custom(u8),
}

impl From<ExceptionCode> for u8 {
    fn from(from: ExceptionCode) -> Self {
        from.value()
    }
}

impl From<u8> for ExceptionCode {
    fn from(from: u8) -> Self {
        Self::new(from)
    }
}

impl ExceptionCode {
    /// Create a new [`ExceptionCode`] with `value`.
    #[must_use]
    pub const fn new(value: u8) -> Self {
        use ExceptionCode::*;

        match value {
            0x01 => IllegalFunction,
            0x02 => IllegalDataAddress,
            0x03 => IllegalDataValue,
            0x04 => ServerDeviceFailure,
            0x05 => Acknowledge,
            0x06 => ServerDeviceBusy,
            0x08 => MemoryParityError,
            0x0A => GatewayPathUnavailable,
            0x0B => GatewayTargetDevice,
            other => Custom(other),
        }
    }

    #[must_use]
    pub const fn value(self) -> u8 {
        use ExceptionCode::*;

        match self {
            IllegalFunction => 0x01,
            IllegalDataAddress => 0x02,
            IllegalDataValue => 0x03,
            ServerDeviceFailure => 0x04,
            Acknowledge => 0x05,
            ServerDeviceBusy => 0x06,
            MemoryParityError => 0x08,
            GatewayPathUnavailable => 0x0A,
            GatewayTargetDevice => 0x0B,
            Custom(code) => code,
        }
    }

    pub(crate) fn description(&self) -> &str {
        use ExceptionCode::*;

        match *self {
            IllegalFunction => "Illegal function",
            IllegalDataAddress => "Illegal data address",
            IllegalDataValue => "Illegal data value",
            ServerDeviceFailure => "Server device failure",
            Acknowledge => "Acknowledge",
            ServerDeviceBusy => "Server device busy",
            MemoryParityError => "Memory parity error",
            GatewayPathUnavailable => "Gateway path unavailable",
            GatewayTargetDevice => "Gateway target device failed to respond",
            Custom(_) => "Custom",
        }
    }
}

/// Look up an exception code, falling back to [`ExceptionCode::Custom`].
#[must_use]
pub const fn error_for(code: u8) -> ExceptionCode {
    ExceptionCode::new(code)
}

/// Look up a known exception code.
///
/// # Errors
///
/// Fails with [`ProtocolError::UnknownException`] for codes outside the
/// predefined set.
pub fn require_error_for(code: u8) -> Result<ExceptionCode, ProtocolError> {
    match ExceptionCode::new(code) {
        ExceptionCode::Custom(code) => Err(ProtocolError::UnknownException(code)),
        known => Ok(known),
    }
}

impl fmt::Display for ExceptionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

impl error::Error for ExceptionCode {
    fn description(&self) -> &str {
        self.description()
    }
}
