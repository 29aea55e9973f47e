// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types.

use std::{io, time::Duration};

use thiserror::Error;

use crate::frame::FunctionCode;

/// _Modbus_ protocol error.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The function code is not part of the function table.
    #[error("unknown function code: 0x{0:02X}")]
    UnknownFunction(u8),

    /// The exception code is not one of the predefined codes.
    #[error("unknown exception code: 0x{0:02X}")]
    UnknownException(u8),

    /// The function codes of request and response do not match.
    #[error("function code mismatch: expected/request = {request}, actual/response = {response}")]
    FunctionMismatch {
        request: FunctionCode,
        response: FunctionCode,
    },

    /// Malformed frame content.
    #[error("invalid data: {0}")]
    InvalidData(String),
}

/// Integrity check failure of a decoded frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("CRC mismatch: given = 0x{given:04X}, computed = 0x{computed:04X}")]
    CrcMismatch { given: u16, computed: u16 },
}

/// _Modbus_ engine error.
#[derive(Debug, Error)]
pub enum Error {
    /// Connection refused/reset or any other I/O failure of the byte stream.
    #[error(transparent)]
    Transport(#[from] io::Error),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A message could not be built from the given arguments.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// No response arrived within the configured time to live.
    #[error("no response within {0:?}")]
    Timeout(Duration),

    #[error("request cancelled")]
    Cancelled,

    /// The client is stopped or reconnecting and does not queue requests.
    #[error("not connected")]
    NotConnected,

    /// The connection dropped while the request was in flight.
    #[error("connection lost")]
    ConnectionLost,
}

/// Specialized [`std::result::Result`] type for the engine.
pub type Result<T> = std::result::Result<T, Error>;

pub(crate) fn invalid_argument(message: impl Into<String>) -> Error {
    Error::InvalidArgument(message.into())
}

pub(crate) fn invalid_data(message: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message.into())
}
