// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! A [Modbus](https://en.wikipedia.org/wiki/Modbus) protocol engine
//! based on [tokio](https://tokio.rs).
//!
//! The engine models Modbus messages, encodes and decodes them for the
//! RTU (unit id + CRC-16) and TCP (MBAP header) envelopes, finds frame
//! boundaries in a byte stream and runs an asynchronous client that
//! correlates responses with their requests.
//!
//! The device is called *server* and the caller *client* in this library.
//!
//! ## Installation
//!
//! Add this to your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! modbus-engine = "*"
//! ```
//!
//! If you like to use Modbus TCP only:
//!
//! ```toml
//! [dependencies]
//! modbus-engine = { version = "*", default-features = false, features = ["tcp"] }
//! ```
//!
//! # Examples
//!
//! ## TCP client
//!
//! ```rust,no_run
//! use modbus_engine::prelude::*;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
//!     let socket_addr = "192.168.0.222:502".parse()?;
//!     let client = tcp::connect(socket_addr).await?;
//!     let words = client.read_holding_registers(1, 0x1000, 7).await??;
//!     println!("Response is '{words:?}'");
//!     client.stop().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Frames without a client
//!
//! ```rust
//! use modbus_engine::{codec::rtu::encode_message, Message};
//!
//! let request = Message::write_coil_request(1, 0x13, true);
//! let mut buf = modbus_engine::bytes::BytesMut::new();
//! encode_message(&request, &mut buf).unwrap();
//! assert_eq!(&buf[..], &[0x01, 0x05, 0x00, 0x13, 0xFF, 0x00, 0x7D, 0xFF]);
//! ```

// Re-export the `bytes` crate
//
// Allows to avoid version conflicts.
pub use bytes;

pub mod client;
pub mod codec;
pub mod error;
pub mod frame;
pub mod prelude;

pub use self::{
    error::{Error, ProtocolError, Result, ValidationError},
    frame::{
        Address, BlockType, Checksum, Coil, Direction, ExceptionCode, FunctionCode, Message,
        Payload, Quantity, UnitId, Word,
    },
};
