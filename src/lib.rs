#![cfg_attr(docsrs, feature(doc_cfg))]
//! # mksservo_lib
//!
//! This crate drives MKS stepper servo controllers over RS485 using Modbus RTU
//! framing. Requests are framed by hand, every response is checked for
//! length, CRC16 and header before any register value is trusted.
//!
//! The codec never owns the serial port. A [`client::Servo`] borrows a
//! [`transport::Transport`] for each call, so several links or devices can be
//! driven from one process.
//!
//! ## Features
//!
//! - `default`: Enables `bin-dependencies`, which is intended for compiling the `mksservo` command-line tool and pulls in `serialport` and `serde`.
//!
//! ### Transport Features
//! - `serialport`: Enables the **synchronous** serial transport using the `serialport` crate.
//!
//! ### Utility Features
//! - `serde`: Enables `serde` support for serializing/deserializing data structures.
//! - `bin-dependencies`: Enables all features required by the `mksservo` binary executable.

/// CRC-16/MODBUS checksum.
pub mod crc;
/// Contains error types for the library.
mod error;
/// Request/response orchestration.
pub mod client;
/// Frame encoding and response validation.
pub mod protocol;
/// Byte pipe abstraction the codec runs on.
pub mod transport;

pub use error::{Error, Result};

/// Synchronous serial transport.
#[cfg_attr(docsrs, doc(cfg(feature = "serialport")))]
#[cfg(feature = "serialport")]
pub mod serialport;
