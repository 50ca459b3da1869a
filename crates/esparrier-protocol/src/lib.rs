//! Esparrier Control Protocol
//!
//! This crate provides types and utilities for talking to Esparrier devices
//! over their vendor-specific bulk interface. It performs no I/O: it turns
//! commands into frames and frames into typed responses.
//!
//! # Protocol Overview
//!
//! Every exchange is a sequence of frames of at most 64 bytes:
//!
//! - **Commands** (host → device): Start with a `CMD_*` byte, optionally
//!   followed by a small fixed header.
//! - **Responses** (device → host): Start with a `RESP_*` byte.
//! - **Blocks**: Raw 64-byte chunks of a config document or firmware image,
//!   sent after a `WriteConfig`/`OtaData` command or after a config header.
//!
//! There are no request ids: exactly one operation may be in flight.
//!
//! # Example
//!
//! ```rust
//! use esparrier_protocol::{Command, Response};
//!
//! let frame = Command::GetState.encode();
//! assert_eq!(frame, b"s");
//!
//! let response = Response::decode(&[b'e', b'i']).unwrap();
//! assert!(matches!(response, Response::Error(_)));
//! ```

mod blocks;
mod commands;
mod constants;
mod error;
mod ota;
mod responses;
mod types;

pub use blocks::*;
pub use commands::*;
pub use constants::*;
pub use error::*;
pub use ota::*;
pub use responses::*;
pub use types::*;
