//! Async control client for Esparrier devices.
//!
//! A [`Session`] runs the control protocol over any [`Transport`], one
//! operation at a time:
//!
//! ```no_run
//! use esparrier_client::{Session, TcpBridgeTransport};
//!
//! # async fn demo() -> esparrier_client::ClientResult<()> {
//! let transport = TcpBridgeTransport::connect("127.0.0.1:7777").await?;
//! let session = Session::new(transport);
//! let status = session.get_status().await?;
//! println!("{} running {}", status.model, status.version);
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod config;
mod error;
mod session;
mod transfer;
pub mod transport;

pub use config::{AppConfig, Secret};
pub use error::*;
pub use session::*;
pub use transfer::*;
pub use transport::{TcpBridgeTransport, Transport, TransportError};

pub use esparrier_protocol as protocol;
