//! Sensor link abstraction.
//!
//! Provides a unified byte source over the ways a pressure board can reach
//! the host:
//! - Serial ports (USB CDC / UART bridges) via `serialport`
//! - Capture files replayed in paced chunks
//! - In-memory scripted links for tests and demos
//!
//! This is the lowest layer of walkmat. Everything else reads from the
//! [`SensorStream`] type provided here, obtained through a [`PortOpener`].

pub mod error;
pub mod memory;
pub mod replay;
pub mod serial;
pub mod traits;

pub use error::{Result, TransportError};
pub use memory::MemoryOpener;
pub use replay::ReplayOpener;
pub use serial::{list_ports, PortInfo, SerialOpener};
pub use traits::{LinkSettings, PortOpener, SensorStream, DEFAULT_BAUD_RATE};
