//! Serial protocol communication
//!
//! Implements the StringEEPROM line protocol: newline-terminated text
//! commands from the client, structured reply lines from the device.

pub mod codec;
mod error;
pub mod serial;
mod session;
pub mod transport;

pub use codec::DeviceReply;
pub use error::{DecodeError, LinkError, SessionError};
pub use serial::{clear_buffers, configure_port, list_ports, open_port, PortInfo};
pub use session::{
    ChangeReason, ConnectionState, SessionConfig, SessionEngine, SessionEvent,
};
pub use transport::{LineTransport, LinkChannel};

/// Default baud rate for device communication
pub const DEFAULT_BAUD_RATE: u32 = 115200;

/// Baud rates the device firmware is known to run at
pub const SUPPORTED_BAUD_RATES: [u32; 5] = [9600, 19200, 38400, 57600, 115200];

/// Read timeout for the poll loop, in milliseconds.
///
/// Also bounds how long a disconnect request can wait for the poll worker
/// to notice cancellation.
pub const READ_TIMEOUT_MS: u64 = 100;

/// Longest line the device firmware can produce (input buffer size plus
/// the fixed reply prefixes)
pub const MAX_LINE_LEN: usize = 256;
