//! # StringEEPROM Core Library
//!
//! Client-side engine for talking to StringEEPROM-based devices over a
//! serial link.
//!
//! This library provides:
//! - Serial port discovery and line-oriented transport
//! - Encoding/decoding of the StringEEPROM text protocol
//! - An in-memory mirror of the device's string table
//! - A session engine driving the connection state machine and a
//!   background poll worker
//!
//! The engine performs no file or terminal I/O; presentation front ends
//! subscribe to [`protocol::SessionEvent`]s and invoke engine operations
//! in response to user actions.
//!
//! ## Example
//!
//! ```rust,ignore
//! use stringeeprom_core::protocol::{SessionConfig, SessionEngine};
//!
//! let (mut engine, events) = SessionEngine::new();
//! engine.connect(SessionConfig::for_port("/dev/ttyACM0"))?;
//!
//! // Device replies arrive asynchronously as events
//! for event in events {
//!     println!("{:?}", event);
//! }
//! ```

#![warn(missing_docs)]

pub mod protocol;
pub mod table;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::protocol::{
        ChangeReason, ConnectionState, DeviceReply, LinkError, PortInfo, SessionConfig,
        SessionEngine, SessionError, SessionEvent,
    };
    pub use crate::table::{Entry, EntryTable, TableError};
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
