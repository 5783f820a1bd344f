//! dbmig host protocol.
//!
//! An engine host is a separate process wrapping one build of an embedded
//! database engine. dbmig talks to it over the host's stdin/stdout using
//! newline-delimited JSON: one request object per line, answered by exactly
//! one response object per line.
//!
//! # Modules
//!
//! - [`message`] - Request and response types
//! - [`framing`] - Line framing and size limits
//! - [`handshake`] - Protocol negotiation helpers
//! - [`error`] - Protocol error types
//!
//! # Example exchange
//!
//! ```text
//! > {"op":"hello","protocol_version":1}
//! < {"status":"ok","build_id":196,"protocol_version":1}
//! > {"op":"connect","url":"jdbc:h2:./data/app-migration;ACCESS_MODE_DATA=r","properties":{"user":"sa"}}
//! < {"status":"ok"}
//! > {"op":"execute","sql":"SCRIPT TO './data/app.script.sql'"}
//! < {"status":"ok","update_count":0}
//! > {"op":"shutdown"}
//! < {"status":"ok"}
//! ```

pub mod error;
pub mod framing;
pub mod handshake;
pub mod message;

pub use error::Error;

pub use framing::{read_message, write_message, MAX_LINE_LENGTH};
pub use handshake::{accept_hello, is_version_compatible, negotiate_version, HostInfo};
pub use message::{Request, Response, Status};

/// Protocol version for wire compatibility.
///
/// Sent in the `hello` request and echoed by the host. Hosts that omit it in
/// their reply are assumed to speak version 1.
pub const PROTOCOL_VERSION: u32 = 1;
