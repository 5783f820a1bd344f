//! Request and response message types.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A request from dbmig to an engine host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    /// Open the session and ask the host which engine build it wraps.
    Hello {
        /// Protocol version the caller speaks.
        protocol_version: u32,
    },
    /// Open a connection with the engine's own URL and property contract.
    Connect {
        /// Engine connection URL.
        url: String,
        /// Connection properties (`user`, `password`, ...).
        #[serde(default)]
        properties: BTreeMap<String, String>,
    },
    /// Execute one statement on the open connection.
    Execute {
        /// Statement text.
        sql: String,
    },
    /// Close the open connection.
    Close,
    /// Tear the engine down and exit.
    Shutdown,
}

impl Request {
    /// Create a hello request for the current protocol version.
    pub fn hello() -> Self {
        Request::Hello {
            protocol_version: crate::PROTOCOL_VERSION,
        }
    }

    /// Create a connect request.
    pub fn connect(url: impl Into<String>, properties: BTreeMap<String, String>) -> Self {
        Request::Connect {
            url: url.into(),
            properties,
        }
    }

    /// Create an execute request.
    pub fn execute(sql: impl Into<String>) -> Self {
        Request::Execute { sql: sql.into() }
    }

    /// The operation name as it appears on the wire.
    pub fn op(&self) -> &'static str {
        match self {
            Request::Hello { .. } => "hello",
            Request::Connect { .. } => "connect",
            Request::Execute { .. } => "execute",
            Request::Close => "close",
            Request::Shutdown => "shutdown",
        }
    }
}

/// Response status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// Request succeeded.
    Ok,
    /// Request failed; see `message`.
    Error,
}

/// A response from an engine host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    /// Response status.
    pub status: Status,
    /// Engine build id, answered to `hello`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_id: Option<u32>,
    /// Protocol version the host speaks, answered to `hello`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol_version: Option<u32>,
    /// Rows affected, answered to `execute`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_count: Option<u64>,
    /// Error description when `status` is `error`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Response {
    /// Create a bare success response.
    pub fn ok() -> Self {
        Self {
            status: Status::Ok,
            build_id: None,
            protocol_version: None,
            update_count: None,
            message: None,
        }
    }

    /// Create an error response.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: Status::Error,
            message: Some(message.into()),
            ..Self::ok()
        }
    }

    /// Create the answer to a `hello` request.
    pub fn hello(build_id: u32) -> Self {
        Self {
            build_id: Some(build_id),
            protocol_version: Some(crate::PROTOCOL_VERSION),
            ..Self::ok()
        }
    }

    /// Create the answer to an `execute` request.
    pub fn updated(update_count: u64) -> Self {
        Self {
            update_count: Some(update_count),
            ..Self::ok()
        }
    }

    /// Check if this is a success response.
    pub fn is_ok(&self) -> bool {
        self.status == Status::Ok
    }

    /// Convert an error response into its message.
    pub fn into_result(self) -> Result<Self, String> {
        match self.status {
            Status::Ok => Ok(self),
            Status::Error => Err(self
                .message
                .unwrap_or_else(|| "unspecified host error".to_string())),
        }
    }
}
