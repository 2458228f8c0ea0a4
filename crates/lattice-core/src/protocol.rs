//! Wire protocol frames for the downlink and uplink channels.
//!
//! The protocol is a symmetric correlation-id scheme: every request frame
//! carries an `id` minted by the caller, and the matching response carries the
//! same `id` back. Frames are self-describing (`kind`-tagged) so a single
//! dispatcher per channel can route by message kind.
//!
//! | Direction | Kinds |
//! |-----------|-------|
//! | host → worker | `CALL`, `TEARDOWN` |
//! | worker → host | `RESPONSE`, `ERROR`, `TEARDOWN_COMPLETE`, `WORKER_READY` |
//! | worker → host (uplink) | `UPLINK_CALL` |
//! | host → worker (uplink) | `UPLINK_RESPONSE`, `UPLINK_ERROR` |
//!
//! Unknown kinds deserialize to [`Frame::Unknown`] and are ignored by every
//! dispatcher, so the protocol stays open to additive message kinds.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Correlation id matching a response to its request within one channel.
pub type CallId = u64;

// =============================================================================
// WireError
// =============================================================================

/// Serialized form of an error crossing a channel.
///
/// Receivers reconstruct a local error preserving all three fields. The shape
/// is open: additive fields on the wire are ignored on decode, and `stack` is
/// omitted from the encoding when absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireError {
    /// Error class name, e.g. `UnknownMethod`.
    pub name: String,
    /// Human-readable message.
    pub message: String,
    /// Remote stack trace, when the origin had one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

impl WireError {
    /// Creates a wire error without a stack trace.
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            stack: None,
        }
    }

    /// Attaches a stack trace.
    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }
}

impl std::fmt::Display for WireError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.name, self.message)
    }
}

// =============================================================================
// Frame
// =============================================================================

/// One message on a duplex channel.
///
/// Field names on the wire are fixed protocol surface: `id`, `method`,
/// `args`, `result`, `error`, `instanceId`, `serviceName`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Frame {
    /// Host → worker method call.
    #[serde(rename = "CALL")]
    Call {
        /// Correlation id.
        id: CallId,
        /// Method name on the worker's service.
        method: String,
        /// Positional arguments.
        args: Vec<Value>,
    },

    /// Successful reply to a `CALL`.
    #[serde(rename = "RESPONSE")]
    Response {
        /// Correlation id of the originating call.
        id: CallId,
        /// The method's return value.
        result: Value,
    },

    /// Failed reply to a `CALL`.
    #[serde(rename = "ERROR")]
    Error {
        /// Correlation id of the originating call.
        id: CallId,
        /// The reconstructed remote error.
        error: WireError,
    },

    /// Host → worker cooperative shutdown request.
    #[serde(rename = "TEARDOWN")]
    Teardown {
        /// Correlation id.
        id: CallId,
    },

    /// Worker acknowledgement of `TEARDOWN`.
    #[serde(rename = "TEARDOWN_COMPLETE")]
    TeardownComplete {
        /// Correlation id of the teardown request.
        id: CallId,
        /// Error from the user teardown hook, if it failed.
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<WireError>,
    },

    /// Unsolicited worker → host signal sent once setup has completed and
    /// the downlink server is installed.
    #[serde(rename = "WORKER_READY")]
    WorkerReady {
        /// The instance the worker hosts.
        #[serde(rename = "instanceId")]
        instance_id: String,
    },

    /// Worker → host dependency call.
    ///
    /// `serviceName` is a *requirement name* from the owning instance's
    /// wiring, not a global service id; the uplink server resolves it.
    #[serde(rename = "UPLINK_CALL")]
    UplinkCall {
        /// Correlation id (independent of the downlink id space).
        id: CallId,
        /// Requirement name to resolve through the wiring.
        #[serde(rename = "serviceName")]
        service_name: String,
        /// Method name on the resolved service.
        method: String,
        /// Positional arguments.
        args: Vec<Value>,
    },

    /// Successful reply to an `UPLINK_CALL`.
    #[serde(rename = "UPLINK_RESPONSE")]
    UplinkResponse {
        /// Correlation id of the originating call.
        id: CallId,
        /// The method's return value.
        result: Value,
    },

    /// Failed reply to an `UPLINK_CALL`.
    #[serde(rename = "UPLINK_ERROR")]
    UplinkError {
        /// Correlation id of the originating call.
        id: CallId,
        /// The reconstructed remote error.
        error: WireError,
    },

    /// Any message kind this version does not know. Ignored on receipt.
    #[serde(other)]
    Unknown,
}
