use std::string::FromUtf8Error;

use crate::light::TransportKind;

/// All error types that can occur while reconciling light state.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Failed to serialize data to JSON.
    #[error("failed to dump json: {0:?}")]
    JsonDump(serde_json::Error),

    /// Failed to deserialize JSON data.
    #[error("failed to load json: {0:?}")]
    JsonLoad(serde_json::Error),

    /// A network socket operation failed while talking to a controller.
    #[error("socket {action} error: {err:?}")]
    Socket { action: String, err: std::io::Error },

    /// A datagram from a controller contained invalid UTF-8.
    #[error("utf8 decoding error: {0:?}")]
    Utf8Decode(FromUtf8Error),

    /// An ArduCor packet could not be parsed.
    #[error("malformed packet {packet:?}: {reason}")]
    MalformedPacket { packet: String, reason: String },

    /// An ArduCor command carried a header this crate does not know.
    #[error("unknown packet header {0}")]
    UnknownHeader(u32),

    /// No backend is registered for the transport.
    #[error("no backend registered for {0:?}")]
    NoBackend(TransportKind),

    /// The packet variant does not match the backend it was routed to.
    #[error("{transport:?} backend cannot send a {packet} packet")]
    PacketMismatch {
        transport: TransportKind,
        packet: &'static str,
    },

    /// The controller is not known to the backend.
    #[error("unknown controller {0}")]
    UnknownController(String),

    /// The transport has no concept of bridge-resident schedules.
    #[error("{0:?} does not support schedules")]
    SchedulesUnsupported(TransportKind),

    /// The sync configuration is inconsistent.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The sync service is no longer listening for events.
    #[error("sync event channel closed")]
    ChannelClosed,
}

impl Error {
    /// Create a new socket error
    pub fn socket(action: &str, err: std::io::Error) -> Self {
        Error::Socket {
            action: action.to_string(),
            err,
        }
    }

    /// Create a new malformed packet error
    pub fn malformed(packet: &str, reason: &str) -> Self {
        Error::MalformedPacket {
            packet: packet.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Create a new packet mismatch error
    pub fn packet_mismatch(transport: TransportKind, packet: &'static str) -> Self {
        Error::PacketMismatch { transport, packet }
    }
}

/// Hacky implementation of PartialEq for testing
#[cfg(test)]
impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool {
        self.to_string() == other.to_string()
    }
}
