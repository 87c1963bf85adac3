//! Socket request records and the connection callback

use serde::{Deserialize, Serialize};

use crate::ModuleResult;

/// Host-assigned handle for an open socket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SocketId(pub i64);

impl std::fmt::Display for SocketId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An outgoing socket connection request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SocketRequest {
    /// e.g. `tcp://host:port` or `tcps://host:port`
    pub url: String,
    pub keepalive: bool,
    pub verify_host: bool,
}

impl Default for SocketRequest {
    fn default() -> Self {
        Self {
            url: String::new(),
            keepalive: false,
            verify_host: true,
        }
    }
}

/// Receives socket lifecycle events.
///
/// Calls arrive from host threads, never from inside the module dispatch
/// that opened the connection. `on_close` is terminal.
pub trait SocketHandler: Send {
    /// Connection established; `id` is valid for write/close until close
    fn on_connect(&mut self, id: SocketId);

    /// Bytes arrived. Returning `Fail` asks the host to drop the connection.
    fn on_data(&mut self, data: &[u8]) -> ModuleResult;

    /// Connection closed, by either side. No further calls follow.
    fn on_close(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_verifies_host_by_default() {
        let req = SocketRequest::default();
        assert!(req.verify_host);
        assert!(!req.keepalive);
    }

    #[test]
    fn socket_id_display() {
        assert_eq!(SocketId(7).to_string(), "7");
    }
}
