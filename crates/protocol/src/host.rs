//! The capability trait the host hands to every module

use thiserror::Error;

use crate::{HttpHandler, HttpRequest, MessageParams, SocketHandler, SocketId, SocketRequest};

/// Errors the host reports back to a module
#[derive(Debug, Error)]
pub enum HostError {
    #[error("message rejected: {0}")]
    Rejected(String),

    #[error("http request refused: {0}")]
    Http(String),

    #[error("socket request refused: {0}")]
    Socket(String),

    #[error("unknown socket handle: {0}")]
    UnknownSocket(SocketId),
}

/// Host services available to a loadable module.
///
/// Implementations must be callable from any thread. Handler callbacks for
/// `http` and `socket_connect` must be delivered from outside the module
/// dispatch that issued the request; a module is free to hold its own locks
/// across capability calls under that guarantee.
pub trait Host: Send + Sync {
    /// Send a message on behalf of the module. `params.aid` and `params.id`
    /// must be nonzero.
    fn send_message(&self, params: &MessageParams, body: &[u8]) -> Result<(), HostError>;

    /// Start an HTTP transfer; the handler receives the streamed response
    fn http(&self, request: HttpRequest, handler: Box<dyn HttpHandler>) -> Result<(), HostError>;

    /// Open a socket; the handler receives connection events
    fn socket_connect(
        &self,
        request: SocketRequest,
        handler: Box<dyn SocketHandler>,
    ) -> Result<SocketId, HostError>;

    /// Write to a previously opened socket
    fn socket_write(&self, id: SocketId, data: &[u8]) -> Result<(), HostError>;

    /// Close a previously opened socket
    fn socket_close(&self, id: SocketId) -> Result<(), HostError>;

    /// Look up a module configuration value
    fn config(&self, key: &str) -> Option<String>;
}
