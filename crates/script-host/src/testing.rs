//! Test doubles for driving a script module without a real host

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;

use courier_protocol::{
    Host, HostError, HttpHandler, HttpRequest, MessageParams, SocketHandler, SocketId,
    SocketRequest,
};

/// Records every capability call and hands captured handlers back to the
/// test so it can play the host side of async transfers.
pub(crate) struct MockHost {
    config: Mutex<HashMap<String, String>>,
    pub(crate) sent: Mutex<Vec<(MessageParams, Vec<u8>)>>,
    pub(crate) http_requests: Mutex<Vec<HttpRequest>>,
    http_handlers: Mutex<Vec<Box<dyn HttpHandler>>>,
    pub(crate) socket_requests: Mutex<Vec<SocketRequest>>,
    socket_handlers: Mutex<Vec<Box<dyn SocketHandler>>>,
    pub(crate) socket_writes: Mutex<Vec<(SocketId, Vec<u8>)>>,
    pub(crate) socket_closed: Mutex<Vec<SocketId>>,
    next_socket: AtomicI64,
}

impl MockHost {
    pub(crate) fn new() -> Self {
        Self {
            config: Mutex::new(HashMap::new()),
            sent: Mutex::new(Vec::new()),
            http_requests: Mutex::new(Vec::new()),
            http_handlers: Mutex::new(Vec::new()),
            socket_requests: Mutex::new(Vec::new()),
            socket_handlers: Mutex::new(Vec::new()),
            socket_writes: Mutex::new(Vec::new()),
            socket_closed: Mutex::new(Vec::new()),
            next_socket: AtomicI64::new(7),
        }
    }

    pub(crate) fn set_config(&self, key: &str, value: &str) {
        self.config.lock().unwrap().insert(key.into(), value.into());
    }

    pub(crate) fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    pub(crate) fn take_http_handler(&self) -> Box<dyn HttpHandler> {
        self.http_handlers.lock().unwrap().remove(0)
    }

    pub(crate) fn http_handler_count(&self) -> usize {
        self.http_handlers.lock().unwrap().len()
    }

    pub(crate) fn take_socket_handler(&self) -> Box<dyn SocketHandler> {
        self.socket_handlers.lock().unwrap().remove(0)
    }
}

impl Host for MockHost {
    fn send_message(&self, params: &MessageParams, body: &[u8]) -> Result<(), HostError> {
        self.sent
            .lock()
            .unwrap()
            .push((params.clone(), body.to_vec()));
        Ok(())
    }

    fn http(&self, request: HttpRequest, handler: Box<dyn HttpHandler>) -> Result<(), HostError> {
        self.http_requests.lock().unwrap().push(request);
        self.http_handlers.lock().unwrap().push(handler);
        Ok(())
    }

    fn socket_connect(
        &self,
        request: SocketRequest,
        handler: Box<dyn SocketHandler>,
    ) -> Result<SocketId, HostError> {
        self.socket_requests.lock().unwrap().push(request);
        self.socket_handlers.lock().unwrap().push(handler);
        Ok(SocketId(self.next_socket.fetch_add(1, Ordering::SeqCst)))
    }

    fn socket_write(&self, id: SocketId, data: &[u8]) -> Result<(), HostError> {
        self.socket_writes.lock().unwrap().push((id, data.to_vec()));
        Ok(())
    }

    fn socket_close(&self, id: SocketId) -> Result<(), HostError> {
        self.socket_closed.lock().unwrap().push(id);
        Ok(())
    }

    fn config(&self, key: &str) -> Option<String> {
        self.config.lock().unwrap().get(key).cloned()
    }
}
