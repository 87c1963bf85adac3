//! HTTP request records and the streaming response callback

use serde::{Deserialize, Serialize};

use crate::ModuleResult;

/// Phase of an HTTP transfer, reported alongside each data callback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HttpState {
    /// Request line and headers are being written
    Request,
    /// Request body is being written
    RequestBody,
    /// Response headers are arriving
    ResponseHeader,
    /// Response body bytes are arriving
    ResponseBody,
    /// Transfer finished
    Done,
}

/// An outgoing HTTP request handed to the host.
///
/// `url` and `post` are required; everything else defaults to "let the host
/// pick". Timeouts are in seconds with 0 meaning the host default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpRequest {
    pub url: String,
    pub post: String,
    pub content_type: Option<String>,
    /// Extra headers, newline separated, exactly as they should be sent
    pub headers: Option<String>,
    pub user_agent: Option<String>,
    pub referrer: Option<String>,
    pub origin: Option<String>,
    pub cookie: Option<String>,
    pub encoding: Option<String>,
    pub cache_control: Option<String>,
    pub accept: Option<String>,
    pub etag: Option<String>,
    /// If-Modified-Since as a unix timestamp, 0 to omit
    pub if_modified_since: u64,
    pub conn_timeout: u32,
    pub header_timeout: u32,
    pub body_timeout: u32,
    pub total_timeout: u32,
}

/// Receives a streamed HTTP response.
///
/// The host calls `on_status` once when response headers arrive, `on_data`
/// zero or more times, and `on_close` exactly once as the terminal event.
/// All calls arrive from host threads, never from inside the module dispatch
/// that issued the request.
pub trait HttpHandler: Send {
    /// Response status line has arrived
    fn on_status(&mut self, status: u32, content_type: Option<&str>) -> ModuleResult;

    /// A chunk of the transfer. `progress` is 0..=100, or negative when the
    /// transfer has gone bad. Returning `Fail` asks the host to abort.
    fn on_data(&mut self, state: HttpState, progress: i64, chunk: &[u8]) -> ModuleResult;

    /// Terminal event; `success` is false when the transfer was aborted or
    /// errored. No further calls follow.
    fn on_close(&mut self, success: bool);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_state_serialization() {
        let json = serde_json::to_string(&HttpState::ResponseBody).unwrap();
        assert_eq!(json, "\"response_body\"");
    }

    #[test]
    fn request_defaults_are_empty() {
        let req = HttpRequest::default();
        assert!(req.url.is_empty());
        assert_eq!(req.conn_timeout, 0);
        assert_eq!(req.if_modified_since, 0);
        assert!(req.content_type.is_none());
    }
}
