//! Courier Script Host
//!
//! Runs a JavaScript module inside an embedded QuickJS engine and bridges it
//! to the messaging host: incoming messages and login events are dispatched
//! into script listeners, and scripts reach back out through capability
//! objects for messaging, HTTP, and sockets.
//!
//! ## Script API
//!
//! A script registers listeners on the `courier` namespace:
//!
//! - `courier.onmessage = function(msg) { ... }` - required
//! - `courier.onmessagestatus = function(params, status) { ... }` - optional
//! - `courier.onlogin = function(user) { ... }` - optional
//! - `courier.log(...)` - write to the host log
//! - `courier.RESULT_OK` / `courier.RESULT_FAIL` - return codes
//!
//! Listeners return an integer: 1 consumes the message, 0 passes it on,
//! -1 reports failure. Capability classes available to scripts:
//!
//! - `new Message()` - set fields, then `send()`
//! - `new Http()` - set `url`, `post`, `ondata`, then `send()`
//! - `new Socket()` - set `url`, `onconnect`, `ondata`, then `connect()`
//!
//! The script file is watched by modification time; edits take effect on the
//! next dispatch without restarting the host.

mod bindings;
mod http;
mod message;
mod module;
mod runtime;
mod socket;

#[cfg(test)]
mod testing;

pub use http::RESPONSE_BUFFER_CAP;
pub use module::ScriptModule;
pub use runtime::ScriptSession;

use std::path::PathBuf;

use courier_protocol::Host;
use thiserror::Error;

/// Errors from loading or driving a script module
#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("failed to load script {}: {source}", path.display())]
    Load {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("script failed to compile: {0}")]
    Compile(String),

    #[error("script evaluation failed: {0}")]
    Runtime(String),

    #[error("script does not define a courier.{0} function")]
    MissingListener(&'static str),

    #[error("bad module configuration: {0}")]
    Config(String),

    #[error("invalid message parameters: {0}")]
    InvalidParams(String),

    #[error("response exceeds the {limit} byte buffer")]
    BufferOverflow { limit: usize },

    #[error("uncaught script exception: {0}")]
    ScriptException(String),

    #[error("script was reloaded while the request was in flight")]
    StaleContext,

    #[error("engine initialization failed: {0}")]
    Init(String),
}

/// Module configuration, read from the host at init
#[derive(Debug, Clone)]
pub struct ScriptConfig {
    /// Path to the script file
    pub script: PathBuf,
    /// Log verbosity, 0 = quiet
    pub log: u32,
}

impl ScriptConfig {
    /// Read the `script` and `log` keys from the host configuration
    pub fn from_host(host: &dyn Host) -> Result<Self, ScriptError> {
        let script = host
            .config("script")
            .ok_or_else(|| ScriptError::Config("missing required `script` key".into()))?;
        let log = host
            .config("log")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        Ok(Self {
            script: PathBuf::from(script),
            log,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockHost;
    use std::sync::Arc;

    #[test]
    fn config_requires_script_key() {
        let host = Arc::new(MockHost::new());
        let err = ScriptConfig::from_host(host.as_ref()).unwrap_err();
        assert!(matches!(err, ScriptError::Config(_)));
    }

    #[test]
    fn config_log_defaults_to_zero() {
        let host = Arc::new(MockHost::new());
        host.set_config("script", "/tmp/mod.js");
        let config = ScriptConfig::from_host(host.as_ref()).unwrap();
        assert_eq!(config.log, 0);
        assert_eq!(config.script, PathBuf::from("/tmp/mod.js"));

        host.set_config("log", "2");
        let config = ScriptConfig::from_host(host.as_ref()).unwrap();
        assert_eq!(config.log, 2);
    }
}
