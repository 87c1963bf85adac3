//! Courier word filter
//!
//! A small native module that drops messages containing any word from a
//! configured block list. Matching is case-insensitive substring matching;
//! this is deliberately simple and not a serious profanity filter.

use courier_protocol::{Host, MessageParams, ModuleResult};
use thiserror::Error;

/// Errors from filter initialization
#[derive(Debug, Error)]
pub enum FilterError {
    #[error("missing required `{0}` configuration key")]
    MissingConfig(&'static str),
}

/// Message filter backed by a comma-separated `blocked_words` config value
pub struct WordFilter {
    blocked: Vec<String>,
    log: u32,
}

impl WordFilter {
    /// Read `blocked_words` and `log` from the host configuration
    pub fn new(host: &dyn Host) -> Result<Self, FilterError> {
        let raw = host
            .config("blocked_words")
            .ok_or(FilterError::MissingConfig("blocked_words"))?;
        let blocked: Vec<String> = raw
            .split(',')
            .map(|word| word.trim().to_uppercase())
            .filter(|word| !word.is_empty())
            .collect();
        let log = host
            .config("log")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        tracing::info!(words = blocked.len(), "word filter initialized");
        Ok(Self { blocked, log })
    }

    /// Consume the message if it contains a blocked word, pass otherwise
    pub fn on_message(&self, params: &MessageParams, body: &[u8]) -> ModuleResult {
        let text = String::from_utf8_lossy(body).to_uppercase();
        if self.log > 0 {
            tracing::info!(from = ?params.from, "{text}");
        }
        if self.blocked.iter().any(|word| text.contains(word.as_str())) {
            tracing::info!("message dropped, contains a blocked word");
            return ModuleResult::Consumed;
        }
        ModuleResult::Pass
    }
}
