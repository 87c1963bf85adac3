//! Message and login records shared by the host and modules

use serde::{Deserialize, Serialize};

/// Raw result code a module hands back to the host
pub const RESULT_CONSUMED: i32 = 1;
/// Raw result code: pass the message to the next module / recipient
pub const RESULT_PASS: i32 = 0;
/// Raw result code for success on non-routing calls
pub const RESULT_OK: i32 = 0;
/// Raw result code for failure
pub const RESULT_FAIL: i32 = -1;

/// Request a delivery receipt for the message
pub const FLAG_DELIVERY_RECEIPT: u32 = 0x1;
/// Request a read receipt for the message
pub const FLAG_READ_RECEIPT: u32 = 0x2;
/// Subscribe to presence updates for the peer
pub const FLAG_PRESENCE: u32 = 0x8;

/// Outcome of a module callback, as seen by the host router
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleResult {
    /// Module handled the message; do not route it further
    Consumed,
    /// Module is done; continue routing
    Pass,
    /// Module failed; the host decides what to do with the message
    Fail,
}

impl ModuleResult {
    /// Raw code for the wire/script boundary
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::Consumed => RESULT_CONSUMED,
            Self::Pass => RESULT_PASS,
            Self::Fail => RESULT_FAIL,
        }
    }

    /// Interpret a raw code; anything outside the known set is a failure
    #[must_use]
    pub const fn from_code(code: i32) -> Self {
        match code {
            RESULT_CONSUMED => Self::Consumed,
            RESULT_PASS => Self::Pass,
            _ => Self::Fail,
        }
    }
}

/// Parameters accompanying a message, owned by the receiver.
///
/// Every field is a copy; a module may hold a `MessageParams` for as long as
/// it likes without touching host memory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageParams {
    /// Application id, required when sending
    pub aid: u32,
    /// Message id, required when sending
    pub id: u32,
    /// Id of the message this one refers to, if any
    pub refid: u32,
    /// Group id for group messages, 0 for one-to-one
    pub groupid: u32,
    /// Bitwise OR of the `FLAG_*` constants
    pub flags: u32,
    /// Application-defined message type
    pub kind: u32,
    /// Expiry in seconds, 0 for none
    pub expiry: u32,
    /// Delivery status, set by the host on status callbacks
    pub status: u32,
    /// Nonzero to deliver only when the recipient is online
    pub to_online: u32,
    /// Destination address
    pub to: Option<String>,
    /// Sender address
    pub from: Option<String>,
}

/// A user connecting to or disconnecting from the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginEvent {
    pub address: String,
    pub online: bool,
    pub flags: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_code_roundtrip() {
        for r in [ModuleResult::Consumed, ModuleResult::Pass, ModuleResult::Fail] {
            assert_eq!(ModuleResult::from_code(r.code()), r);
        }
        // Unknown codes collapse to Fail
        assert_eq!(ModuleResult::from_code(42), ModuleResult::Fail);
        assert_eq!(ModuleResult::from_code(-7), ModuleResult::Fail);
    }

    #[test]
    fn params_serialization() {
        let params = MessageParams {
            aid: 1,
            id: 42,
            to: Some("bob".into()),
            from: Some("alice".into()),
            flags: FLAG_READ_RECEIPT | FLAG_DELIVERY_RECEIPT,
            ..Default::default()
        };
        let json = serde_json::to_string(&params).unwrap();
        let parsed: MessageParams = serde_json::from_str(&json).unwrap();
        assert_eq!(params, parsed);
    }

    #[test]
    fn flag_bits_are_distinct() {
        assert_eq!(FLAG_DELIVERY_RECEIPT & FLAG_READ_RECEIPT, 0);
        assert_eq!(FLAG_PRESENCE & (FLAG_DELIVERY_RECEIPT | FLAG_READ_RECEIPT), 0);
    }
}
