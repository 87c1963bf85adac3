//! Courier module ABI
//!
//! Shared surface between the messaging host and its loadable modules:
//! message parameter records, result codes, HTTP and socket request records,
//! the streaming callback traits, and the `Host` capability trait modules
//! use to reach back into the host.

mod host;
mod http;
mod socket;
mod types;

pub use host::*;
pub use http::*;
pub use socket::*;
pub use types::*;
