//! DNS side of the responder.
//!
//! [`Resolver`] answers TXT queries from the shared
//! [`ValidationStore`](crate::store::ValidationStore); [`server`] runs it
//! over UDP and TCP.

mod resolver;
pub mod server;

pub use resolver::*;

/// TTL of TXT answers unless configured otherwise. Challenge records change
/// within seconds, so they should not be cached.
pub const DEFAULT_TTL: u32 = 1;

/// Largest UDP payload accepted, and advertised back to EDNS requesters.
pub const MAX_UDP_PAYLOAD: u16 = 4096;

#[derive(Debug, thiserror::Error)]
pub enum DnsError {
    #[error("DNS socket error: {0}")]
    Io(#[from] std::io::Error),
    #[error("DNS protocol error: {0}")]
    Proto(#[from] hickory_proto::error::ProtoError),
}
