//! Answers ACME DNS-01 challenges for internal domains.
//!
//! ACME clients push the challenge record they need through the HTTP API
//! ([`api`]), the DNS server ([`dns`]) then serves it as a TXT record until
//! the client cleans it up. Both sides share one [`store::ValidationStore`].

pub mod api;
pub mod config;
pub mod dns;
pub mod store;
