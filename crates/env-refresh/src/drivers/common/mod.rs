//! Helpers shared by several store drivers.
//!
//! - [`tls`]: PostgreSQL TLS connectors
//! - [`http`]: JSON-over-HTTP client used by the search and graph drivers

pub mod http;
pub mod tls;

pub use http::{HttpAuth, JsonHttp};
pub use tls::{SslMode, TlsBuilder};
