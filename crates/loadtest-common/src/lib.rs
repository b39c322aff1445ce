//! Shared building blocks for the load-testing harness
pub mod config;
pub mod credentials;
pub mod error;
pub mod events;
pub mod headers;
pub mod logging;
pub mod trace;

pub use config::Config;
pub use credentials::{CredentialQueue, CredentialRecord};
pub use error::{LoadError, LoadResult};
pub use events::{EventLevel, EventLog};
pub use headers::{
    base_headers, extract_token, headers_with_token, CookieMap, ResponseView, TokenExtractor,
};
pub use trace::TraceLog;
