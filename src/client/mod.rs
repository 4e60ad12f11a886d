//! Rate-limited, budgeted HTTP probe client

pub mod gate;
pub mod http;
pub mod rate_limit;
pub mod redact;

pub use http::{ClientOptions, Credential, HttpClient};
