//! OpenAPI document handling: loading, `$ref` resolution, security
//! inheritance, and schema-driven value sampling.

pub mod loader;
pub mod refs;
pub mod sampler;
pub mod security;

pub use loader::load_spec;
pub use refs::deref;
pub use sampler::{Sampler, fill_server_variables};
pub use security::operation_requires_auth;
