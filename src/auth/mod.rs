//! Dynamic credential resolution: OAuth2 grants, form login, and the
//! mutable effective identity shared across concurrent probes.

pub mod flows;
pub mod identity;

pub use identity::{EffectiveIdentity, ResolvedIdentity};
