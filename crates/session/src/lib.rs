//! `fieldtrack-session` — identity and session context.
//!
//! The core treats authentication as an external collaborator that produces
//! an opaque identity. This crate defines that boundary
//! ([`IdentityProvider`]), the [`Session`] handle used to scope "my jobs"
//! queries and stamp ownership on writes, and an in-memory provider for
//! dev/tests.

pub mod identity;
pub mod session;

pub use identity::{IdentityProvider, InMemoryIdentity};
pub use session::Session;
