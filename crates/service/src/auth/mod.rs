//! Auth module: token lifecycle, password handling, session bookkeeping and
//! verification-token redemption, composed by [`AuthService`].
//!
//! Layers follow the usual split: `domain` types, `repository` traits (with an
//! in-memory `mock`), `repo` implementations over sea-orm, and `service` for
//! the workflows.

pub mod domain;
pub mod errors;
pub mod mail;
pub mod password;
pub mod repo;
pub mod repository;
pub mod retry;
pub mod revocation;
pub mod service;
pub mod session;
pub mod token;
pub mod verification;

pub use errors::AuthError;
pub use service::{AuthConfig, AuthService};
