//! Service layer hosting the authentication core on top of `models`.
//! - Token lifecycle, password handling, session bookkeeping, verification-token redemption.
//! - Framework independent: the HTTP crate only calls `auth::AuthService`.
//! - Persistence and cache sit behind repository / store traits.

pub mod auth;
#[cfg(test)]
pub mod test_support;
