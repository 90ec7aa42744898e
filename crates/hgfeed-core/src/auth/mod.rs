// ── Authentication ──
//
// `TokenStore` holds the credential, `AuthClient` drives its lifecycle.

mod client;
mod credential;

pub use client::{AuthClient, AuthState};
pub use credential::{Credential, PersistedSession, TokenStore};
