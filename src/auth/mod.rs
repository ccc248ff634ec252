//! Authentication module
//!
//! The research API uses the OAuth2 client-credentials grant. The
//! `TokenManager` owns the single access token, hands it out while it is
//! fresh, and exchanges the client key and secret for a new one when it
//! is not.

mod manager;
mod types;

pub use manager::{TokenManager, DEFAULT_TOKEN_TTL};
pub use types::{ClientCredentials, Credential};
