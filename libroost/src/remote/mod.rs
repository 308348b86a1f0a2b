//! Remote platform abstraction
//!
//! All network interaction with the social platform goes through the
//! [`Remote`] trait: token exchange, identity lookup, publishing, and list
//! management. Orchestrators receive a `Remote` at construction, so swapping
//! the real HTTP client for the mock is an explicit wiring decision, never a
//! global mode.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub mod http;
pub mod mock;

pub use http::HttpRemote;
pub use mock::MockRemote;

/// Tokens returned by a successful authorization-code exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: Option<i64>,
    pub scope: Option<String>,
}

/// A user as the remote platform knows them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteUser {
    /// Platform-assigned user ID, opaque to Roost.
    pub id: String,
    /// The user's handle without any leading sigil.
    pub handle: String,
    pub display_name: Option<String>,
}

/// Operations Roost performs against the remote platform.
///
/// Every method takes a decrypted bearer token; nothing in this trait reads
/// the vault or the database. Failures carry the upstream status and body
/// verbatim in [`RemoteError::Api`](crate::error::RemoteError::Api).
#[async_trait]
pub trait Remote: Send + Sync {
    /// Redeem an authorization code, proving possession of the PKCE verifier.
    async fn exchange_code(&self, code: &str, verifier: &str) -> Result<TokenGrant>;

    /// Resolve the identity behind an access token.
    async fn whoami(&self, access_token: &str) -> Result<RemoteUser>;

    /// Look up a user by handle.
    async fn user_by_handle(&self, access_token: &str, handle: &str) -> Result<RemoteUser>;

    /// Publish a text post. Returns the platform-assigned post ID.
    async fn publish(&self, access_token: &str, body: &str) -> Result<String>;

    /// Create a list. Returns the platform-assigned list ID.
    async fn create_list(
        &self,
        access_token: &str,
        name: &str,
        description: Option<&str>,
        private: bool,
    ) -> Result<String>;

    /// Rename or re-describe an existing list.
    async fn update_list(
        &self,
        access_token: &str,
        list_id: &str,
        name: &str,
        description: Option<&str>,
    ) -> Result<()>;

    async fn delete_list(&self, access_token: &str, list_id: &str) -> Result<()>;

    async fn add_list_member(&self, access_token: &str, list_id: &str, user_id: &str)
        -> Result<()>;

    async fn remove_list_member(
        &self,
        access_token: &str,
        list_id: &str,
        user_id: &str,
    ) -> Result<()>;
}
