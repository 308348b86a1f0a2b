//! OAuth2 authorization flow orchestration
//!
//! Two halves of the handshake: [`AuthFlow::initiate`] generates the PKCE
//! material, persists the state server-side, and returns the authorization
//! URL; [`AuthFlow::complete`] consumes the state exactly once, redeems the
//! code, resolves the identity, and upserts the account with vault-encrypted
//! tokens.

use std::sync::Arc;

use crate::config::Config;
use crate::db::Database;
use crate::error::{Result, RoostError};
use crate::pkce::PkceChallenge;
use crate::remote::Remote;
use crate::types::Account;
use crate::vault::Vault;

/// A pending authorization handed back to the operator.
#[derive(Debug, Clone)]
pub struct Authorization {
    /// Full authorization URL to open in a browser.
    pub url: String,
    /// The state token, for correlating the callback.
    pub state: String,
}

pub struct AuthFlow {
    db: Database,
    vault: Arc<Vault>,
    remote: Arc<dyn Remote>,
    client_id: String,
    callback_url: String,
    scopes: String,
    authorize_url: String,
    state_ttl: chrono::Duration,
}

impl AuthFlow {
    pub fn new(db: Database, vault: Arc<Vault>, remote: Arc<dyn Remote>, config: &Config) -> Self {
        Self {
            db,
            vault,
            remote,
            client_id: config.oauth.client_id.clone(),
            callback_url: config.oauth.callback_url.clone(),
            scopes: config.oauth.scopes.clone(),
            authorize_url: config.remote.authorize_url.clone(),
            state_ttl: config.state_ttl(),
        }
    }

    /// Start an authorization handshake.
    ///
    /// The verifier never leaves the server; only the challenge and state
    /// appear in the returned URL.
    pub async fn initiate(&self) -> Result<Authorization> {
        let pkce = PkceChallenge::generate();
        self.db.put_oauth_state(&pkce.state, &pkce.verifier).await?;

        let url = reqwest::Url::parse_with_params(
            &self.authorize_url,
            &[
                ("response_type", "code"),
                ("client_id", &self.client_id),
                ("redirect_uri", &self.callback_url),
                ("scope", &self.scopes),
                ("state", &pkce.state),
                ("code_challenge", &pkce.challenge),
                ("code_challenge_method", "S256"),
            ],
        )
        .map_err(|e| RoostError::InvalidInput(format!("bad authorize URL: {}", e)))?;

        tracing::info!(state = %pkce.state, "authorization initiated");

        Ok(Authorization {
            url: url.to_string(),
            state: pkce.state,
        })
    }

    /// Finish an authorization handshake from the callback parameters.
    ///
    /// The state is consumed atomically before any network call, so a
    /// replayed callback fails with `NotFound` no matter how the first
    /// attempt ended. Unknown, already-consumed, and expired states are
    /// indistinguishable to the caller.
    pub async fn complete(&self, state: &str, code: &str) -> Result<Account> {
        if state.is_empty() || code.is_empty() {
            return Err(RoostError::InvalidInput(
                "state and code are required".to_string(),
            ));
        }

        let verifier = self
            .db
            .take_oauth_state(state, self.state_ttl)
            .await?
            .ok_or_else(|| {
                RoostError::NotFound("authorization state unknown or expired".to_string())
            })?;

        let grant = self.remote.exchange_code(code, &verifier).await?;
        let identity = self.remote.whoami(&grant.access_token).await?;

        let encrypted_access = self.vault.encrypt(&grant.access_token)?;
        let encrypted_refresh = match &grant.refresh_token {
            Some(token) => Some(self.vault.encrypt(token)?),
            None => None,
        };

        let account = self
            .db
            .upsert_account(
                &identity.handle,
                &encrypted_access,
                encrypted_refresh.as_deref(),
            )
            .await?;

        tracing::info!(handle = %account.handle, account_id = account.id, "authorization complete");

        Ok(account)
    }

    /// Drop handshake states past their TTL. Returns the number purged.
    pub async fn purge_expired(&self) -> Result<u64> {
        self.db.purge_expired_oauth_states(self.state_ttl).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::MockRemote;
    use crate::types::AccountStatus;

    async fn test_flow() -> (AuthFlow, Database, Arc<Vault>, Arc<MockRemote>) {
        let db = Database::open_in_memory().await.unwrap();
        let vault = Arc::new(Vault::from_base64_key(&Vault::generate_key()).unwrap());
        let remote = Arc::new(MockRemote::new());

        let mut config = Config::default_config();
        config.oauth.client_id = "client-id".to_string();

        let flow = AuthFlow::new(db.clone(), vault.clone(), remote.clone(), &config);
        (flow, db, vault, remote)
    }

    #[tokio::test]
    async fn test_initiate_builds_authorization_url() {
        let (flow, _db, _vault, _remote) = test_flow().await;

        let auth = flow.initiate().await.unwrap();
        assert!(auth.url.starts_with("https://twitter.com/i/oauth2/authorize?"));
        assert!(auth.url.contains("code_challenge_method=S256"));
        assert!(auth.url.contains(&format!("state={}", auth.state)));
        assert!(auth.url.contains("client_id=client-id"));
        // The verifier is secret and must not appear in the URL
        assert!(!auth.url.contains("verifier"));
    }

    #[tokio::test]
    async fn test_complete_round_trip_stores_encrypted_tokens() {
        let (flow, db, vault, remote) = test_flow().await;
        remote.set_identity("42", "alice");

        let auth = flow.initiate().await.unwrap();
        let account = flow.complete(&auth.state, "auth-code").await.unwrap();

        assert_eq!(account.handle, "alice");
        assert_eq!(account.status, AccountStatus::Active);
        assert_eq!(remote.exchange_count(), 1);

        // Tokens at rest are ciphertext, and decrypt back to the grant
        let stored = db.get_account(account.id).await.unwrap().unwrap();
        assert_ne!(stored.access_token, "mock-access-token");
        assert_eq!(
            vault.decrypt(&stored.access_token).unwrap(),
            "mock-access-token"
        );
        assert_eq!(
            vault.decrypt(stored.refresh_token.as_deref().unwrap()).unwrap(),
            "mock-refresh-token"
        );
    }

    #[tokio::test]
    async fn test_complete_consumes_state_once() {
        let (flow, _db, _vault, _remote) = test_flow().await;

        let auth = flow.initiate().await.unwrap();
        flow.complete(&auth.state, "auth-code").await.unwrap();

        let replay = flow.complete(&auth.state, "auth-code").await;
        assert!(matches!(replay, Err(RoostError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_complete_unknown_state() {
        let (flow, _db, _vault, remote) = test_flow().await;

        let result = flow.complete("never-issued", "auth-code").await;
        assert!(matches!(result, Err(RoostError::NotFound(_))));
        assert_eq!(remote.exchange_count(), 0, "no exchange without a valid state");
    }

    #[tokio::test]
    async fn test_failed_exchange_still_consumes_state() {
        let (flow, _db, _vault, remote) = test_flow().await;
        remote.fail_exchange(400, r#"{"error":"invalid_grant"}"#);

        let auth = flow.initiate().await.unwrap();
        let first = flow.complete(&auth.state, "bad-code").await;
        assert!(matches!(first, Err(RoostError::Remote(_))));

        // Retrying with the same state fails differently: it is gone
        let second = flow.complete(&auth.state, "bad-code").await;
        assert!(matches!(second, Err(RoostError::NotFound(_))));
        assert_eq!(remote.exchange_count(), 1);
    }

    #[tokio::test]
    async fn test_complete_rejects_blank_params() {
        let (flow, _db, _vault, _remote) = test_flow().await;

        assert!(matches!(
            flow.complete("", "code").await,
            Err(RoostError::InvalidInput(_))
        ));
        assert!(matches!(
            flow.complete("state", "").await,
            Err(RoostError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_reauthorization_updates_same_account() {
        let (flow, db, _vault, remote) = test_flow().await;
        remote.set_identity("42", "alice");

        let first = flow.initiate().await.unwrap();
        let account = flow.complete(&first.state, "code-1").await.unwrap();

        let second = flow.initiate().await.unwrap();
        let again = flow.complete(&second.state, "code-2").await.unwrap();

        assert_eq!(again.id, account.id);
        assert_eq!(db.list_accounts().await.unwrap().len(), 1);
    }
}
