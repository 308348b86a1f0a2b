//! Mock remote platform for testing
//!
//! A configurable in-memory stand-in for the real platform: scripted users,
//! deterministic IDs, per-operation failure injection, and call counters so
//! tests can assert that an operation never reached the network.
//!
//! Available in all builds (not just tests) so integration tests and dry
//! runs can wire it in place of [`HttpRemote`](crate::remote::HttpRemote).

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use crate::error::{RemoteError, Result};
use crate::remote::{Remote, RemoteUser, TokenGrant};

pub struct MockRemote {
    grant: Mutex<TokenGrant>,
    identity: Mutex<RemoteUser>,
    users: Mutex<HashMap<String, RemoteUser>>,

    fail_exchange: Mutex<Option<RemoteError>>,
    fail_publish: Mutex<Option<RemoteError>>,
    fail_list_ops: Mutex<Option<RemoteError>>,
    /// User IDs whose membership changes fail with a 403.
    rejected_member_ids: Mutex<HashSet<String>>,

    published: Mutex<Vec<String>>,
    member_adds: Mutex<Vec<(String, String)>>,
    member_removes: Mutex<Vec<(String, String)>>,

    exchange_count: Mutex<usize>,
    publish_count: Mutex<usize>,
    list_create_count: Mutex<usize>,
    list_update_count: Mutex<usize>,
    list_delete_count: Mutex<usize>,
}

impl Default for MockRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRemote {
    /// A mock where every operation succeeds.
    pub fn new() -> Self {
        Self {
            grant: Mutex::new(TokenGrant {
                access_token: "mock-access-token".to_string(),
                refresh_token: Some("mock-refresh-token".to_string()),
                expires_in: Some(7200),
                scope: Some("tweet.read tweet.write users.read".to_string()),
            }),
            identity: Mutex::new(RemoteUser {
                id: "11".to_string(),
                handle: "mockuser".to_string(),
                display_name: Some("Mock User".to_string()),
            }),
            users: Mutex::new(HashMap::new()),
            fail_exchange: Mutex::new(None),
            fail_publish: Mutex::new(None),
            fail_list_ops: Mutex::new(None),
            rejected_member_ids: Mutex::new(HashSet::new()),
            published: Mutex::new(Vec::new()),
            member_adds: Mutex::new(Vec::new()),
            member_removes: Mutex::new(Vec::new()),
            exchange_count: Mutex::new(0),
            publish_count: Mutex::new(0),
            list_create_count: Mutex::new(0),
            list_update_count: Mutex::new(0),
            list_delete_count: Mutex::new(0),
        }
    }

    /// Set the identity returned by `whoami` and by token exchanges.
    pub fn set_identity(&self, id: &str, handle: &str) {
        *self.identity.lock().unwrap() = RemoteUser {
            id: id.to_string(),
            handle: handle.to_string(),
            display_name: None,
        };
    }

    /// Register a user resolvable by `user_by_handle`. Handles not
    /// registered here resolve to a 404.
    pub fn add_user(&self, handle: &str, id: &str) {
        self.users.lock().unwrap().insert(
            handle.to_string(),
            RemoteUser {
                id: id.to_string(),
                handle: handle.to_string(),
                display_name: None,
            },
        );
    }

    pub fn fail_exchange(&self, status: u16, body: &str) {
        *self.fail_exchange.lock().unwrap() = Some(RemoteError::Api {
            status,
            body: body.to_string(),
        });
    }

    pub fn fail_publish(&self, status: u16, body: &str) {
        *self.fail_publish.lock().unwrap() = Some(RemoteError::Api {
            status,
            body: body.to_string(),
        });
    }

    pub fn fail_list_ops(&self, status: u16, body: &str) {
        *self.fail_list_ops.lock().unwrap() = Some(RemoteError::Api {
            status,
            body: body.to_string(),
        });
    }

    /// Reset all injected failures.
    pub fn clear_failures(&self) {
        *self.fail_exchange.lock().unwrap() = None;
        *self.fail_publish.lock().unwrap() = None;
        *self.fail_list_ops.lock().unwrap() = None;
        self.rejected_member_ids.lock().unwrap().clear();
    }

    /// Membership changes for this user ID fail with a 403.
    pub fn reject_member(&self, user_id: &str) {
        self.rejected_member_ids
            .lock()
            .unwrap()
            .insert(user_id.to_string());
    }

    pub fn published(&self) -> Vec<String> {
        self.published.lock().unwrap().clone()
    }

    pub fn member_adds(&self) -> Vec<(String, String)> {
        self.member_adds.lock().unwrap().clone()
    }

    pub fn member_removes(&self) -> Vec<(String, String)> {
        self.member_removes.lock().unwrap().clone()
    }

    pub fn exchange_count(&self) -> usize {
        *self.exchange_count.lock().unwrap()
    }

    pub fn publish_count(&self) -> usize {
        *self.publish_count.lock().unwrap()
    }

    pub fn list_create_count(&self) -> usize {
        *self.list_create_count.lock().unwrap()
    }

    pub fn list_update_count(&self) -> usize {
        *self.list_update_count.lock().unwrap()
    }

    pub fn list_delete_count(&self) -> usize {
        *self.list_delete_count.lock().unwrap()
    }

    fn list_ops_failure(&self) -> Option<RemoteError> {
        self.fail_list_ops.lock().unwrap().clone()
    }
}

#[async_trait]
impl Remote for MockRemote {
    async fn exchange_code(&self, _code: &str, _verifier: &str) -> Result<TokenGrant> {
        *self.exchange_count.lock().unwrap() += 1;

        if let Some(error) = self.fail_exchange.lock().unwrap().clone() {
            return Err(error.into());
        }
        Ok(self.grant.lock().unwrap().clone())
    }

    async fn whoami(&self, _access_token: &str) -> Result<RemoteUser> {
        Ok(self.identity.lock().unwrap().clone())
    }

    async fn user_by_handle(&self, _access_token: &str, handle: &str) -> Result<RemoteUser> {
        self.users.lock().unwrap().get(handle).cloned().ok_or_else(|| {
            RemoteError::Api {
                status: 404,
                body: format!(r#"{{"title":"Not Found","detail":"user {} not found"}}"#, handle),
            }
            .into()
        })
    }

    async fn publish(&self, _access_token: &str, body: &str) -> Result<String> {
        let mut count = self.publish_count.lock().unwrap();
        *count += 1;

        if let Some(error) = self.fail_publish.lock().unwrap().clone() {
            return Err(error.into());
        }

        self.published.lock().unwrap().push(body.to_string());
        // Deterministic IDs: 999, 1000, 1001, ...
        Ok(format!("{}", 998 + *count))
    }

    async fn create_list(
        &self,
        _access_token: &str,
        _name: &str,
        _description: Option<&str>,
        _private: bool,
    ) -> Result<String> {
        let mut count = self.list_create_count.lock().unwrap();
        *count += 1;

        if let Some(error) = self.list_ops_failure() {
            return Err(error.into());
        }
        Ok(format!("{}", 4566 + *count))
    }

    async fn update_list(
        &self,
        _access_token: &str,
        _list_id: &str,
        _name: &str,
        _description: Option<&str>,
    ) -> Result<()> {
        *self.list_update_count.lock().unwrap() += 1;

        match self.list_ops_failure() {
            Some(error) => Err(error.into()),
            None => Ok(()),
        }
    }

    async fn delete_list(&self, _access_token: &str, _list_id: &str) -> Result<()> {
        *self.list_delete_count.lock().unwrap() += 1;

        match self.list_ops_failure() {
            Some(error) => Err(error.into()),
            None => Ok(()),
        }
    }

    async fn add_list_member(
        &self,
        _access_token: &str,
        list_id: &str,
        user_id: &str,
    ) -> Result<()> {
        if self.rejected_member_ids.lock().unwrap().contains(user_id) {
            return Err(RemoteError::Api {
                status: 403,
                body: r#"{"title":"Forbidden"}"#.to_string(),
            }
            .into());
        }

        self.member_adds
            .lock()
            .unwrap()
            .push((list_id.to_string(), user_id.to_string()));
        Ok(())
    }

    async fn remove_list_member(
        &self,
        _access_token: &str,
        list_id: &str,
        user_id: &str,
    ) -> Result<()> {
        if self.rejected_member_ids.lock().unwrap().contains(user_id) {
            return Err(RemoteError::Api {
                status: 403,
                body: r#"{"title":"Forbidden"}"#.to_string(),
            }
            .into());
        }

        self.member_removes
            .lock()
            .unwrap()
            .push((list_id.to_string(), user_id.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_publish_ids_are_deterministic() {
        let remote = MockRemote::new();

        let first = remote.publish("token", "hello").await.unwrap();
        let second = remote.publish("token", "world").await.unwrap();

        assert_eq!(first, "999");
        assert_eq!(second, "1000");
        assert_eq!(remote.published(), vec!["hello", "world"]);
        assert_eq!(remote.publish_count(), 2);
    }

    #[tokio::test]
    async fn test_mock_publish_failure_still_counts() {
        let remote = MockRemote::new();
        remote.fail_publish(403, r#"{"title":"Forbidden"}"#);

        let result = remote.publish("token", "hello").await;
        assert!(result.is_err());
        assert_eq!(remote.publish_count(), 1);
        assert!(remote.published().is_empty());
    }

    #[tokio::test]
    async fn test_mock_user_lookup() {
        let remote = MockRemote::new();
        remote.add_user("alice", "42");

        let user = remote.user_by_handle("token", "alice").await.unwrap();
        assert_eq!(user.id, "42");

        let missing = remote.user_by_handle("token", "nobody").await;
        assert!(missing.unwrap_err().to_string().contains("404"));
    }

    #[tokio::test]
    async fn test_mock_rejected_member() {
        let remote = MockRemote::new();
        remote.reject_member("13");

        assert!(remote.add_list_member("token", "L1", "12").await.is_ok());
        assert!(remote.add_list_member("token", "L1", "13").await.is_err());
        assert_eq!(
            remote.member_adds(),
            vec![("L1".to_string(), "12".to_string())]
        );
    }
}
