//! End-to-end workflow tests against the public API
//!
//! Exercises the full account lifecycle with the in-memory database and the
//! mock platform: authorize, queue and dispatch posts, manage lists.

use std::sync::Arc;

use libroost::types::ListVisibility;
use libroost::{
    AccountKind, AccountStatus, AuthFlow, Config, Database, Dispatcher, ListSync, MockRemote,
    PostStatus, RoostError, Vault,
};

struct Harness {
    db: Database,
    vault: Arc<Vault>,
    remote: Arc<MockRemote>,
    config: Config,
}

async fn harness() -> Harness {
    let db = Database::open_in_memory().await.unwrap();
    let vault = Arc::new(Vault::from_base64_key(&Vault::generate_key()).unwrap());
    let remote = Arc::new(MockRemote::new());

    let mut config = Config::default_config();
    config.oauth.client_id = "client-id".to_string();
    config.oauth.client_secret = "client-secret".to_string();

    Harness {
        db,
        vault,
        remote,
        config,
    }
}

impl Harness {
    fn auth(&self) -> AuthFlow {
        AuthFlow::new(
            self.db.clone(),
            self.vault.clone(),
            self.remote.clone(),
            &self.config,
        )
    }

    fn dispatcher(&self) -> Dispatcher {
        Dispatcher::new(self.db.clone(), self.vault.clone(), self.remote.clone())
    }

    fn lists(&self) -> ListSync {
        ListSync::new(self.db.clone(), self.vault.clone(), self.remote.clone())
    }

    /// Authorize an account through the full handshake.
    async fn authorize(&self, user_id: &str, handle: &str) -> libroost::Account {
        self.remote.set_identity(user_id, handle);
        let flow = self.auth();
        let auth = flow.initiate().await.unwrap();
        flow.complete(&auth.state, "auth-code").await.unwrap()
    }
}

#[tokio::test]
async fn authorize_queue_dispatch_workflow() {
    let h = harness().await;

    let account = h.authorize("42", "alice").await;
    assert_eq!(account.handle, "alice");
    assert_eq!(account.status, AccountStatus::Active);

    let dispatcher = h.dispatcher();
    let post = dispatcher.queue(account.id, "first post").await.unwrap();
    let dispatched = dispatcher.dispatch(post.id).await.unwrap();

    assert_eq!(dispatched.status, PostStatus::Posted);
    assert_eq!(dispatched.remote_id, Some("999".to_string()));
    assert_eq!(h.remote.published(), vec!["first post"]);
}

#[tokio::test]
async fn concurrent_callbacks_have_exactly_one_winner() {
    let h = harness().await;
    let flow = Arc::new(h.auth());
    let auth = flow.initiate().await.unwrap();

    let a = {
        let flow = flow.clone();
        let state = auth.state.clone();
        tokio::spawn(async move { flow.complete(&state, "code").await })
    };
    let b = {
        let flow = flow.clone();
        let state = auth.state.clone();
        tokio::spawn(async move { flow.complete(&state, "code").await })
    };

    let (a, b) = (a.await.unwrap(), b.await.unwrap());
    let winners = [&a, &b].iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1, "exactly one callback may redeem a state");

    let loser = if a.is_ok() { b } else { a };
    assert!(matches!(loser, Err(RoostError::NotFound(_))));

    // Only the winner reached the token endpoint
    assert_eq!(h.remote.exchange_count(), 1);
}

#[tokio::test]
async fn concurrent_dispatchers_settle_a_post_once() {
    let h = harness().await;
    let account = h.authorize("42", "alice").await;

    let dispatcher = Arc::new(h.dispatcher());
    let post = dispatcher.queue(account.id, "race me").await.unwrap();

    let a = {
        let dispatcher = dispatcher.clone();
        tokio::spawn(async move { dispatcher.dispatch(post.id).await })
    };
    let b = {
        let dispatcher = dispatcher.clone();
        tokio::spawn(async move { dispatcher.dispatch(post.id).await })
    };

    let (a, b) = (a.await.unwrap(), b.await.unwrap());
    let winners = [&a, &b].iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1, "a post settles exactly once");

    let stored = h.db.get_post(post.id).await.unwrap().unwrap();
    assert_eq!(stored.status, PostStatus::Posted);
    assert!(stored.remote_id.is_some());
}

#[tokio::test]
async fn failed_dispatch_keeps_remote_diagnostic_and_batch_continues() {
    let h = harness().await;
    let account = h.authorize("42", "alice").await;
    let dispatcher = h.dispatcher();

    let ok_post = dispatcher.queue(account.id, "will pass").await.unwrap();
    dispatcher.dispatch(ok_post.id).await.unwrap();

    let bad_post = dispatcher.queue(account.id, "will fail").await.unwrap();
    h.remote
        .fail_publish(429, r#"{"title":"Too Many Requests"}"#);

    let report = dispatcher.dispatch_all_pending().await.unwrap();
    assert_eq!(report.attempted, 1);
    assert_eq!(report.failed, 1);

    let stored = h.db.get_post(bad_post.id).await.unwrap().unwrap();
    assert_eq!(stored.status, PostStatus::Failed);
    let diagnostic = stored.error.unwrap();
    assert!(diagnostic.contains("429"));
    assert!(diagnostic.contains("Too Many Requests"));
}

#[tokio::test]
async fn list_lifecycle_with_partial_membership() {
    let h = harness().await;

    // Owner plus two managed accounts, each through the real handshake
    let owner = h.authorize("1", "curator").await;
    let alice = h.authorize("101", "alice").await;
    let _bob = h.authorize("102", "bob").await;

    h.db.set_account_kind(owner.id, AccountKind::ListOwner)
        .await
        .unwrap();

    // Only alice resolves on the platform
    h.remote.add_user("alice", "101");

    let lists = h.lists();
    let list = lists
        .create_list(owner.id, "Friends", None, ListVisibility::Private)
        .await
        .unwrap();

    let report = lists
        .add_members(list.id, &["alice".to_string(), "bob".to_string()])
        .await
        .unwrap();
    assert_eq!(report.added, 1);
    assert_eq!(report.failed, 1);

    let members = h.db.list_members(list.id).await.unwrap();
    assert_eq!(members.len(), 1);
    assert_eq!(members[0].handle, "alice");
    assert_eq!(members[0].account_id, alice.id);

    lists.remove_member(list.id, "alice").await.unwrap();
    lists.delete_list(list.id).await.unwrap();
    assert!(h.db.get_list(list.id).await.unwrap().is_none());
}

#[tokio::test]
async fn reauthorization_clears_legacy_credentials() {
    let h = harness().await;
    let account = h.authorize("42", "alice").await;
    assert!(!account.has_legacy_credentials());

    // Re-authorize and confirm the account stays singular and active
    let again = h.authorize("42", "alice").await;
    assert_eq!(again.id, account.id);
    assert_eq!(h.db.list_accounts().await.unwrap().len(), 1);
    assert_eq!(again.status, AccountStatus::Active);
}

#[tokio::test]
async fn vault_key_mismatch_fails_closed() {
    let h = harness().await;
    let account = h.authorize("42", "alice").await;

    // A dispatcher wired with a different key cannot decrypt, and the
    // stored ciphertext is never treated as a plaintext token.
    let wrong_vault = Arc::new(Vault::from_base64_key(&Vault::generate_key()).unwrap());
    let dispatcher = Dispatcher::new(h.db.clone(), wrong_vault, h.remote.clone());

    let post = dispatcher.queue(account.id, "hello").await.unwrap();
    let result = dispatcher.dispatch(post.id).await;
    assert!(matches!(result, Err(RoostError::Credential(_))));
    assert_eq!(h.remote.publish_count(), 0);
}
