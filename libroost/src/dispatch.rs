//! Post dispatcher
//!
//! Takes queued posts through their one-way lifecycle: pending to posted on
//! a successful publish, pending to failed with a diagnostic otherwise. Both
//! transitions are guarded on the pending status, so a post is published at
//! most once even under concurrent dispatchers.
//!
//! Credential problems (legacy scheme, undecryptable token) abort before any
//! network call and leave the post pending; re-authorizing the account makes
//! it dispatchable again.

use std::sync::Arc;

use crate::db::Database;
use crate::error::{CredentialError, Result, RoostError};
use crate::remote::Remote;
use crate::types::{Account, Post, PostStatus};
use crate::vault::Vault;

/// Result of one dispatch attempt within a batch.
#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    pub post_id: i64,
    pub remote_id: Option<String>,
    pub error: Option<String>,
}

/// Aggregate result of a batch dispatch. One failed post never stops the
/// rest of the batch.
#[derive(Debug, Clone, Default)]
pub struct DispatchReport {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub outcomes: Vec<DispatchOutcome>,
}

pub struct Dispatcher {
    db: Database,
    vault: Arc<Vault>,
    remote: Arc<dyn Remote>,
}

impl Dispatcher {
    pub fn new(db: Database, vault: Arc<Vault>, remote: Arc<dyn Remote>) -> Self {
        Self { db, vault, remote }
    }

    /// Queue a post for a known account.
    pub async fn queue(&self, account_id: i64, body: &str) -> Result<Post> {
        self.db
            .get_account(account_id)
            .await?
            .ok_or_else(|| RoostError::NotFound(format!("account {}", account_id)))?;

        let post = self.db.create_post(account_id, body).await?;
        tracing::debug!(post_id = post.id, account_id, "post queued");
        Ok(post)
    }

    /// Decrypt the bearer token for an account, refusing legacy credentials.
    fn bearer_token(&self, account: &Account) -> Result<String> {
        if account.has_legacy_credentials() {
            return Err(CredentialError::UnsupportedScheme(format!(
                "account {} holds legacy token+secret credentials; re-authorize it",
                account.handle
            ))
            .into());
        }
        self.vault.decrypt(&account.access_token)
    }

    /// Dispatch a single pending post.
    ///
    /// A post in any other status is a conflict and produces no remote
    /// call. On publish failure the post is marked failed with the remote's
    /// own diagnostic, and the error is returned.
    pub async fn dispatch(&self, post_id: i64) -> Result<Post> {
        let post = self
            .db
            .get_post(post_id)
            .await?
            .ok_or_else(|| RoostError::NotFound(format!("post {}", post_id)))?;

        if post.status != PostStatus::Pending {
            return Err(RoostError::Conflict(format!(
                "post {} is {}, not pending",
                post_id, post.status
            )));
        }

        let account = self
            .db
            .get_account(post.account_id)
            .await?
            .ok_or_else(|| RoostError::NotFound(format!("account {}", post.account_id)))?;

        let token = self.bearer_token(&account)?;

        match self.remote.publish(&token, &post.body).await {
            Ok(remote_id) => {
                let won = self.db.mark_post_posted(post_id, &remote_id).await?;
                if !won {
                    // Published remotely, but another dispatcher settled the
                    // row first. Surface it rather than overwrite.
                    tracing::warn!(post_id, %remote_id, "post settled concurrently after publish");
                    return Err(RoostError::Conflict(format!(
                        "post {} was dispatched concurrently",
                        post_id
                    )));
                }

                tracing::info!(post_id, %remote_id, handle = %account.handle, "post published");
                self.db
                    .get_post(post_id)
                    .await?
                    .ok_or_else(|| RoostError::NotFound(format!("post {}", post_id)))
            }
            Err(e) => {
                let diagnostic = e.to_string();
                self.db.mark_post_failed(post_id, &diagnostic).await?;
                tracing::warn!(post_id, handle = %account.handle, error = %diagnostic, "publish failed");
                Err(e)
            }
        }
    }

    /// Dispatch every pending post, continuing past failures.
    pub async fn dispatch_all_pending(&self) -> Result<DispatchReport> {
        let pending = self.db.pending_posts().await?;
        let mut report = DispatchReport {
            attempted: pending.len(),
            ..Default::default()
        };

        for post in pending {
            match self.dispatch(post.id).await {
                Ok(dispatched) => {
                    report.succeeded += 1;
                    report.outcomes.push(DispatchOutcome {
                        post_id: post.id,
                        remote_id: dispatched.remote_id,
                        error: None,
                    });
                }
                Err(e) => {
                    report.failed += 1;
                    report.outcomes.push(DispatchOutcome {
                        post_id: post.id,
                        remote_id: None,
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        tracing::info!(
            attempted = report.attempted,
            succeeded = report.succeeded,
            failed = report.failed,
            "batch dispatch finished"
        );

        Ok(report)
    }
}
