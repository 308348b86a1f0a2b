//! List synchronization
//!
//! Lists live on the remote platform; the local rows are a mirror. Every
//! mutation goes remote-first: the local row changes only after the platform
//! accepted the operation, so the mirror never claims something the platform
//! refused.

use std::sync::Arc;

use crate::db::Database;
use crate::error::{CredentialError, Result, RoostError};
use crate::remote::Remote;
use crate::types::{Account, AccountKind, List, ListVisibility};
use crate::vault::Vault;

/// Result for one handle in a membership batch.
#[derive(Debug, Clone)]
pub struct MemberOutcome {
    pub handle: String,
    pub error: Option<String>,
}

/// Aggregate result of a membership batch. Failed handles never stop the
/// rest of the batch.
#[derive(Debug, Clone, Default)]
pub struct MemberReport {
    pub requested: usize,
    pub added: usize,
    pub failed: usize,
    pub outcomes: Vec<MemberOutcome>,
}

pub struct ListSync {
    db: Database,
    vault: Arc<Vault>,
    remote: Arc<dyn Remote>,
}

impl ListSync {
    pub fn new(db: Database, vault: Arc<Vault>, remote: Arc<dyn Remote>) -> Self {
        Self { db, vault, remote }
    }

    /// Resolve the owning account of a list and its decrypted bearer token.
    async fn owner_token(&self, list: &List) -> Result<(Account, String)> {
        let owner = self
            .db
            .get_account(list.owner_account_id)
            .await?
            .ok_or_else(|| {
                RoostError::NotFound(format!("owner account {}", list.owner_account_id))
            })?;
        let token = self.decrypt_token(&owner)?;
        Ok((owner, token))
    }

    fn decrypt_token(&self, account: &Account) -> Result<String> {
        if account.has_legacy_credentials() {
            return Err(CredentialError::UnsupportedScheme(format!(
                "account {} holds legacy token+secret credentials; re-authorize it",
                account.handle
            ))
            .into());
        }
        self.vault.decrypt(&account.access_token)
    }

    /// Create a list on the platform under a list-owner account, then
    /// mirror it locally.
    ///
    /// Only accounts of kind `list_owner` may own lists; the check happens
    /// before any network call.
    pub async fn create_list(
        &self,
        owner_account_id: i64,
        name: &str,
        description: Option<&str>,
        visibility: ListVisibility,
    ) -> Result<List> {
        if name.trim().is_empty() {
            return Err(RoostError::InvalidInput("list name is empty".to_string()));
        }

        let owner = self
            .db
            .get_account(owner_account_id)
            .await?
            .ok_or_else(|| RoostError::NotFound(format!("account {}", owner_account_id)))?;

        if owner.kind != AccountKind::ListOwner {
            return Err(RoostError::InvalidInput(format!(
                "account {} is not a list owner",
                owner.handle
            )));
        }

        let token = self.decrypt_token(&owner)?;
        let remote_id = self
            .remote
            .create_list(&token, name, description, visibility.is_private())
            .await?;

        let list = self
            .db
            .insert_list(&remote_id, name, description, visibility, owner.id)
            .await?;

        tracing::info!(list_id = list.id, %remote_id, owner = %owner.handle, "list created");
        Ok(list)
    }

    /// Rename or re-describe a list, remote-first.
    pub async fn update_list(
        &self,
        list_id: i64,
        name: &str,
        description: Option<&str>,
    ) -> Result<List> {
        if name.trim().is_empty() {
            return Err(RoostError::InvalidInput("list name is empty".to_string()));
        }

        let list = self
            .db
            .get_list(list_id)
            .await?
            .ok_or_else(|| RoostError::NotFound(format!("list {}", list_id)))?;
        let (_owner, token) = self.owner_token(&list).await?;

        self.remote
            .update_list(&token, &list.remote_id, name, description)
            .await?;
        self.db.update_list_row(list_id, name, description).await?;

        self.db
            .get_list(list_id)
            .await?
            .ok_or_else(|| RoostError::NotFound(format!("list {}", list_id)))
    }

    /// Delete a list, remote-first. Memberships cascade locally.
    pub async fn delete_list(&self, list_id: i64) -> Result<()> {
        let list = self
            .db
            .get_list(list_id)
            .await?
            .ok_or_else(|| RoostError::NotFound(format!("list {}", list_id)))?;
        let (_owner, token) = self.owner_token(&list).await?;

        self.remote.delete_list(&token, &list.remote_id).await?;
        self.db.delete_list_row(list_id).await?;

        tracing::info!(list_id, remote_id = %list.remote_id, "list deleted");
        Ok(())
    }

    /// Add members to a list by handle, continuing past per-handle failures.
    ///
    /// Each handle must name a local account and must resolve on the
    /// platform; the remote addition precedes the local membership row.
    pub async fn add_members(&self, list_id: i64, handles: &[String]) -> Result<MemberReport> {
        let list = self
            .db
            .get_list(list_id)
            .await?
            .ok_or_else(|| RoostError::NotFound(format!("list {}", list_id)))?;
        let (_owner, token) = self.owner_token(&list).await?;

        let mut report = MemberReport {
            requested: handles.len(),
            ..Default::default()
        };

        for handle in handles {
            match self.add_one_member(&list, &token, handle).await {
                Ok(()) => {
                    report.added += 1;
                    report.outcomes.push(MemberOutcome {
                        handle: handle.clone(),
                        error: None,
                    });
                }
                Err(e) => {
                    tracing::warn!(list_id, %handle, error = %e, "member add failed");
                    report.failed += 1;
                    report.outcomes.push(MemberOutcome {
                        handle: handle.clone(),
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        tracing::info!(
            list_id,
            requested = report.requested,
            added = report.added,
            failed = report.failed,
            "membership batch finished"
        );

        Ok(report)
    }

    async fn add_one_member(&self, list: &List, token: &str, handle: &str) -> Result<()> {
        let account = self
            .db
            .get_account_by_handle(handle)
            .await?
            .ok_or_else(|| RoostError::NotFound(format!("account {}", handle)))?;

        // Existing members fail the handle without touching the platform
        if self.db.is_list_member(list.id, account.id).await? {
            return Err(RoostError::Conflict(format!(
                "{} is already a member of list {}",
                handle, list.id
            )));
        }

        let remote_user = self.remote.user_by_handle(token, handle).await?;
        self.remote
            .add_list_member(token, &list.remote_id, &remote_user.id)
            .await?;

        self.db.add_list_member(list.id, account.id).await?;
        Ok(())
    }

    /// Remove a member by handle, remote-first.
    pub async fn remove_member(&self, list_id: i64, handle: &str) -> Result<()> {
        let list = self
            .db
            .get_list(list_id)
            .await?
            .ok_or_else(|| RoostError::NotFound(format!("list {}", list_id)))?;
        let (_owner, token) = self.owner_token(&list).await?;

        let account = self
            .db
            .get_account_by_handle(handle)
            .await?
            .ok_or_else(|| RoostError::NotFound(format!("account {}", handle)))?;

        // Non-members fail before the platform is asked anything
        if !self.db.is_list_member(list.id, account.id).await? {
            return Err(RoostError::NotFound(format!(
                "{} is not a member of list {}",
                handle, list_id
            )));
        }

        let remote_user = self.remote.user_by_handle(&token, handle).await?;
        self.remote
            .remove_list_member(&token, &list.remote_id, &remote_user.id)
            .await?;
        self.db.remove_list_member(list.id, account.id).await?;

        tracing::info!(list_id, %handle, "member removed");
        Ok(())
    }
}
