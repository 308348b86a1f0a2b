//! Core types for Roost

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a managed account.
///
/// The well-known states drive cleanup policy; anything else an operator has
/// set (via the admin surface) is carried through as `Custom`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Active,
    Failed,
    Suspended,
    Inactive,
    #[serde(untagged)]
    Custom(String),
}

impl AccountStatus {
    pub fn as_str(&self) -> &str {
        match self {
            AccountStatus::Active => "active",
            AccountStatus::Failed => "failed",
            AccountStatus::Suspended => "suspended",
            AccountStatus::Inactive => "inactive",
            AccountStatus::Custom(s) => s,
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "active" => AccountStatus::Active,
            "failed" => AccountStatus::Failed,
            "suspended" => AccountStatus::Suspended,
            "inactive" => AccountStatus::Inactive,
            other => AccountStatus::Custom(other.to_string()),
        }
    }
}

impl std::fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Classification of an account: a posting account or a list owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountKind {
    Managed,
    ListOwner,
}

impl AccountKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountKind::Managed => "managed",
            AccountKind::ListOwner => "list_owner",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "managed" => Some(AccountKind::Managed),
            "list_owner" => Some(AccountKind::ListOwner),
            _ => None,
        }
    }
}

impl std::fmt::Display for AccountKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A social-media account and its vault-encrypted credentials.
///
/// `access_token` is always present and encrypted. A non-empty
/// `access_token_secret` marks the legacy token+secret credential scheme,
/// which the dispatcher refuses (re-authorization is the fix). `kind`
/// always has a defined value; rows created before the column existed read
/// back as `Managed` via the schema default.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: i64,
    pub handle: String,
    #[serde(skip_serializing)]
    pub access_token: String,
    #[serde(skip_serializing)]
    pub access_token_secret: Option<String>,
    #[serde(skip_serializing)]
    pub refresh_token: Option<String>,
    pub status: AccountStatus,
    pub kind: AccountKind,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Account {
    /// Whether the stored credentials use the legacy token+secret scheme.
    pub fn has_legacy_credentials(&self) -> bool {
        self.access_token_secret
            .as_deref()
            .map(|s| !s.trim().is_empty())
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    Pending,
    Posted,
    Failed,
}

impl PostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostStatus::Pending => "pending",
            PostStatus::Posted => "posted",
            PostStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(PostStatus::Pending),
            "posted" => Some(PostStatus::Posted),
            "failed" => Some(PostStatus::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for PostStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A queued text post.
///
/// `remote_id` is set exactly when `status` is `Posted`. `error` records the
/// diagnostic from the last failed dispatch attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: i64,
    pub account_id: i64,
    pub body: String,
    pub status: PostStatus,
    pub remote_id: Option<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub posted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListVisibility {
    Private,
    Public,
}

impl ListVisibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListVisibility::Private => "private",
            ListVisibility::Public => "public",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "private" => Some(ListVisibility::Private),
            "public" => Some(ListVisibility::Public),
            _ => None,
        }
    }

    pub fn is_private(&self) -> bool {
        matches!(self, ListVisibility::Private)
    }
}

impl std::fmt::Display for ListVisibility {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A list mirrored from the remote platform, keyed by its remote identifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct List {
    pub id: i64,
    pub remote_id: String,
    pub name: String,
    pub description: Option<String>,
    pub visibility: ListVisibility,
    pub owner_account_id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// A list member joined with its account row, for read surfaces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListMember {
    pub account_id: i64,
    pub handle: String,
    pub status: AccountStatus,
    pub added_at: DateTime<Utc>,
}

/// Aggregate counts for the stats surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stats {
    pub accounts: i64,
    pub posts_total: i64,
    pub posts_pending: i64,
    pub posts_posted: i64,
    pub posts_failed: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_status_round_trip() {
        for s in ["active", "failed", "suspended", "inactive"] {
            assert_eq!(AccountStatus::parse(s).as_str(), s);
        }
        let custom = AccountStatus::parse("quarantined");
        assert_eq!(custom, AccountStatus::Custom("quarantined".to_string()));
        assert_eq!(custom.as_str(), "quarantined");
    }

    #[test]
    fn test_account_kind_parse() {
        assert_eq!(AccountKind::parse("managed"), Some(AccountKind::Managed));
        assert_eq!(AccountKind::parse("list_owner"), Some(AccountKind::ListOwner));
        assert_eq!(AccountKind::parse("owner"), None);
    }

    #[test]
    fn test_legacy_credential_detection() {
        let mut account = Account {
            id: 1,
            handle: "alice".to_string(),
            access_token: "enc".to_string(),
            access_token_secret: None,
            refresh_token: None,
            status: AccountStatus::Active,
            kind: AccountKind::Managed,
            created_at: Utc::now(),
            updated_at: None,
        };
        assert!(!account.has_legacy_credentials());

        account.access_token_secret = Some("  ".to_string());
        assert!(!account.has_legacy_credentials());

        account.access_token_secret = Some("secret".to_string());
        assert!(account.has_legacy_credentials());
    }

    #[test]
    fn test_post_status_parse_rejects_unknown() {
        assert_eq!(PostStatus::parse("pending"), Some(PostStatus::Pending));
        assert_eq!(PostStatus::parse("draft"), None);
    }
}
