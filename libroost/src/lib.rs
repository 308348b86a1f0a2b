//! Roost - multi-account publishing for a single social platform
//!
//! This library provides the core functionality behind the Roost tools:
//! OAuth2 (PKCE) account authorization with encrypted credential storage,
//! a guarded post dispatcher, and remote-first list synchronization.

pub mod auth;
pub mod config;
pub mod db;
pub mod dispatch;
pub mod error;
pub mod lists;
pub mod logging;
pub mod pkce;
pub mod remote;
pub mod types;
pub mod vault;

// Re-export commonly used types
pub use auth::{AuthFlow, Authorization};
pub use config::Config;
pub use db::{Database, PostFilter};
pub use dispatch::{DispatchReport, Dispatcher};
pub use error::{Result, RoostError};
pub use lists::{ListSync, MemberReport};
pub use remote::{HttpRemote, MockRemote, Remote};
pub use types::{Account, AccountKind, AccountStatus, List, Post, PostStatus};
pub use vault::Vault;
