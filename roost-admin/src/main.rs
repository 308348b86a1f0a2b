//! roost-admin - Administer accounts, lists, and housekeeping
//!
//! Unix-style tool for everything around the queue: initial setup, account
//! management, list synchronization, cleanup, and statistics.

use std::sync::Arc;

use chrono::{Duration, Utc};
use clap::{Parser, Subcommand};
use libroost::types::{ListVisibility, Stats};
use libroost::{
    Account, AccountKind, AccountStatus, Config, Database, HttpRemote, ListSync, MockRemote,
    PostFilter, PostStatus, Remote, Result, RoostError, Vault,
};

#[derive(Parser, Debug)]
#[command(name = "roost-admin")]
#[command(version)]
#[command(about = "Administer accounts, lists, and housekeeping")]
#[command(long_about = "\
roost-admin - Administer accounts, lists, and housekeeping

DESCRIPTION:
    roost-admin covers everything around the post queue: initial setup,
    account status and kind management, platform list synchronization,
    cleanup of old rows, and statistics.

COMMANDS:
    init      Write a configuration skeleton with a fresh vault key
    account   Manage accounts
    list      Manage platform lists
    cleanup   Delete old accounts or posts
    stats     Show aggregate counts

USAGE EXAMPLES:
    # First-time setup
    roost-admin init

    # Inspect accounts
    roost-admin account list --format json

    # Promote an account to list owner
    roost-admin account set-kind alice list_owner

    # Create a list and add members
    roost-admin list create alice \"Friends\" --description \"close ones\"
    roost-admin list add 1 bob carol

    # Purge failed accounts and old failed posts
    roost-admin cleanup accounts --statuses failed,suspended
    roost-admin cleanup posts --status failed --older-than-days 30

CONFIGURATION:
    Configuration file: ~/.config/roost/config.toml
    Database location: ~/.local/share/roost/roost.db

EXIT CODES:
    0 - Success
    1 - Operation failed
    2 - Credential error
    3 - Invalid input
")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Use the in-memory mock platform instead of the real one
    #[arg(long, global = true, hide = true)]
    mock: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write a configuration skeleton with a fresh vault key
    Init,

    /// Manage accounts
    Account {
        #[command(subcommand)]
        command: AccountCommands,
    },

    /// Manage platform lists
    List {
        #[command(subcommand)]
        command: ListCommands,
    },

    /// Delete old accounts or posts
    Cleanup {
        #[command(subcommand)]
        command: CleanupCommands,
    },

    /// Show aggregate counts
    Stats {
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },
}

#[derive(Subcommand, Debug)]
enum AccountCommands {
    /// List all accounts
    List {
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Set an account's status
    SetStatus {
        /// Account handle
        handle: String,
        /// New status (active, failed, suspended, inactive, ...)
        status: String,
    },

    /// Set an account's kind
    SetKind {
        /// Account handle
        handle: String,
        /// New kind: managed or list_owner
        kind: String,
    },

    /// Delete an account and everything attached to it
    Delete {
        /// Account handle
        handle: String,
    },
}

#[derive(Subcommand, Debug)]
enum ListCommands {
    /// Show all lists
    All {
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Create a list owned by a list-owner account
    Create {
        /// Handle of the owning account
        owner: String,
        /// List name
        name: String,
        /// List description
        #[arg(short, long)]
        description: Option<String>,
        /// Make the list public (default private)
        #[arg(long)]
        public: bool,
    },

    /// Rename or re-describe a list
    Update {
        /// List ID
        list_id: i64,
        /// New name
        name: String,
        /// New description
        #[arg(short, long)]
        description: Option<String>,
    },

    /// Delete a list
    Delete {
        /// List ID
        list_id: i64,
    },

    /// Show a list and its members
    Show {
        /// List ID
        list_id: i64,
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Add members by handle
    Add {
        /// List ID
        list_id: i64,
        /// Handles to add
        #[arg(required = true)]
        handles: Vec<String>,
    },

    /// Remove one member by handle
    Remove {
        /// List ID
        list_id: i64,
        /// Handle to remove
        handle: String,
    },
}

#[derive(Subcommand, Debug)]
enum CleanupCommands {
    /// Delete accounts in the given statuses
    Accounts {
        /// Comma-separated statuses to purge
        #[arg(long, default_value = "failed,suspended,inactive")]
        statuses: String,
    },

    /// Delete posts matching the filter
    Posts {
        /// Only posts in this status
        #[arg(long)]
        status: Option<String>,

        /// Only posts created more than this many days ago
        #[arg(long)]
        older_than_days: Option<i64>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if cli.verbose {
        libroost::logging::LoggingConfig::new(
            libroost::logging::LogFormat::Text,
            "debug".to_string(),
            true,
        )
        .init();
    } else {
        libroost::logging::init_default();
    }

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> Result<()> {
    // init runs before any configuration exists
    if matches!(cli.command, Commands::Init) {
        return cmd_init();
    }

    let config = Config::load()?;
    let db = Database::new(&config.database.path).await?;

    match cli.command {
        Commands::Init => unreachable!("handled above"),
        Commands::Account { command } => match command {
            AccountCommands::List { format } => cmd_account_list(&db, &format).await,
            AccountCommands::SetStatus { handle, status } => {
                cmd_account_set_status(&db, &handle, &status).await
            }
            AccountCommands::SetKind { handle, kind } => {
                cmd_account_set_kind(&db, &handle, &kind).await
            }
            AccountCommands::Delete { handle } => cmd_account_delete(&db, &handle).await,
        },
        Commands::List { command } => {
            config.validate()?;
            let vault = Arc::new(Vault::from_base64_key(&config.vault.key)?);
            let remote: Arc<dyn Remote> = if cli.mock {
                Arc::new(MockRemote::new())
            } else {
                Arc::new(HttpRemote::new(&config)?)
            };
            let lists = ListSync::new(db.clone(), vault, remote);
            run_list_command(&db, &lists, command).await
        }
        Commands::Cleanup { command } => match command {
            CleanupCommands::Accounts { statuses } => cmd_cleanup_accounts(&db, &statuses).await,
            CleanupCommands::Posts {
                status,
                older_than_days,
            } => cmd_cleanup_posts(&db, status.as_deref(), older_than_days).await,
        },
        Commands::Stats { format } => cmd_stats(&db, &format).await,
    }
}

fn validate_format(format: &str) -> Result<()> {
    if format != "text" && format != "json" {
        return Err(RoostError::InvalidInput(format!(
            "Invalid format '{}'. Must be 'text' or 'json'",
            format
        )));
    }
    Ok(())
}

fn cmd_init() -> Result<()> {
    let path = libroost::config::resolve_config_path()?;
    if path.exists() {
        return Err(RoostError::Conflict(format!(
            "configuration already exists at {}",
            path.display()
        )));
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| RoostError::InvalidInput(format!("cannot create config dir: {}", e)))?;
    }

    let mut config = Config::default_config();
    config.vault.key = Vault::generate_key();

    let rendered = toml::to_string_pretty(&config)
        .map_err(|e| RoostError::InvalidInput(format!("cannot render config: {}", e)))?;
    std::fs::write(&path, rendered)
        .map_err(|e| RoostError::InvalidInput(format!("cannot write config: {}", e)))?;

    println!("Wrote {}", path.display());
    println!("A fresh vault key was generated. Back it up: losing it makes");
    println!("every stored credential permanently undecryptable.");
    println!("Fill in api.key, oauth.client_id, and oauth.client_secret before use.");
    Ok(())
}

async fn require_account(db: &Database, handle: &str) -> Result<Account> {
    db.get_account_by_handle(handle)
        .await?
        .ok_or_else(|| RoostError::NotFound(format!("account {}", handle)))
}

async fn cmd_account_list(db: &Database, format: &str) -> Result<()> {
    validate_format(format)?;
    let accounts = db.list_accounts().await?;

    if format == "json" {
        let json: Vec<serde_json::Value> = accounts
            .iter()
            .map(|a| {
                serde_json::json!({
                    "id": a.id,
                    "handle": a.handle,
                    "status": a.status.as_str(),
                    "kind": a.kind.as_str(),
                    "legacy_credentials": a.has_legacy_credentials(),
                    "created_at": a.created_at.to_rfc3339(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&json).unwrap());
    } else {
        for account in &accounts {
            let legacy = if account.has_legacy_credentials() {
                " [legacy credentials]"
            } else {
                ""
            };
            println!(
                "{} | @{} | {} | {}{}",
                account.id, account.handle, account.status, account.kind, legacy
            );
        }
    }

    Ok(())
}

async fn cmd_account_set_status(db: &Database, handle: &str, status: &str) -> Result<()> {
    let account = require_account(db, handle).await?;
    let status = AccountStatus::parse(status);
    db.set_account_status(account.id, &status).await?;
    println!("@{} is now {}", handle, status);
    Ok(())
}

async fn cmd_account_set_kind(db: &Database, handle: &str, kind: &str) -> Result<()> {
    let account = require_account(db, handle).await?;
    let kind = AccountKind::parse(kind).ok_or_else(|| {
        RoostError::InvalidInput(format!(
            "Invalid kind '{}'. Must be managed or list_owner",
            kind
        ))
    })?;
    db.set_account_kind(account.id, kind).await?;
    println!("@{} is now {}", handle, kind);
    Ok(())
}

async fn cmd_account_delete(db: &Database, handle: &str) -> Result<()> {
    let account = require_account(db, handle).await?;
    db.delete_account(account.id).await?;
    println!("Deleted @{} and everything attached to it", handle);
    Ok(())
}

async fn run_list_command(db: &Database, lists: &ListSync, command: ListCommands) -> Result<()> {
    match command {
        ListCommands::All { format } => cmd_list_all(db, &format).await,
        ListCommands::Create {
            owner,
            name,
            description,
            public,
        } => {
            let account = require_account(db, &owner).await?;
            let visibility = if public {
                ListVisibility::Public
            } else {
                ListVisibility::Private
            };
            let list = lists
                .create_list(account.id, &name, description.as_deref(), visibility)
                .await?;
            println!("Created list {} ({}) as {}", list.id, list.name, list.remote_id);
            Ok(())
        }
        ListCommands::Update {
            list_id,
            name,
            description,
        } => {
            let list = lists
                .update_list(list_id, &name, description.as_deref())
                .await?;
            println!("Updated list {} ({})", list.id, list.name);
            Ok(())
        }
        ListCommands::Delete { list_id } => {
            lists.delete_list(list_id).await?;
            println!("Deleted list {}", list_id);
            Ok(())
        }
        ListCommands::Show { list_id, format } => cmd_list_show(db, list_id, &format).await,
        ListCommands::Add { list_id, handles } => {
            let report = lists.add_members(list_id, &handles).await?;
            for outcome in &report.outcomes {
                match &outcome.error {
                    None => println!("@{} added", outcome.handle),
                    Some(error) => println!("@{} FAILED: {}", outcome.handle, error),
                }
            }
            println!(
                "{} requested, {} added, {} failed",
                report.requested, report.added, report.failed
            );
            Ok(())
        }
        ListCommands::Remove { list_id, handle } => {
            lists.remove_member(list_id, &handle).await?;
            println!("@{} removed from list {}", handle, list_id);
            Ok(())
        }
    }
}

async fn cmd_list_all(db: &Database, format: &str) -> Result<()> {
    validate_format(format)?;
    let lists = db.list_lists().await?;

    if format == "json" {
        let json: Vec<serde_json::Value> = lists
            .iter()
            .map(|l| {
                serde_json::json!({
                    "id": l.id,
                    "remote_id": l.remote_id,
                    "name": l.name,
                    "description": l.description,
                    "visibility": l.visibility.as_str(),
                    "owner_account_id": l.owner_account_id,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&json).unwrap());
    } else {
        for list in &lists {
            println!(
                "{} | {} | {} | remote {}",
                list.id, list.name, list.visibility, list.remote_id
            );
        }
    }

    Ok(())
}

async fn cmd_list_show(db: &Database, list_id: i64, format: &str) -> Result<()> {
    validate_format(format)?;

    let list = db
        .get_list(list_id)
        .await?
        .ok_or_else(|| RoostError::NotFound(format!("list {}", list_id)))?;
    let members = db.list_members(list_id).await?;

    if format == "json" {
        let json = serde_json::json!({
            "id": list.id,
            "remote_id": list.remote_id,
            "name": list.name,
            "description": list.description,
            "visibility": list.visibility.as_str(),
            "members": members
                .iter()
                .map(|m| {
                    serde_json::json!({
                        "account_id": m.account_id,
                        "handle": m.handle,
                        "status": m.status.as_str(),
                        "added_at": m.added_at.to_rfc3339(),
                    })
                })
                .collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&json).unwrap());
    } else {
        println!("{} ({}) - {} member(s)", list.name, list.visibility, members.len());
        for member in &members {
            println!("  @{} ({})", member.handle, member.status);
        }
    }

    Ok(())
}

async fn cmd_cleanup_accounts(db: &Database, statuses: &str) -> Result<()> {
    let statuses: Vec<AccountStatus> = statuses
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(AccountStatus::parse)
        .collect();

    if statuses.is_empty() {
        return Err(RoostError::InvalidInput(
            "no statuses given to clean up".to_string(),
        ));
    }
    if statuses.contains(&AccountStatus::Active) {
        return Err(RoostError::InvalidInput(
            "refusing to bulk-delete active accounts".to_string(),
        ));
    }

    let deleted = db.delete_accounts_by_status(&statuses).await?;
    println!("Deleted {} account(s)", deleted);
    Ok(())
}

async fn cmd_cleanup_posts(
    db: &Database,
    status: Option<&str>,
    older_than_days: Option<i64>,
) -> Result<()> {
    let mut filter = PostFilter::default();
    if let Some(status) = status {
        let status = PostStatus::parse(status).ok_or_else(|| {
            RoostError::InvalidInput(format!(
                "Invalid status '{}'. Must be pending, posted, or failed",
                status
            ))
        })?;
        filter = filter.status(status);
    }
    if let Some(days) = older_than_days {
        if days < 0 {
            return Err(RoostError::InvalidInput(
                "older-than-days must be non-negative".to_string(),
            ));
        }
        filter = filter.created_before(Utc::now() - Duration::days(days));
    }

    if filter.status.is_none() && filter.created_before.is_none() {
        return Err(RoostError::InvalidInput(
            "refusing to delete all posts; give --status or --older-than-days".to_string(),
        ));
    }

    let deleted = db.delete_posts(&filter).await?;
    println!("Deleted {} post(s)", deleted);
    Ok(())
}

async fn cmd_stats(db: &Database, format: &str) -> Result<()> {
    validate_format(format)?;
    let stats: Stats = db.stats().await?;

    if format == "json" {
        let json = serde_json::json!({
            "accounts": stats.accounts,
            "posts": {
                "total": stats.posts_total,
                "pending": stats.posts_pending,
                "posted": stats.posts_posted,
                "failed": stats.posts_failed,
            },
        });
        println!("{}", serde_json::to_string_pretty(&json).unwrap());
    } else {
        println!("accounts: {}", stats.accounts);
        println!(
            "posts: {} total, {} pending, {} posted, {} failed",
            stats.posts_total, stats.posts_pending, stats.posts_posted, stats.posts_failed
        );
    }

    Ok(())
}
