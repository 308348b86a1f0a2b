//! roost-send - Queue and dispatch posts
//!
//! Unix-style tool for the post queue: add posts, dispatch them one at a
//! time or as a batch, and inspect what happened.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use libroost::{
    Config, Database, Dispatcher, HttpRemote, MockRemote, Post, PostFilter, PostStatus, Remote,
    Result, RoostError, Vault,
};

#[derive(Parser, Debug)]
#[command(name = "roost-send")]
#[command(version)]
#[command(about = "Queue and dispatch posts")]
#[command(long_about = "\
roost-send - Queue and dispatch posts

DESCRIPTION:
    roost-send manages the post queue. Posts are queued for an authorized
    account and dispatched to the platform; each post is published at most
    once, and failures keep the platform's own diagnostic.

COMMANDS:
    queue     Queue a post for an account
    dispatch  Dispatch a single pending post
    run       Dispatch every pending post
    list      List posts

USAGE EXAMPLES:
    # Queue a post for @alice
    roost-send queue alice \"hello world\"

    # Read the body from stdin
    echo \"hello world\" | roost-send queue alice -

    # Dispatch one post
    roost-send dispatch 42

    # Dispatch everything pending
    roost-send run

    # Show failed posts as JSON
    roost-send list --status failed --format json

CONFIGURATION:
    Configuration file: ~/.config/roost/config.toml
    Database location: ~/.local/share/roost/roost.db

    Override with environment variables:
        ROOST_CONFIG     - Path to config file
        ROOST_DB_PATH    - Path to database file
        ROOST_VAULT_KEY  - Base64 vault key

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
    /// Queue a post for an account
    Queue {
        /// Account handle
        handle: String,

        /// Post body; use "-" to read from stdin
        body: String,
    },

    /// Dispatch a single pending post
    Dispatch {
        /// Post ID to dispatch
        post_id: i64,
    },

    /// Dispatch every pending post
    Run {
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// List posts
    List {
        /// Filter by status: pending, posted, or failed
        #[arg(short, long)]
        status: Option<String>,

        /// Filter by account handle
        #[arg(short, long)]
        account: Option<String>,

        /// Maximum number of posts to show
        #[arg(short, long, default_value = "20")]
        limit: usize,

        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
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
    let config = Config::load()?;
    config.validate()?;

    let db = Database::new(&config.database.path).await?;
    let vault = Arc::new(Vault::from_base64_key(&config.vault.key)?);
    let remote: Arc<dyn Remote> = if cli.mock {
        Arc::new(MockRemote::new())
    } else {
        Arc::new(HttpRemote::new(&config)?)
    };

    let dispatcher = Dispatcher::new(db.clone(), vault, remote);

    match cli.command {
        Commands::Queue { handle, body } => cmd_queue(&db, &dispatcher, &handle, &body).await,
        Commands::Dispatch { post_id } => cmd_dispatch(&dispatcher, post_id).await,
        Commands::Run { format } => cmd_run(&dispatcher, &format).await,
        Commands::List {
            status,
            account,
            limit,
            format,
        } => cmd_list(&db, status.as_deref(), account.as_deref(), limit, &format).await,
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

async fn cmd_queue(db: &Database, dispatcher: &Dispatcher, handle: &str, body: &str) -> Result<()> {
    let body = if body == "-" {
        let mut buffer = String::new();
        use std::io::Read;
        std::io::stdin()
            .read_to_string(&mut buffer)
            .map_err(|e| RoostError::InvalidInput(format!("failed to read stdin: {}", e)))?;
        buffer.trim_end().to_string()
    } else {
        body.to_string()
    };

    let account = db
        .get_account_by_handle(handle)
        .await?
        .ok_or_else(|| RoostError::NotFound(format!("account {}", handle)))?;

    let post = dispatcher.queue(account.id, &body).await?;
    println!("Queued post {} for @{}", post.id, handle);
    Ok(())
}

async fn cmd_dispatch(dispatcher: &Dispatcher, post_id: i64) -> Result<()> {
    let post = dispatcher.dispatch(post_id).await?;
    println!(
        "Published post {} as {}",
        post.id,
        post.remote_id.as_deref().unwrap_or("?")
    );
    Ok(())
}

async fn cmd_run(dispatcher: &Dispatcher, format: &str) -> Result<()> {
    validate_format(format)?;

    let report = dispatcher.dispatch_all_pending().await?;

    if format == "json" {
        let outcomes: Vec<serde_json::Value> = report
            .outcomes
            .iter()
            .map(|o| {
                serde_json::json!({
                    "post_id": o.post_id,
                    "remote_id": o.remote_id,
                    "error": o.error,
                })
            })
            .collect();
        let json = serde_json::json!({
            "attempted": report.attempted,
            "succeeded": report.succeeded,
            "failed": report.failed,
            "outcomes": outcomes,
        });
        println!("{}", serde_json::to_string_pretty(&json).unwrap());
    } else {
        for outcome in &report.outcomes {
            match (&outcome.remote_id, &outcome.error) {
                (Some(remote_id), _) => {
                    println!("post {} -> {}", outcome.post_id, remote_id)
                }
                (None, Some(error)) => println!("post {} FAILED: {}", outcome.post_id, error),
                (None, None) => {}
            }
        }
        println!(
            "{} attempted, {} succeeded, {} failed",
            report.attempted, report.succeeded, report.failed
        );
    }

    Ok(())
}

async fn cmd_list(
    db: &Database,
    status: Option<&str>,
    account: Option<&str>,
    limit: usize,
    format: &str,
) -> Result<()> {
    validate_format(format)?;

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
    if let Some(handle) = account {
        let account = db
            .get_account_by_handle(handle)
            .await?
            .ok_or_else(|| RoostError::NotFound(format!("account {}", handle)))?;
        filter = filter.account(account.id);
    }

    let posts = db.query_posts(&filter, limit).await?;

    if format == "json" {
        output_list_json(&posts);
    } else {
        output_list_text(&posts);
    }

    Ok(())
}

fn output_list_json(posts: &[Post]) {
    let json: Vec<serde_json::Value> = posts
        .iter()
        .map(|p| {
            serde_json::json!({
                "id": p.id,
                "account_id": p.account_id,
                "body": p.body,
                "status": p.status.as_str(),
                "remote_id": p.remote_id,
                "error": p.error,
                "created_at": p.created_at.to_rfc3339(),
                "posted_at": p.posted_at.map(|t| t.to_rfc3339()),
            })
        })
        .collect();

    println!("{}", serde_json::to_string_pretty(&json).unwrap());
}

fn output_list_text(posts: &[Post]) {
    for post in posts {
        println!(
            "{} | {} | {} | {}",
            post.id,
            post.status,
            post.created_at.format("%Y-%m-%d %H:%M"),
            truncate_body(&post.body, 50)
        );
    }
}

/// Truncate body to max length with ellipsis, on a char boundary
fn truncate_body(body: &str, max_len: usize) -> String {
    if body.chars().count() <= max_len {
        body.to_string()
    } else {
        format!("{}...", body.chars().take(max_len).collect::<String>())
    }
}
