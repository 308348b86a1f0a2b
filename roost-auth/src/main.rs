//! roost-auth - Authorize accounts via OAuth2
//!
//! Unix-style tool for the two halves of the authorization handshake.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use libroost::{AuthFlow, Config, Database, HttpRemote, MockRemote, Remote, Result, Vault};

#[derive(Parser, Debug)]
#[command(name = "roost-auth")]
#[command(version)]
#[command(about = "Authorize accounts via OAuth2")]
#[command(long_about = "\
roost-auth - Authorize accounts via OAuth2

DESCRIPTION:
    roost-auth drives the PKCE authorization handshake. `start` prints an
    authorization URL to open in a browser; after the platform redirects,
    `finish` redeems the callback's state and code and stores the account
    with its tokens encrypted at rest.

COMMANDS:
    start     Begin a handshake and print the authorization URL
    finish    Complete a handshake from the callback parameters
    purge     Delete expired handshake states

USAGE EXAMPLES:
    # Begin a handshake
    roost-auth start

    # Complete it with the state and code from the callback
    roost-auth finish --state <STATE> --code <CODE>

    # Drop stale handshake states
    roost-auth purge

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
    2 - Credential or authorization error
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
    /// Begin a handshake and print the authorization URL
    Start {
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Complete a handshake from the callback parameters
    Finish {
        /// The state parameter from the callback
        #[arg(long)]
        state: String,

        /// The authorization code from the callback
        #[arg(long)]
        code: String,

        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Delete expired handshake states
    Purge,
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

    let flow = AuthFlow::new(db, vault, remote, &config);

    match cli.command {
        Commands::Start { format } => cmd_start(&flow, &format).await,
        Commands::Finish {
            state,
            code,
            format,
        } => cmd_finish(&flow, &state, &code, &format).await,
        Commands::Purge => cmd_purge(&flow).await,
    }
}

fn validate_format(format: &str) -> Result<()> {
    if format != "text" && format != "json" {
        return Err(libroost::RoostError::InvalidInput(format!(
            "Invalid format '{}'. Must be 'text' or 'json'",
            format
        )));
    }
    Ok(())
}

async fn cmd_start(flow: &AuthFlow, format: &str) -> Result<()> {
    validate_format(format)?;

    let auth = flow.initiate().await?;

    if format == "json" {
        let json = serde_json::json!({
            "url": auth.url,
            "state": auth.state,
        });
        println!("{}", serde_json::to_string_pretty(&json).unwrap());
    } else {
        println!("Open this URL in a browser to authorize the account:");
        println!();
        println!("  {}", auth.url);
        println!();
        println!("State: {}", auth.state);
    }

    Ok(())
}

async fn cmd_finish(flow: &AuthFlow, state: &str, code: &str, format: &str) -> Result<()> {
    validate_format(format)?;

    let account = flow.complete(state, code).await?;

    if format == "json" {
        let json = serde_json::json!({
            "id": account.id,
            "handle": account.handle,
            "status": account.status.as_str(),
            "kind": account.kind.as_str(),
        });
        println!("{}", serde_json::to_string_pretty(&json).unwrap());
    } else {
        println!("Authorized @{} (account {})", account.handle, account.id);
    }

    Ok(())
}

async fn cmd_purge(flow: &AuthFlow) -> Result<()> {
    let purged = flow.purge_expired().await?;
    println!("Purged {} expired handshake state(s)", purged);
    Ok(())
}
