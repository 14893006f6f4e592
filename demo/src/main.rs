//! Mint a custom token or verify an ID token from the command line
//!
//! ```bash
//! authmint-demo --config auth.toml mint alice --claims '{"premium": true}'
//! authmint-demo --config auth.toml verify "$ID_TOKEN"
//! ```
//!
//! Settings may also come from `AUTHMINT_*` environment variables, e.g.
//! `AUTHMINT_PROJECT_ID` or `AUTHMINT_KEY_STORE__FETCH_TIMEOUT_SECS`.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use authmint::{AuthClient, AuthConfig};
use clap::{Parser, Subcommand};
use serde_json::{Map, Value};
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser, Debug)]
#[command(name = "authmint-demo", version, about = "Custom token minting and ID token verification")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Configuration file (TOML, YAML or JSON)
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,

    /// Service-account JSON, overrides the configured credentials
    #[arg(long, global = true, env = "AUTHMINT_CREDENTIALS_FILE")]
    credentials: Option<PathBuf>,

    /// Project id, overrides the configured one
    #[arg(long, global = true)]
    project_id: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sign a custom token for a user
    Mint {
        /// User id, 1 to 128 characters
        uid: String,

        /// Developer claims as a JSON object
        #[arg(long)]
        claims: Option<String>,
    },
    /// Verify an ID token and print its claims
    Verify {
        /// Compact ID token
        token: String,
    },
}

fn load_config(cli: &Cli) -> Result<AuthConfig> {
    let mut config = match &cli.config {
        Some(path) => AuthConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => AuthConfig::default(),
    };
    if let Some(path) = &cli.credentials {
        config.credentials_file = Some(path.clone());
        config.service_account = None;
    }
    if let Some(project_id) = &cli.project_id {
        config.project_id = Some(project_id.clone());
    }
    Ok(config)
}

fn parse_claims(raw: &str) -> Result<Map<String, Value>> {
    match serde_json::from_str(raw).context("--claims is not valid JSON")? {
        Value::Object(map) => Ok(map),
        other => bail!("--claims must be a JSON object, got {other}"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let client = AuthClient::new(&load_config(&cli)?)?;

    match &cli.command {
        Command::Mint { uid, claims } => {
            let claims = claims.as_deref().map(parse_claims).transpose()?;
            let token = client.mint(uid, claims.as_ref())?;
            info!(uid = %uid, signer = client.signer_email().unwrap_or_default(), "minted custom token");
            println!("{token}");
        }
        Command::Verify { token } => {
            let verified = client.verify(token).await?;
            info!(uid = verified.uid(), "ID token verified");
            println!("{}", serde_json::to_string_pretty(&verified)?);
        }
    }

    Ok(())
}
