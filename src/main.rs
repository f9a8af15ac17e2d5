mod config;
mod credentials;
mod error;
mod ip;
mod orchestrator;
mod provider;
mod terminal;
mod wizard;

use anyhow::Result;
use clap::Parser;
use log::info;

use crate::credentials::{AuthKind, CredentialStore, Credentials};
use crate::orchestrator::Orchestrator;
use crate::terminal::{Headless, Terminal};
use crate::wizard::{CredentialSource, Wizard};

#[derive(Parser, Debug)]
#[command(name = "cf-ddns-wizard")]
#[command(about = "Keep Cloudflare DNS records pointed at this machine's public IP")]
struct Args {
    /// Path to the configuration file [default: config.toml, optional]
    #[arg(short, long)]
    config: Option<String>,

    /// Path to the saved credentials (overrides the config file)
    #[arg(long)]
    credentials: Option<String>,

    /// Cloudflare account email
    #[arg(long, requires = "key")]
    email: Option<String>,

    /// Cloudflare global API key, or API token with --token
    #[arg(long, requires = "email")]
    key: Option<String>,

    /// Treat --key as a scoped API token
    #[arg(long, requires = "key")]
    token: bool,

    /// Domain to manage; with --record, runs without prompts
    #[arg(short, long = "domain", requires = "records")]
    domains: Vec<String>,

    /// DNS record to update; with --domain, runs without prompts
    #[arg(short, long = "record", requires = "domains")]
    records: Vec<String>,

    /// Compare and report, but do not change any record
    #[arg(long)]
    dry_run: bool,

    /// Do not save credentials after the run
    #[arg(long)]
    no_save: bool,
}

impl Args {
    fn flag_credentials(&self) -> Option<Credentials> {
        let kind = if self.token {
            AuthKind::ApiToken
        } else {
            AuthKind::GlobalKey
        };
        match (&self.email, &self.key) {
            (Some(email), Some(key)) => Some(Credentials::new(email.trim(), key.trim(), kind)),
            _ => None,
        }
    }

    fn is_headless(&self) -> bool {
        !self.domains.is_empty() && !self.records.is_empty()
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Load configuration first (before logger init)
    let config = config::Config::load_or_default(args.config.as_deref())?;

    // Initialize logger with config log level (env var takes precedence)
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(&config.log_level)
    ).init();

    let store = CredentialStore::new(
        args.credentials
            .as_deref()
            .unwrap_or(&config.credentials_file),
    );
    let initial = args
        .flag_credentials()
        .map(|creds| (creds, CredentialSource::Flags))
        .or_else(|| store.load().map(|creds| (creds, CredentialSource::Stored)));
    info!(
        "Cloudflare API: {}, IP service: {}",
        config.cloudflare.api_base, config.ip.url
    );

    let orchestrator = Orchestrator::new(&config, args.dry_run)?;
    let mut wizard = Wizard::new(orchestrator, initial);

    let report = if args.is_headless() {
        let mut operator = Headless::new(args.domains.clone(), args.records.clone());
        wizard.run(&mut operator).await?
    } else {
        let mut operator = Terminal::stdio();
        wizard.run(&mut operator).await?
    };

    // Credentials are only worth keeping once they got us through a run
    if !args.no_save {
        if let Some(creds) = &wizard.session().credentials {
            store.save(creds)?;
            info!("Saved credentials to {}", store.path().display());
        }
    }

    if report.failed > 0 {
        anyhow::bail!("{} DNS record update(s) failed", report.failed);
    }

    Ok(())
}
