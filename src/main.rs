//! casebridge - JIRA to Salesforce case synchronization
//!
//! Main entry point for the casebridge CLI.

use casebridge::config::{validate_config, validate_config_result, BridgeConfig};
use casebridge::crm::{CrmGateway, SalesforceGateway};
use casebridge::host::{FieldCatalog, JiraClient};
use casebridge::model::EventKind;
use casebridge::notify::{LogNotifier, Notifier, SmtpNotifier};
use casebridge::server::WebhookServer;
use casebridge::sync::{IssueSyncHandler, SyncOutcome};
use casebridge::{BridgeError, Result};
use clap::{Parser, Subcommand};
use std::process;
use std::sync::Arc;

/// casebridge - Mirror JIRA issues into Salesforce cases
#[derive(Parser, Debug)]
#[command(name = "casebridge")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to config file (default: ~/.config/casebridge/config.yaml)
    #[arg(short, long, env = "CASEBRIDGE_CONFIG", global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the JIRA webhook listener
    Serve {
        /// Listen address (overrides server.listen)
        #[arg(short, long)]
        listen: Option<String>,
    },

    /// Sync a single issue now, as if an event had arrived
    Sync {
        /// Issue key (e.g., PROJ-123)
        key: String,

        /// Event to simulate (created, updated, closed, resolved, assigned, started)
        #[arg(short, long, default_value = "updated")]
        event: EventKind,
    },

    /// Check the Salesforce credentials
    Login,

    /// Validate the configuration file
    CheckConfig,
}

impl Commands {
    fn default_log_level(&self) -> &'static str {
        match self {
            Commands::Serve { .. } => "info",
            _ => "warn",
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize logging
    if let Err(e) = casebridge::logging::init(cli.command.default_log_level()) {
        eprintln!("Failed to initialize logging: {}", e);
    }

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::CheckConfig => check_config(&config),
        Commands::Login => login(&config).await,
        Commands::Sync { key, event } => sync_issue(&config, &key, event).await,
        Commands::Serve { listen } => serve(&config, listen).await,
    }
}

fn load_config(path: Option<&str>) -> Result<BridgeConfig> {
    match path {
        Some(path) => BridgeConfig::load(path),
        None => match BridgeConfig::load_default() {
            Ok(config) => Ok(config),
            Err(BridgeError::Config(msg)) if msg.contains("Config file not found") => {
                Err(BridgeError::Config(format!(
                    "No configuration found at {}.\n\n\
                     Create it with the salesforce, jira and sync sections, or pass --config.",
                    BridgeConfig::default_path().display()
                )))
            }
            Err(e) => Err(e),
        },
    }
}

fn check_config(config: &BridgeConfig) -> Result<()> {
    match validate_config(config) {
        Ok(()) => {
            println!("Configuration OK");
            println!(
                "  Tracked projects: {}",
                config.sync.tracked_projects.join(", ")
            );
            println!(
                "  Notifications:    {}",
                if config.mail.is_some() { "smtp" } else { "log only" }
            );
            Ok(())
        }
        Err(errors) => {
            for error in &errors {
                println!("  ✗ {}", error);
            }
            Err(BridgeError::Config(format!(
                "{} configuration error(s)",
                errors.len()
            )))
        }
    }
}

async fn login(config: &BridgeConfig) -> Result<()> {
    let sync = config.sync_config()?;
    let crm = SalesforceGateway::new(&config.salesforce, &sync)?;
    let session = crm.authenticate().await?;

    println!(
        "Logged in to {} as {}",
        session.instance_url(),
        sync.crm_username
    );
    if session.password_expired {
        println!("  ⚠ The Salesforce password has expired");
    }
    Ok(())
}

/// JIRA client with the managed fields resolved
async fn connect_jira(config: &BridgeConfig) -> Result<Arc<JiraClient>> {
    let jira = JiraClient::new(&config.jira, config.jira_token())?;
    let definitions = jira.list_fields().await?;
    let catalog = FieldCatalog::resolve(&config.jira.fields, &definitions)?;
    tracing::info!(fields = definitions.len(), "JIRA custom fields resolved");
    Ok(Arc::new(jira.with_catalog(catalog)))
}

fn build_handler(config: &BridgeConfig, jira: Arc<JiraClient>) -> Result<IssueSyncHandler> {
    let sync = config.sync_config()?;
    let crm = Arc::new(SalesforceGateway::new(&config.salesforce, &sync)?);

    let notifier: Arc<dyn Notifier> = match config.mail {
        Some(ref mail) => Arc::new(SmtpNotifier::new(mail)?),
        None => {
            tracing::warn!("No mail section configured; notifications will only be logged");
            Arc::new(LogNotifier)
        }
    };

    Ok(IssueSyncHandler::new(sync, crm, jira, notifier)
        .with_issue_url_base(config.jira.url.as_str())
        .with_record_url_base(config.salesforce.record_url_base.clone()))
}

async fn sync_issue(config: &BridgeConfig, key: &str, event: EventKind) -> Result<()> {
    validate_config_result(config)?;
    let jira = connect_jira(config).await?;
    let snapshot = jira.get_snapshot(key).await?;
    let handler = build_handler(config, jira)?;

    let outcome = handler.handle(event, &snapshot).await;
    println!("{} ({}): {}", key, event, outcome);

    match outcome {
        SyncOutcome::Unsynced { error } => Err(BridgeError::Other(error)),
        _ => Ok(()),
    }
}

async fn serve(config: &BridgeConfig, listen: Option<String>) -> Result<()> {
    validate_config_result(config)?;
    let jira = connect_jira(config).await?;
    let catalog = jira.catalog().clone();
    let handler = build_handler(config, jira.clone())?;

    let addr = listen.unwrap_or_else(|| config.server.listen.clone());
    WebhookServer::new(
        handler,
        jira,
        catalog,
        config.jira.fields.clone(),
        &config.server,
    )
    .run(&addr)
    .await
    .map_err(|e| BridgeError::Other(e.to_string()))
}
