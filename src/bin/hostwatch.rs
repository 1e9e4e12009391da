use std::net::IpAddr;
use std::sync::Arc;

use chrono::Local;
use clap::{Parser, Subcommand};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_appender::rolling;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use hostwatch::config::ServerConfig;
use hostwatch::db::SqliteStore;
use hostwatch::db::models::OwnerId;
use hostwatch::hosting::{HostingProvider, HostingRegistry};
use hostwatch::monitoring::{MonitoringService, MonitoringSettings, NetworkProber, SafetyPolicy};
use hostwatch::notifications::NotificationService;
use hostwatch::notifications::encryption::EncryptionService;
use hostwatch::reminders::{ReminderService, ReminderSettings};
use hostwatch::version::VERSION;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the monitoring and reminder drivers until interrupted (default)
    Run,
    /// Check whether an IP or URL may be probed
    Check { address: String },
    /// Send payment reminders once and exit
    RemindNow,
    /// Verify and store an encrypted hosting API key
    SetApiKey {
        #[arg(long)]
        owner: OwnerId,
        #[arg(long, default_value = "4vps")]
        provider: HostingProvider,
        #[arg(long)]
        key: String,
    },
    /// List servers at a hosting provider using the stored API key
    HostingServers {
        #[arg(long)]
        owner: OwnerId,
        #[arg(long, default_value = "4vps")]
        provider: HostingProvider,
    },
}

fn init_logging(log_dir: &str) {
    // Log to a file: JSON format, daily rotation
    let file_appender = rolling::daily(log_dir, "hostwatch.log");
    let file_layer = fmt::layer()
        .with_writer(file_appender)
        .with_ansi(false)
        .json();

    // Log to stdout: human-readable format
    let stdout_layer = fmt::layer().with_writer(std::io::stdout);

    // Default to `info,sqlx=warn` if RUST_LOG is not set.
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stdout_layer)
        .init();
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let args = Args::parse();

    let config = ServerConfig::load(args.config.as_deref())?;
    init_logging(&config.log_dir);
    info!("Starting hostwatch, version: {}", VERSION);

    match args.command.unwrap_or(Command::Run) {
        Command::Run => run(config).await,
        Command::Check { address } => {
            check(&config, &address);
            Ok(())
        }
        Command::RemindNow => remind_now(config).await,
        Command::SetApiKey {
            owner,
            provider,
            key,
        } => set_api_key(&config, owner, provider, &key).await,
        Command::HostingServers { owner, provider } => {
            hosting_servers(&config, owner, provider).await
        }
    }
}

async fn run(config: ServerConfig) -> Result<(), BoxError> {
    let notifier = Arc::new(NotificationService::from_config(config.require_delivery()?)?);
    let store = Arc::new(SqliteStore::connect(&config.database_url).await?);
    let prober = Arc::new(NetworkProber::new(config.monitoring.ip_probe_ports.clone())?);

    let monitoring = Arc::new(MonitoringService::new(
        store.clone(),
        notifier.clone(),
        prober,
        SafetyPolicy::from_config(&config.safety),
        MonitoringSettings::from_config(&config.monitoring),
    ));
    let reminders = Arc::new(ReminderService::new(
        store,
        notifier,
        ReminderSettings::from_config(&config.reminders)?,
    ));

    let shutdown = CancellationToken::new();

    let monitoring_task = tokio::spawn({
        let shutdown = shutdown.clone();
        async move { monitoring.run(shutdown).await }
    });
    let reminder_task = tokio::spawn({
        let shutdown = shutdown.clone();
        async move { reminders.run(shutdown).await }
    });

    shutdown_signal().await;
    info!("Shutdown signal received, stopping drivers.");
    shutdown.cancel();

    if let Err(e) = monitoring_task.await {
        error!(error = %e, "Monitoring task ended abnormally.");
    }
    if let Err(e) = reminder_task.await {
        error!(error = %e, "Reminder task ended abnormally.");
    }
    info!("Shutdown complete.");
    Ok(())
}

fn check(config: &ServerConfig, address: &str) {
    let policy = SafetyPolicy::from_config(&config.safety);
    let bare = address.trim().trim_start_matches('[').trim_end_matches(']');
    let verdict = if bare.parse::<IpAddr>().is_ok() {
        policy.validate_ip(address).map(|ip| ip.to_string())
    } else {
        policy.validate_url(address).map(|url| url.to_string())
    };
    match verdict {
        Ok(normalized) => println!("safe: {normalized}"),
        Err(reason) => println!("unsafe: {reason}"),
    }
}

async fn remind_now(config: ServerConfig) -> Result<(), BoxError> {
    let notifier = Arc::new(NotificationService::from_config(config.require_delivery()?)?);
    let store = Arc::new(SqliteStore::connect(&config.database_url).await?);
    let service = ReminderService::new(
        store,
        notifier,
        ReminderSettings::from_config(&config.reminders)?,
    );

    let report = service.run_once(Local::now().date_naive()).await?;
    println!(
        "subscriptions: {}, sent: {}, nothing due: {}, failed: {}",
        report.subscriptions, report.sent, report.idle, report.failures
    );
    Ok(())
}

async fn set_api_key(
    config: &ServerConfig,
    owner: OwnerId,
    provider: HostingProvider,
    key: &str,
) -> Result<(), BoxError> {
    let encryption = EncryptionService::from_hex_key(config.require_encryption_key()?)?;
    let client = HostingRegistry::new().client(provider, key)?;
    if !client.test_connection().await {
        return Err(format!("{} rejected the API key", provider.display_name()).into());
    }

    let store = SqliteStore::connect(&config.database_url).await?;
    store
        .save_credential(owner, provider.as_str(), &encryption.encrypt_to_hex(key)?)
        .await?;
    info!(owner_id = owner, provider = %provider, "Hosting API key saved.");
    Ok(())
}

async fn hosting_servers(
    config: &ServerConfig,
    owner: OwnerId,
    provider: HostingProvider,
) -> Result<(), BoxError> {
    let encryption = EncryptionService::from_hex_key(config.require_encryption_key()?)?;
    let store = SqliteStore::connect(&config.database_url).await?;
    let Some(sealed) = store.credential(owner, provider.as_str()).await? else {
        warn!(owner_id = owner, provider = %provider, "No API key stored.");
        return Err(format!("no {} API key stored for owner {owner}", provider.display_name()).into());
    };

    let client = HostingRegistry::new().client(provider, &encryption.decrypt_from_hex(&sealed)?)?;
    let servers = client.list_servers().await?;
    println!("{}", serde_json::to_string_pretty(&servers)?);
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler.");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler.");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
