//! taskminder: overdue task reminder service.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use taskminder_core::impls::{InMemoryTaskStore, LogNotifier};
use taskminder_core::ports::{BrokerConnector, MessageBroker};
use taskminder_core::{App, AppBuilder, BrokerSettings, ReminderConfig, ReminderPipeline, select_broker};
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "taskminder_core=info,taskminder_cli=info,lapin=warn";

/// Scans for overdue tasks and queues one reminder per task.
#[derive(Debug, Parser)]
#[command(name = "taskminder", version, about)]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(short, long, env = "TASKMINDER_CONFIG")]
    config: Option<PathBuf>,

    #[command(flatten)]
    overrides: Overrides,

    #[command(subcommand)]
    command: Option<Command>,
}

/// Values that take precedence over the config file.
#[derive(Debug, Args)]
struct Overrides {
    /// RabbitMQ host. Setting it enables the broker section.
    #[arg(long, env = "TASKMINDER_AMQP_HOST", global = true)]
    amqp_host: Option<String>,

    #[arg(long, env = "TASKMINDER_AMQP_PORT", global = true)]
    amqp_port: Option<u16>,

    #[arg(long, env = "TASKMINDER_AMQP_USER", global = true)]
    amqp_user: Option<String>,

    #[arg(long, env = "TASKMINDER_AMQP_PASSWORD", global = true, hide_env_values = true)]
    amqp_password: Option<String>,

    #[arg(long, env = "TASKMINDER_AMQP_VHOST", global = true)]
    amqp_vhost: Option<String>,

    /// Seconds between two overdue scans.
    #[arg(long, env = "TASKMINDER_SCAN_INTERVAL_SECS", global = true)]
    scan_interval_secs: Option<u64>,

    /// Number of reminder consumers.
    #[arg(long, env = "TASKMINDER_CONSUMERS", global = true)]
    consumers: Option<usize>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the scanner and the consumers until Ctrl-C (default).
    Run,

    /// Probe the broker and report which variant would be used.
    CheckBroker,

    /// Run a single scan tick against the demo task store.
    ScanOnce,
}

impl Overrides {
    fn apply(&self, config: &mut ReminderConfig) {
        if let Some(host) = &self.amqp_host {
            config
                .broker
                .get_or_insert_with(BrokerSettings::default)
                .host
                .clone_from(host);
        }
        if let Some(broker) = config.broker.as_mut() {
            if let Some(port) = self.amqp_port {
                broker.port = port;
            }
            if let Some(user) = &self.amqp_user {
                broker.username.clone_from(user);
            }
            if let Some(password) = &self.amqp_password {
                broker.password.clone_from(password);
            }
            if let Some(vhost) = &self.amqp_vhost {
                broker.vhost.clone_from(vhost);
            }
        }
        if let Some(secs) = self.scan_interval_secs {
            config.scan_interval_secs = secs;
        }
        if let Some(consumers) = self.consumers {
            config.consumer_instances = consumers;
        }
    }
}

impl Cli {
    fn load_config(&self) -> anyhow::Result<ReminderConfig> {
        let mut config = match &self.config {
            Some(path) => ReminderConfig::from_file(path)?,
            None => ReminderConfig::default(),
        };
        self.overrides.apply(&mut config);
        config.validate().context("invalid command line overrides")?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // RUST_LOG で上書きできる
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();

    let cli = Cli::parse();
    let config = cli.load_config()?;
    let app = build_app(config)?;

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run(app).await,
        Command::CheckBroker => check_broker(app).await,
        Command::ScanOnce => scan_once(app).await,
    }
}

fn build_app(config: ReminderConfig) -> anyhow::Result<App> {
    let app = AppBuilder::new(config)
        .task_store(Arc::new(InMemoryTaskStore::seeded(Utc::now())))
        .notifier(Arc::new(LogNotifier))
        .build()?;
    Ok(app)
}

async fn connect(app: &App) -> Arc<dyn MessageBroker> {
    let connector = app.connector();
    select_broker(
        connector.as_ref().map(|c| c as &dyn BrokerConnector),
        app.config().connect_timeout(),
    )
    .await
}

async fn run(app: App) -> anyhow::Result<()> {
    let broker = connect(&app).await;
    let pipeline = ReminderPipeline::spawn(&app, broker);

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    tracing::info!("shutdown requested");

    let counts = pipeline.shutdown_and_join().await;
    println!("{}", serde_json::to_string_pretty(&counts)?);
    Ok(())
}

async fn check_broker(app: App) -> anyhow::Result<()> {
    let target = app.connector().map(|c| c.target());
    let broker = connect(&app).await;

    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "broker": broker.name(),
            "target": target,
        }))?
    );
    broker.close().await?;
    Ok(())
}

async fn scan_once(app: App) -> anyhow::Result<()> {
    let broker = connect(&app).await;
    let result = app.scanner(Arc::clone(&broker)).scan_once().await;
    if let Err(err) = broker.close().await {
        tracing::warn!(error = %err, "failed to close broker connection");
    }
    let report = result?;

    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "scan_id": report.scan_id.to_string(),
            "broker": broker.name(),
            "found": report.found,
            "published": report.published,
        }))?
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("taskminder").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn no_flags_keep_the_inert_default() {
        let cli = parse(&["run"]);
        let config = cli.load_config().unwrap();
        assert!(config.broker.is_none());
        assert!(matches!(cli.command, Some(Command::Run)));
    }

    #[test]
    fn amqp_host_enables_the_broker() {
        let cli = parse(&["--amqp-host", "rabbit", "--amqp-port", "5673", "check-broker"]);
        let config = cli.load_config().unwrap();

        let broker = config.broker.unwrap();
        assert_eq!(broker.host, "rabbit");
        assert_eq!(broker.port, 5673);
        assert_eq!(broker.username, "guest");
    }

    #[test]
    fn overrides_are_validated() {
        let cli = parse(&["--consumers", "0"]);
        assert!(cli.load_config().is_err());
    }

    #[test]
    fn subcommand_defaults_to_none() {
        let cli = parse(&["--scan-interval-secs", "30"]);
        assert!(cli.command.is_none());
        assert_eq!(cli.load_config().unwrap().scan_interval_secs, 30);
    }
}
