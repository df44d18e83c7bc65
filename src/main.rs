//! airdesk - admin console for the airport/flight database
//!
//! Loads settings and logging, connects, runs one command and prints it.

use airdesk::audit::{ActorId, AuditLogger};
use airdesk::commands::{Cli, Console};
use airdesk::config::{ConnectionConfig, Settings, find_connection, load_settings, load_settings_from};
use airdesk::crud::CrudEngine;
use airdesk::db::{PostgresProvider, SchemaRegistry};
use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = match &cli.config {
        Some(path) => load_settings_from(path),
        None => load_settings(),
    }
    .context("loading settings")?;

    init_tracing(&settings);

    let connection = resolve_connection(&cli)?;
    let db = PostgresProvider::connect(&connection)
        .await
        .with_context(|| format!("connecting to {}", connection.name))?;

    let tables = settings.table_names()?;
    let registry = SchemaRegistry::load(&db, &tables)
        .await
        .context("loading table metadata")?;
    let engine = CrudEngine::new(registry, AuditLogger::new(settings.audit_table_name()?));

    let actor = cli.actor.map(ActorId).or_else(|| settings.default_actor());
    let mut console = Console::new(engine, db, actor, settings.page_size, cli.format);

    let output = console.execute(cli.command).await?;
    print!("{}", output);
    if !output.is_empty() && !output.ends_with('\n') {
        println!();
    }
    Ok(())
}

/// `RUST_LOG` wins over the settings file. Logs go to stderr so command
/// output stays pipeable.
fn init_tracing(settings: &Settings) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.log_filter))
        .unwrap_or_else(|_| EnvFilter::new("airdesk=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn resolve_connection(cli: &Cli) -> Result<ConnectionConfig> {
    if let Some(profile) = &cli.profile {
        return Ok(find_connection(profile)?);
    }
    if let Some(url) = &cli.url {
        return ConnectionConfig::from_url(url).context("parsing --url");
    }
    bail!("no database given: pass --url, set DATABASE_URL, or choose a --profile")
}
