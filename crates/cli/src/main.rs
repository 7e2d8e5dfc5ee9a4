use anyhow::Context;
use clap::{Parser, Subcommand};
use oru_core::{Collaborators, Directory, InMemoryStore, IngestConfig, IngestService};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "oru")]
#[command(about = "HL7v2 ORU^R01 ingestion CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a message and print its segment tree as JSON
    Parse {
        /// HL7v2 message file
        file: PathBuf,
    },
    /// Ingest a message against an in-memory directory and print the recorded calls
    Ingest {
        /// HL7v2 message file
        file: PathBuf,
        /// YAML directory of known patients, users, locations and forms
        #[arg(long)]
        directory: PathBuf,
        /// YAML ingestion configuration (optional)
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive("oru=info".parse()?))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Parse { file } => {
            let text = read(&file)?;
            let message = hl7::Message::parse(&text)
                .with_context(|| format!("failed to parse {}", file.display()))?;
            println!("{}", serde_json::to_string_pretty(&message)?);
        }
        Commands::Ingest {
            file,
            directory,
            config,
        } => {
            let cfg = load_config(config.as_deref())?
                .apply_env_overrides(|key| std::env::var(key).ok())?;
            let directory = Directory::from_yaml(&read(&directory)?)?;
            tracing::debug!(
                "loaded directory: {} patients, {} users, {} locations, {} forms",
                directory.patients.len(),
                directory.users.len(),
                directory.locations.len(),
                directory.forms.len()
            );
            let text = read(&file)?;

            let store = Arc::new(InMemoryStore::new(directory));
            let service =
                IngestService::new(Arc::new(cfg), Collaborators::from_shared(store.clone()));
            let outcome = service.ingest_text(&text);

            let report = match &outcome {
                Ok(ingested) => serde_json::json!({
                    "summary": ingested.summary,
                    "events": store.events(),
                }),
                Err(failure) => serde_json::json!({
                    "failed": {
                        "stage": failure.stage,
                        "reason": failure.error.to_string(),
                    },
                    "events": store.events(),
                }),
            };
            println!("{}", serde_json::to_string_pretty(&report)?);

            outcome.with_context(|| format!("failed to ingest {}", file.display()))?;
        }
    }

    Ok(())
}

fn read(path: &Path) -> anyhow::Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

fn load_config(path: Option<&Path>) -> anyhow::Result<IngestConfig> {
    match path {
        Some(path) => Ok(IngestConfig::from_yaml(&read(path)?)?),
        None => Ok(IngestConfig::default()),
    }
}
