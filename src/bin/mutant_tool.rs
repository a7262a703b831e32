use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use rustmutant::{EngineConfig, Fixture, MemoryDatabase, SchemaEngine};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "mutant-tool")]
#[command(about = "Developer tooling for RustMutant definition fixtures")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Load a fixture into an in-memory backend and print the schema operations
    Apply {
        #[arg(long)]
        fixture: PathBuf,
        #[arg(long)]
        config: Option<PathBuf>,
        /// Also print the synthesized types
        #[arg(long)]
        types: bool,
    },
    /// Print the synthesized type `namespace.Name` of a fixture as JSON
    Describe {
        #[arg(long)]
        fixture: PathBuf,
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        name: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Apply {
            fixture,
            config,
            types,
        } => apply(&fixture, config.as_deref(), types),
        Command::Describe {
            fixture,
            config,
            name,
        } => describe(&fixture, config.as_deref(), &name),
    }
}

fn load_engine(fixture: &Path, config: Option<&Path>) -> Result<(SchemaEngine, Arc<MemoryDatabase>)> {
    let config = match config {
        Some(path) => {
            let json = fs::read_to_string(path)
                .with_context(|| format!("failed to read config {}", path.display()))?;
            EngineConfig::from_json(&json)
                .with_context(|| format!("invalid config {}", path.display()))?
        }
        None => EngineConfig::default(),
    };

    let json = fs::read_to_string(fixture)
        .with_context(|| format!("failed to read fixture {}", fixture.display()))?;
    let fixture_rows = Fixture::from_json(&json)
        .with_context(|| format!("invalid fixture {}", fixture.display()))?;

    let (engine, database) = SchemaEngine::in_memory_with(config)?;
    engine
        .store()
        .load_fixture(&fixture_rows)
        .with_context(|| format!("failed to apply fixture {}", fixture.display()))?;
    Ok((engine, database))
}

fn apply(fixture: &Path, config: Option<&Path>, types: bool) -> Result<()> {
    let (engine, database) = load_engine(fixture, config)?;

    for operation in database.journal()? {
        println!("{}", operation);
    }

    if types {
        for schema in engine.store().list()? {
            let handle = engine.handle(schema.id)?;
            let runtime = handle.resolve()?;
            println!();
            println!("{} -> {}", runtime.key(), runtime.table_name());
            for field in runtime.fields() {
                let marker = if field.primary_key { " (pk)" } else { "" };
                println!("  {}: {:?}{}", field.column, field.data_type, marker);
            }
        }
    }
    Ok(())
}

fn describe(fixture: &Path, config: Option<&Path>, name: &str) -> Result<()> {
    let (engine, _) = load_engine(fixture, config)?;
    let (namespace, type_name) = name
        .split_once('.')
        .ok_or_else(|| anyhow!("expected namespace.Name, got '{}'", name))?;

    let runtime = engine.handle_for(namespace, type_name)?.resolve()?;
    let description = serde_json::json!({
        "type": runtime.key().to_string(),
        "table": runtime.table_name(),
        "generation": runtime.generation(),
        "fields": runtime.fields(),
        "options": runtime.options(),
    });
    println!("{}", serde_json::to_string_pretty(&description)?);
    Ok(())
}
