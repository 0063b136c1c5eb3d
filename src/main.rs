use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use ingestd::core::{
    DriveInventory, EngineConfig, IngestOutcome, IngestionEngine, Orchestrator, RegisterRequest,
    Registry, browse_drive, register_profile,
};
use ingestd::db::SqliteRegistry;
use ingestd::{adapters, config, context, logging};
use serde::Serialize;

#[derive(Parser)]
#[command(name = "ingestd")]
#[command(about = "Removable media ingestion daemon", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    overrides: ConfigArgs,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch for registered devices and ingest them as they are attached.
    Daemon,
    /// List connected drives and their mount points.
    Drives {
        /// Show only this drive.
        #[arg(long)]
        serial: Option<String>,

        /// List the top-level entries of the drive's source volume.
        #[arg(long, requires = "serial")]
        browse: bool,
    },
    /// Register a connected device for ingestion.
    Register(RegisterArgs),
    /// List registered ingestion profiles.
    Profiles,
    /// Ingest one connected device now and exit.
    Ingest { serial: String },
    /// Show the ingestion audit log.
    Actions {
        #[arg(long)]
        serial: Option<String>,
    },
}

#[derive(Args)]
struct RegisterArgs {
    serial: String,

    #[arg(long)]
    copy_to: PathBuf,

    /// Allowed file extensions (repeatable).
    #[arg(long = "ext")]
    extensions: Vec<String>,

    #[arg(long)]
    copy_on_attach: bool,
}

/// CLI flags that override the layered configuration.
#[derive(Args, Serialize)]
struct ConfigArgs {
    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long, global = true)]
    destination_root: Option<PathBuf>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long, global = true)]
    archive_root: Option<PathBuf>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long, global = true)]
    database_path: Option<PathBuf>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long, global = true)]
    settle_delay_ms: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long, global = true)]
    simulation: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long, global = true)]
    verbose: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long, global = true)]
    json_logs: Option<bool>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = config::AppConfig::new(Some(&cli.overrides))?;
    logging::init(logging::LogConfig::from(&config))?;

    let registry: Arc<dyn Registry> = Arc::new(
        SqliteRegistry::open(&config.database_path)
            .await
            .context("Failed to open ingestion registry")?,
    );
    let ctx = context::AppContext::new(config, registry);

    match cli.command {
        Commands::Daemon => run_daemon(ctx).await.context("Daemon failed"),
        Commands::Drives {
            serial: Some(serial),
            browse: true,
        } => browse(&ctx, &serial).await,
        Commands::Drives {
            serial: Some(serial),
            browse: false,
        } => show_drive(&ctx, &serial).await,
        Commands::Drives { serial: None, .. } => list_drives(&ctx).await,
        Commands::Register(args) => register(&ctx, args).await,
        Commands::Profiles => print_json(&ctx.registry.profiles().await?),
        Commands::Ingest { serial } => ingest_once(&ctx, &serial).await,
        Commands::Actions { serial } => print_json(&ctx.registry.actions(serial.as_deref()).await?),
    }
}

async fn run_daemon(ctx: context::AppContext) -> Result<()> {
    let adapter = adapters::get_adapter(ctx.config.simulation);
    Orchestrator::new(ctx, adapter).start().await
}

fn inventory(ctx: &context::AppContext) -> DriveInventory {
    DriveInventory::new(adapters::get_adapter(ctx.config.simulation))
}

async fn list_drives(ctx: &context::AppContext) -> Result<()> {
    let inventory = inventory(ctx);
    let mut drives = inventory.refresh().await?.as_ref().clone();
    for drive in &mut drives {
        drive.mount_points = inventory.resolve_mount_points(drive).await;
    }
    print_json(&drives)
}

async fn show_drive(ctx: &context::AppContext, serial: &str) -> Result<()> {
    match inventory(ctx).drive_by_serial(serial).await {
        Some(drive) => print_json(&drive),
        None => bail!("Device {} is not connected", serial),
    }
}

async fn browse(ctx: &context::AppContext, serial: &str) -> Result<()> {
    let entries = browse_drive(&inventory(ctx), serial, &ctx.config.boot_volume_label).await?;
    print_json(&entries)
}

async fn register(ctx: &context::AppContext, args: RegisterArgs) -> Result<()> {
    let request = RegisterRequest {
        serial: args.serial,
        copy_to: args.copy_to,
        allowed_extensions: (!args.extensions.is_empty()).then_some(args.extensions),
        copy_on_attach: args.copy_on_attach.then_some(true),
    };

    let profile = register_profile(ctx.registry.as_ref(), &inventory(ctx), request).await?;
    print_json(&profile)
}

async fn ingest_once(ctx: &context::AppContext, serial: &str) -> Result<()> {
    if !ctx.registry.profile_exists(serial).await? {
        bail!("Device {} is not registered", serial);
    }

    let engine = IngestionEngine::new(
        inventory(ctx),
        ctx.registry.clone(),
        ctx.progress.clone(),
        EngineConfig::from(ctx.config.as_ref()),
    );

    match engine.run(serial).await? {
        IngestOutcome::Completed(report) => {
            println!(
                "Copied {} file(s), {} unchanged, {} archived ({} bytes)",
                report.files_copied, report.files_unchanged, report.files_archived, report.bytes_copied
            );
            Ok(())
        }
        outcome => bail!("Ingestion of {} did not run: {:?}", serial, outcome),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
