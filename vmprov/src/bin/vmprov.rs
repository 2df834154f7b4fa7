//! vmprov CLI.
//!
//! Runs the CD-ROM pipeline of a build configuration against an in-memory
//! VM and prints the resulting device table.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};
use vmprov::driver::{CdromBus, InMemoryVm, Media, VirtualMachine};
use vmprov::ui::TracingUi;
use vmprov::{Build, BuildConfig};

#[derive(Parser, Debug)]
#[command(name = "vmprov", version, about = "Step-based VM provisioning pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging (overridden by RUST_LOG)
    #[arg(short = 'v', long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the CD-ROM pipeline against an in-memory VM
    Run(RunArgs),
    /// Validate a build configuration
    Validate(ConfigArgs),
}

#[derive(Args, Debug)]
struct ConfigArgs {
    /// Build configuration (JSON)
    #[arg(short, long, value_name = "FILE")]
    config: PathBuf,
}

#[derive(Args, Debug)]
struct RunArgs {
    #[command(flatten)]
    config: ConfigArgs,

    /// Empty IDE drives the VM has before the build starts
    #[arg(long, default_value_t = 0)]
    existing_cdroms: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Run(args) => run(args).await,
        Commands::Validate(args) => validate(args),
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "vmprov=debug" } else { "vmprov=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();
}

fn load(args: &ConfigArgs) -> Result<BuildConfig> {
    BuildConfig::load(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))
}

fn validate(args: ConfigArgs) -> Result<()> {
    let config = load(&args)?;
    config.validate().context("invalid build configuration")?;
    println!("{}: configuration is valid", args.config.display());
    Ok(())
}

async fn run(args: RunArgs) -> Result<()> {
    let config = load(&args.config)?;

    let vm = InMemoryVm::new(config.vm_name.clone())
        .with_cdroms(CdromBus::Ide, vec![Media::Empty; args.existing_cdroms])
        .context("preparing in-memory VM")?;
    tracing::info!(vm = %config.vm_name, id = %vm.id(), "Created in-memory VM");
    let vm = Arc::new(vm);

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling build");
            on_signal.cancel();
        }
    });

    let ui = Arc::new(TracingUi::with_prefix(config.vm_name.clone()));
    let metrics = Build::new(config, vm.clone(), ui)?
        .run(&cancel)
        .await
        .context("build failed")?;

    println!("{:<6} {:<5} {:<10} {:<5} MEDIA", "KEY", "BUS", "CONTROLLER", "UNIT");
    for device in vm.cdroms().await? {
        let media = match &device.media {
            Media::Empty => "(empty)".to_string(),
            Media::Iso(path) => path.clone(),
            Media::ClientDevice => "(client device)".to_string(),
        };
        println!(
            "{:<6} {:<5} {:<10} {:<5} {}",
            device.key, device.bus, device.controller_key, device.unit, media
        );
    }

    println!();
    for step in &metrics.steps {
        println!("{:<16} {:>6}ms", step.name, step.duration_ms);
    }
    println!("{:<16} {:>6}ms", "total", metrics.total_duration_ms);

    Ok(())
}
