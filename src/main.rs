mod config;
mod coordinator;
mod image;
mod logging;
mod memstats;
mod sampler;
mod scheduler;
mod signals;

use clap::{Args, Parser, Subcommand};
use config::InfraConfig;
use sampler::{Probe, Worker, FINISHED_NOTICE, WAITING_NOTICE};
use scheduler::Scheduler;
use signals::SignalListener;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

#[global_allocator]
static GLOBAL: memstats::TrackingAllocator = memstats::TrackingAllocator;

/// A CLI tool for managing infrastructure chores: periodic background
/// sampling, configuration, and image build/push planning.
#[derive(Parser, Debug)]
#[command(name = "infra", version, about)]
pub struct Cli {
    /// Config file path (default: first config.toml in ., ~/.infra, /etc/infra)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output (debug logging on stderr)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print `tick` every interval until interrupted
    Tick(SamplerArgs),

    /// Print heap and resident memory statistics every interval until interrupted
    Memstats(SamplerArgs),

    /// Manage configuration settings
    #[command(subcommand)]
    Config(ConfigCommand),

    /// Build a Docker image (plan only)
    Build {
        /// Name and optionally a tag in the 'name:tag' format
        #[arg(short, long)]
        tag: String,

        /// Name of the Dockerfile
        #[arg(short, long, default_value = "Dockerfile")]
        file: PathBuf,

        /// Build context directory
        #[arg(default_value = ".")]
        context: PathBuf,
    },

    /// Push a Docker image to a registry (plan only)
    Push {
        /// Image reference, e.g. myapp:latest
        image: String,

        /// Container registry URL (overrides config)
        #[arg(long)]
        registry: Option<String>,
    },
}

#[derive(Args, Debug)]
struct SamplerArgs {
    /// Interval in seconds (overrides config)
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    interval: Option<u64>,
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Show current configuration as JSON
    Show,

    /// Write a default configuration file
    Init {
        /// Output file path (default: ~/.infra/config.toml)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let loaded = match config::load(cli.config.as_deref()) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    };

    logging::init(
        &loaded.config.log_level,
        loaded.config.log_format,
        cli.verbose,
    );
    tracing::debug!(?cli, "parsed CLI arguments");
    match &loaded.path {
        Some(path) => tracing::debug!(file = %path.display(), "configuration loaded from file"),
        None => tracing::debug!("no configuration file found, using defaults"),
    }

    if let Err(e) = run(cli.command, &loaded.config).await {
        tracing::error!(error = %e, "command failed");
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run(command: Command, config: &InfraConfig) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Command::Tick(args) => {
            let interval = config.sampler_interval(args.interval)?;
            run_sampler(config, interval, sampler::TickProbe, WAITING_NOTICE).await?;
        }
        Command::Memstats(args) => {
            let interval = config.sampler_interval(args.interval)?;
            let banner = memstats::startup_notice(interval.as_secs());
            run_sampler(config, interval, memstats::MemoryProbe, &banner).await?;
        }
        Command::Config(ConfigCommand::Show) => {
            println!("{}", serde_json::to_string_pretty(config)?);
        }
        Command::Config(ConfigCommand::Init { file }) => {
            let path = match file {
                Some(path) => path,
                None => config::default_init_path()?,
            };
            config::save(&InfraConfig::default(), &path)?;
            tracing::info!(file = %path.display(), "configuration file created");
        }
        Command::Build { tag, file, context } => {
            image::BuildPlan::resolve(&tag, file, context, &config.docker)?.run();
        }
        Command::Push { image, registry } => {
            image::PushPlan::resolve(&image, registry, &config.docker)?.run();
        }
    }
    Ok(())
}

/// Run one sampler worker until the first shutdown signal, blocking the
/// calling task until the worker has terminated.
///
/// Signal handlers are installed before the worker exists; if that fails,
/// no worker is started.
async fn run_sampler<P>(
    config: &InfraConfig,
    interval: scheduler::Interval,
    probe: P,
    banner: &str,
) -> Result<(), Box<dyn std::error::Error>>
where
    P: Probe + Send + 'static,
{
    let listener = SignalListener::install(config.shutdown.second_interrupt)?;
    let cancel = CancellationToken::new();
    listener.spawn(cancel.clone());

    let (coordinator, release) = coordinator::pair();
    let worker = Worker::new(probe, std::io::stdout());
    tracing::info!(interval_secs = interval.as_secs(), "starting sampler worker");
    tokio::spawn(worker.run(Scheduler::start(interval), cancel, release));

    println!("{banner}");
    coordinator.wait().await?;
    println!("{FINISHED_NOTICE}");
    Ok(())
}
