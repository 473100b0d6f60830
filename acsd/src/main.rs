mod cli;

use acsd::config::DaemonConfig;
use acsd::daemon::{Daemon, LibraryFactory};
use acsd::library::channel::LibraryChannel;
use acsd::library::sim::SimulatedLibrary;
use acsd::library::{ops, LibraryApi};
use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands, DismountArgs, MountArgs, ServeArgs};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let result = match cli.cmd {
        Commands::Serve(args) => cmd_serve(args).await,
        Commands::Mount(args) => cmd_mount(args),
        Commands::Dismount(args) => cmd_dismount(args),
    };

    if let Err(e) = &result {
        error!("Error: {:#}", e);
        std::process::exit(1);
    }

    result
}

async fn cmd_serve(args: ServeArgs) -> Result<()> {
    let config = DaemonConfig::new()
        .port(args.port)
        .query_interval(Duration::from_secs(args.query_interval_secs))
        .command_timeout(Duration::from_secs(args.command_timeout_secs))
        .max_seq(args.max_seq)
        .tick_interval(Duration::from_millis(args.tick_millis))
        .mount_workers(args.mount_workers);

    // The in-tree simulator stands in for the site's vendor binding.
    let latency = Duration::from_millis(args.sim_latency_millis);
    let factory: Arc<LibraryFactory> =
        Arc::new(move || Box::new(SimulatedLibrary::new(latency)) as Box<dyn LibraryApi>);

    let daemon = Daemon::bind(config, factory).await?;
    daemon.run().await
}

fn cmd_mount(args: MountArgs) -> Result<()> {
    let vid = acs_proto::VolumeId::new(&args.vid)?;
    let drive: acs_proto::DriveAddr = args.drive.parse()?;
    let config = DaemonConfig::default();

    let latency = Duration::from_millis(args.sim_latency_millis);
    let mut channel = LibraryChannel::new(Box::new(SimulatedLibrary::new(latency)));
    ops::mount_tape(
        &mut channel,
        &vid,
        drive,
        args.read_only,
        config.query_interval,
        config.command_timeout,
    )?;
    info!(%vid, %drive, "volume mounted");
    Ok(())
}

fn cmd_dismount(args: DismountArgs) -> Result<()> {
    let vid = acs_proto::VolumeId::new(&args.vid)?;
    let drive: acs_proto::DriveAddr = args.drive.parse()?;
    let config = DaemonConfig::default();

    let latency = Duration::from_millis(args.sim_latency_millis);
    let mut channel = LibraryChannel::new(Box::new(SimulatedLibrary::new(latency)));
    ops::dismount_tape(
        &mut channel,
        &vid,
        drive,
        args.force,
        config.query_interval,
        config.command_timeout,
    )?;
    info!(%vid, %drive, "volume dismounted");
    Ok(())
}
