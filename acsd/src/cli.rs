use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "acsd", about = "Tape library mount/dismount service", version)]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the mount/dismount daemon
    Serve(ServeArgs),
    /// Mount a volume once and exit
    Mount(MountArgs),
    /// Dismount a volume once and exit
    Dismount(DismountArgs),
}

#[derive(Args)]
pub struct ServeArgs {
    /// TCP listening port
    #[arg(long, default_value_t = 54521)]
    pub port: u16,

    /// Poll interval inside blocking library operations (seconds)
    #[arg(long, default_value_t = 10)]
    pub query_interval_secs: u64,

    /// Total budget for one library operation (seconds)
    #[arg(long, default_value_t = 610)]
    pub command_timeout_secs: u64,

    /// Largest assignable sequence number
    #[arg(long, default_value_t = 65535)]
    pub max_seq: u16,

    /// Control loop tick cadence (milliseconds)
    #[arg(long, default_value_t = 250)]
    pub tick_millis: u64,

    /// Number of blocking mount executors
    #[arg(long, default_value_t = 1)]
    pub mount_workers: usize,

    /// Simulated robot move latency (milliseconds)
    #[arg(long, default_value_t = 500)]
    pub sim_latency_millis: u64,
}

#[derive(Args)]
pub struct MountArgs {
    /// Volume label, e.g. VOL001
    pub vid: String,

    /// Drive address, e.g. 1:2:3:4
    pub drive: String,

    /// Mount read-only
    #[arg(long)]
    pub read_only: bool,

    /// Simulated robot move latency (milliseconds)
    #[arg(long, default_value_t = 500)]
    pub sim_latency_millis: u64,
}

#[derive(Args)]
pub struct DismountArgs {
    /// Volume label, e.g. VOL001
    pub vid: String,

    /// Drive address, e.g. 1:2:3:4
    pub drive: String,

    /// Force the dismount regardless of drive state
    #[arg(long)]
    pub force: bool,

    /// Simulated robot move latency (milliseconds)
    #[arg(long, default_value_t = 500)]
    pub sim_latency_millis: u64,
}
