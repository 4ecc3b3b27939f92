use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(about = "Rebuild and live-sync a project against one or more connected devices.")]
#[command(version = "0.3")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
    #[clap(flatten)]
    pub global_options: GlobalOptions,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Prints the delta between the desired output tree and what is already on disk, without
    /// applying it.
    Status,
    /// Runs the rebuild pipeline: resolve packages, enumerate files, diff, and apply.
    Prepare(PrepareArgs),
    /// Runs one full sync to a device: install, transfer the project tree, refresh.
    Sync(SyncArgs),
    /// Reads newline-delimited `event\tpath` pairs from stdin and drives the live-sync
    /// coordinator's partial-sync path, standing in for an external filesystem watcher.
    Watch(SyncArgs),
}

#[derive(Debug, Args)]
pub struct PrepareArgs {
    /// Bundle the application's scripts into a single file before syncing.
    #[clap(long)]
    pub bundle: bool,
    /// Build for release rather than debug.
    #[clap(long)]
    pub release: bool,
    /// Target platform.
    #[clap(long, value_enum, default_value_t = PlatformArg::Ios)]
    pub platform: PlatformArg,
}

#[derive(Debug, Args)]
pub struct SyncArgs {
    /// Device identifier to sync to. If unset, syncs to every connected device for the
    /// target platform.
    #[clap(long)]
    pub device: Option<String>,
    /// Push live JavaScript edits directly into the running app instead of restarting it.
    #[clap(long)]
    pub live_edit: bool,
    /// Re-send every project file instead of only what changed since the last sync.
    #[clap(long)]
    pub sync_all_files: bool,
    /// Target platform.
    #[clap(long, value_enum, default_value_t = PlatformArg::Ios)]
    pub platform: PlatformArg,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
pub enum PlatformArg {
    Ios,
    Android,
}

impl From<PlatformArg> for crate::path_util::Platform {
    fn from(value: PlatformArg) -> crate::path_util::Platform {
        match value {
            PlatformArg::Ios => crate::path_util::Platform::Ios,
            PlatformArg::Android => crate::path_util::Platform::Android,
        }
    }
}

#[derive(Args, Debug)]
pub struct GlobalOptions {
    /// Print commands while executing them.
    #[clap(long = "verbose", short, global = true, value_enum, default_value_t=Verbosity::Details)]
    pub verbose: Verbosity,
    /// Path to the project root. Defaults to the current directory.
    #[clap(long = "project", global = true)]
    pub project_path: Option<String>,
}

#[derive(clap::ValueEnum, Clone, Debug)]
pub enum Verbosity {
    /// Only show minimal information.
    None,
    /// Show all sync operations.
    Details,
    /// For debugging internals of tool and timings.
    Debug,
}
