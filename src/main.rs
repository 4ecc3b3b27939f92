//! Rebuilds and live-syncs a cross-platform project against one or more connected devices.
mod change_classifier;
mod cli;
mod commands;
mod delta_planner;
mod device_commands;
mod devices;
mod file_inventory;
mod file_store;
mod ios_debugger;
mod live_sync_coordinator;
mod logger;
mod package_graph;
mod path_util;
mod prepare_info_store;
mod progress;
mod sync_batch;

use clap::Parser;

use anyhow::Result;

fn main() -> Result<()> {
    let cli = cli::Cli::parse();
    logger::init_logger(&cli.global_options);
    tracing_subscriber::fmt::init();

    let project_path = cli
        .global_options
        .project_path
        .clone()
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|| std::env::current_dir().expect("current directory"));

    commands::run(cli.command, project_path)
}
