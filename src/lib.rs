pub mod change_classifier;
pub mod cli;
pub mod commands;
pub mod delta_planner;
pub mod device_commands;
pub mod devices;
pub mod file_inventory;
pub mod file_store;
pub mod ios_debugger;
pub mod live_sync_coordinator;
mod logger;
pub mod package_graph;
pub mod path_util;
pub mod prepare_info_store;
mod progress;
pub mod sync_batch;

pub use logger::init_logger;
