pub mod config;
pub mod ipc;
pub mod process_monitor;
pub mod script;
pub mod supervisor;
pub mod utils;
