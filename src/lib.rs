pub mod bot;
pub mod config;
pub mod inject;
pub mod ipc;
pub mod language;
pub mod process_monitor;
pub mod supervisor;
pub mod utils;
