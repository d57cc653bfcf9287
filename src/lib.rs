pub mod config;
pub mod netinfo;
pub mod process_monitor;
pub mod properties;
pub mod supervisor;
pub mod utils;
