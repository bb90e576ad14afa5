//! Command handlers, kept out of main.rs so they can be tested

pub mod config;
pub mod init;
pub mod run;

pub use config::{execute_config, list_scenarios, load_config};
pub use init::{execute_init, generate_run_config, is_valid_init_path};
pub use run::{execute_run, resolve_run_config, run_with_driver, RunOutcome};
