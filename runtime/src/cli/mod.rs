//! CLI subcommand implementations for the `unitwatch` binary.

pub mod doctor;
pub mod inspect_cmd;
pub mod install_cmd;
pub mod output;
pub mod run_cmd;
pub mod watch_cmd;
