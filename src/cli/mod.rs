//! CLI subcommand implementations for the axscan binary.

pub mod doctor;
pub mod install_cmd;
pub mod scan_cmd;
pub mod serve_cmd;
