// Copyright 2026 axscan Contributors
// SPDX-License-Identifier: Apache-2.0

use anyhow::Result;
use axscan::cli;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

#[derive(Parser)]
#[command(
    name = "axscan",
    about = "axscan — automated accessibility audits with an isolated headless browser",
    version,
    after_help = "Run 'axscan <command> --help' for details on each command."
)]
struct Cli {
    /// Enable verbose/debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scan service
    Serve {
        /// HTTP port (default 7900, or AXSCAN_PORT)
        #[arg(long)]
        port: Option<u16>,
    },
    /// Scan a single page and print the audit
    Scan {
        /// URL to audit
        url: String,
        /// Output the full result as JSON (machine-readable)
        #[arg(long)]
        json: bool,
    },
    /// Check environment and diagnose issues
    Doctor,
    /// Download and cache the axe-core engine bundle
    Install {
        /// Re-download even if a bundle is already cached
        #[arg(long)]
        force: bool,
    },
    /// Generate shell completion scripts
    Completions {
        /// Shell type (bash, zsh, fish, powershell)
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "axscan=debug" } else { "axscan=info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(default_level.parse().unwrap()),
        )
        .init();

    let result = match cli.command {
        Commands::Serve { port } => cli::serve_cmd::run(port).await,
        Commands::Scan { url, json } => cli::scan_cmd::run(&url, json).await,
        Commands::Doctor => cli::doctor::run().await,
        Commands::Install { force } => cli::install_cmd::run(force).await,
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "axscan", &mut std::io::stdout());
            Ok(())
        }
    };

    // Consistent exit codes: 0=success, 1=error
    if let Err(e) = &result {
        eprintln!("  Error: {e:#}");
        std::process::exit(1);
    }

    result
}
