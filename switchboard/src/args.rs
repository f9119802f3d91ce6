use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

/// Switchboard inference gateway
#[derive(Debug, Parser)]
#[command(name = "switchboard", about = "Policy, routing and budget gateway for AI inference")]
pub struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "switchboard.toml", env = "SWITCHBOARD_CONFIG")]
    pub config: PathBuf,

    /// Override the listen address
    #[arg(long, env = "SWITCHBOARD_LISTEN")]
    pub listen: Option<SocketAddr>,

    /// Log filter directive, e.g. `info` or `switchboard=debug`
    #[arg(long, default_value = "info", env = "SWITCHBOARD_LOG")]
    pub log: String,
}
