use clap::{Args, Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;

use sitekick::config::{HumanDuration, Overrides};

#[derive(Parser, Debug)]
#[command(name = "domains-to-sitekick", version)]
#[command(about = "Collect hosting metadata and push it to Sitekick", long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Collect domain info and push it to the Sitekick server (default)
    Send,
    /// Diagnose providers without queueing or sending anything
    Check(CheckArgs),
    /// Run a local HTTP echo server to push against
    Echo(EchoArgs),
}

#[derive(Args, Debug)]
pub struct CheckArgs {
    /// `latest`, `all` or a comma-separated list of provider names
    pub providers: Option<String>,
}

#[derive(Args, Debug)]
pub struct EchoArgs {
    /// Address to bind the echo server to
    #[arg(long, default_value = "127.0.0.1:8080")]
    pub address: SocketAddr,
}

#[derive(Args, Debug, Default)]
pub struct GlobalArgs {
    /// Configuration file, or a directory containing sitekick.toml
    #[arg(long, global = true)]
    pub config_path: Option<PathBuf>,

    /// Directory holding queued records
    #[arg(long, global = true)]
    pub queue_path: Option<PathBuf>,

    /// Collection endpoint
    #[arg(long, global = true)]
    pub sitekick_url: Option<String>,

    /// Include system command output in the server record
    #[arg(long, global = true, overrides_with = "no_system_info")]
    pub system_info: bool,

    #[arg(long, global = true, overrides_with = "system_info")]
    pub no_system_info: bool,

    /// Obfuscate personal data before it is queued
    #[arg(long, global = true, overrides_with = "no_gdpr_compliant")]
    pub gdpr_compliant: bool,

    #[arg(long, global = true, overrides_with = "gdpr_compliant")]
    pub no_gdpr_compliant: bool,

    /// Key for GDPR obfuscation
    #[arg(long, global = true)]
    pub gdpr_psk: Option<String>,

    /// Records per push request
    #[arg(long, global = true)]
    pub batch_size: Option<usize>,

    /// Time between pushes, e.g. `10`, `500ms`, `2m`
    #[arg(long, global = true)]
    pub interval: Option<HumanDuration>,

    /// Collect and push at the same time
    #[arg(long, global = true, overrides_with = "sequential")]
    pub parallel: bool,

    /// Collect everything first, then push
    #[arg(long, global = true, overrides_with = "parallel")]
    pub sequential: bool,

    /// Empty the queue before collecting
    #[arg(long, global = true)]
    pub cleanup: bool,
}

impl GlobalArgs {
    pub fn overrides(&self) -> Overrides {
        Overrides {
            queue_path: self.queue_path.clone(),
            push_url: self.sitekick_url.clone(),
            token: None,
            system_info: flag(self.system_info, self.no_system_info),
            gdpr_enabled: flag(self.gdpr_compliant, self.no_gdpr_compliant),
            gdpr_psk: self.gdpr_psk.clone(),
            batch_size: self.batch_size,
            interval: self.interval,
            parallel: flag(self.parallel, self.sequential),
            cleanup: self.cleanup.then_some(true),
        }
    }
}

/// `--x` / `--no-x` pair; neither given leaves the setting alone
fn flag(yes: bool, no: bool) -> Option<bool> {
    match (yes, no) {
        (true, _) => Some(true),
        (_, true) => Some(false),
        _ => None,
    }
}
