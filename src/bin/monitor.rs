//! Natmon CLI
//!
//! Launches natter with the given options, keeps `status.json` up to date
//! with the mapped public address, and stops natter on Ctrl-C.

use anyhow::Context;
use clap::Parser;
use natmon::storage::{MonitorSettings, Phase};
use natmon::supervisor::{LaunchConfig, Supervisor};
use std::path::PathBuf;
use tracing::{info, warn};

/// Natter monitor
#[derive(Debug, Parser)]
#[command(name = "natmon", about = "Run natter and publish its mapped address")]
struct Args {
    /// Target port to open
    #[arg(short = 'p', long)]
    port: Option<u16>,

    /// Verbose natter output
    #[arg(short = 'v', long)]
    verbose: bool,

    /// Exit when the mapped address changes
    #[arg(short = 'q', long)]
    quit_on_change: bool,

    /// UDP mode
    #[arg(short = 'u', long)]
    udp: bool,

    /// Enable UPnP
    #[arg(short = 'U', long)]
    upnp: bool,

    /// Keep-alive interval in seconds
    #[arg(short = 'k', long)]
    keep_alive: Option<u32>,

    /// STUN server address
    #[arg(short = 's', long)]
    stun_server: Option<String>,

    /// Keep-alive server address
    #[arg(long)]
    keep_alive_server: Option<String>,

    /// Script notified when the mapping changes
    #[arg(short = 'e', long)]
    hook_script: Option<String>,

    /// Network interface name or address
    #[arg(short = 'i', long)]
    interface: Option<String>,

    /// Local port to bind
    #[arg(short = 'b', long)]
    bind_port: Option<u16>,

    /// Forwarding method
    #[arg(short = 'm', long)]
    forward_method: Option<String>,

    /// Forwarding target address
    #[arg(short = 't', long)]
    forward_target: Option<String>,

    /// Keep retrying
    #[arg(short = 'r', long)]
    retry: bool,

    /// Monitor settings file (JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory for status.json and the raw log
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Executable used to launch natter
    #[arg(long)]
    program: Option<String>,

    /// Argument placed before the natter flags (repeatable)
    #[arg(long = "program-arg")]
    program_args: Vec<String>,

    /// Do not echo natter output to stdout
    #[arg(long)]
    no_echo: bool,
}

impl Args {
    /// Natter flags in the order they are passed on
    fn launch_config(&self) -> LaunchConfig {
        let mut config = LaunchConfig::new();
        config
            .set_opt("-p", self.port)
            .set("-v", self.verbose)
            .set("-q", self.quit_on_change)
            .set("-u", self.udp)
            .set("-U", self.upnp)
            .set_opt("-k", self.keep_alive)
            .set_opt("-s", self.stun_server.clone())
            .set_opt("-h", self.keep_alive_server.clone())
            .set_opt("-e", self.hook_script.clone())
            .set_opt("-i", self.interface.clone())
            .set_opt("-b", self.bind_port)
            .set_opt("-m", self.forward_method.clone())
            .set_opt("-t", self.forward_target.clone())
            .set("-r", self.retry);
        config
    }

    fn settings(&self) -> anyhow::Result<MonitorSettings> {
        let mut settings = match &self.config {
            Some(path) => MonitorSettings::load(path)
                .with_context(|| format!("loading settings from {}", path.display()))?,
            None => MonitorSettings::default(),
        };

        if let Some(dir) = &self.data_dir {
            settings.data_dir = dir.clone();
        }
        if let Some(program) = &self.program {
            settings.program = program.clone();
        }
        if !self.program_args.is_empty() {
            settings.program_args = self.program_args.clone();
        }
        if self.no_echo {
            settings.echo_output = false;
        }

        settings.validate()?;
        Ok(settings)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    natmon::init();

    let args = Args::parse();
    let settings = args.settings()?;
    let launch = args.launch_config();

    info!("Publishing status to {}", settings.status_path().display());

    let mut supervisor = Supervisor::new(settings, launch);
    let phase = supervisor
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await;

    info!("Monitor finished: {}", phase);
    if let Phase::Error(message) = phase {
        anyhow::bail!("natter monitoring failed: {}", message);
    }
    Ok(())
}
