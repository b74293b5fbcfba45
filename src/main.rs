//! Binary entry point: parses CLI flags, installs logging, loads
//! configuration, and hands off to the startup orchestrator.

use clap::Parser;
use log::error;
use voice_gateway::config::Configuration;

#[derive(Parser)]
#[command(name = "voice-gateway")]
#[command(about = "Wake-word voice gateway for low-powered edge devices")]
struct Args {
    /// Enable verbose (debug-level) logging, overriding RUST_LOG.
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level)).init();

    let config = match Configuration::load() {
        Ok(config) => config,
        Err(e) => {
            error!("configuration error: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = voice_gateway::startup::run(config).await {
        error!("fatal startup error: {e}");
        std::process::exit(1);
    }
}
