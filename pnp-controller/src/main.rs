//! Fake device controller: entry point.
//!
//! ```text
//! pnp-controller                       Run the configured script
//! pnp-controller -c <path>             Load a custom config TOML
//! pnp-controller -g <host> -p <port>   Override the DGI address
//! pnp-controller -s <script>           Run a different DSP script
//! pnp-controller --gen-config          Write default config to stdout
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use pnp_controller::{Controller, ControllerConfig, ControllerError, Overrides, Script};

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "pnp-controller",
    version,
    about = "A fake FREEDM device controller that talks to the DGI via the plug-and-play \
             protocol and pretends to implement DGI commands immediately.",
    after_help = "Batteries not included."
)]
struct Cli {
    /// File to use for additional configuration.
    #[arg(short, long, default_value = "config/controller.toml")]
    config: PathBuf,

    /// Hostname of the DGI to connect to.
    #[arg(short = 'g', long)]
    host: Option<String>,

    /// Unique identifier of this controller.
    #[arg(short, long)]
    name: Option<String>,

    /// The DGI adapter factory's listening port.
    #[arg(short, long)]
    port: Option<u16>,

    /// The DSP script file to run.
    #[arg(short, long)]
    script: Option<PathBuf>,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,
}

// ── Main ─────────────────────────────────────────────────────────

fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.gen_config {
        return match toml::to_string_pretty(&ControllerConfig::default()) {
            Ok(text) => {
                println!("{text}");
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("cannot render default config: {e}");
                ExitCode::FAILURE
            }
        };
    }

    let mut config = match ControllerConfig::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };
    config.apply_overrides(Overrides {
        host: cli.host,
        name: cli.name,
        port: cli.port,
        script: cli.script,
    });

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("pnp-controller v{}", env!("CARGO_PKG_VERSION"));
    info!("controller name: {}", config.controller.name);
    info!("script: {}", config.controller.script.display());

    match run(&config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run(config: &ControllerConfig) -> Result<(), ControllerError> {
    let script = Script::load(&config.controller.script)?;
    info!(commands = script.len(), "loaded DSP script");

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(ControllerError::Runtime)?;

    let mut controller = Controller::from_config(config);
    runtime.block_on(controller.run(&script))
}
