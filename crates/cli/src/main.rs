//! # Warden DNS
//!
//! Network-wide filtering DNS proxy: binary entry point.

mod bootstrap;
mod di;
mod server;

use clap::error::ErrorKind;
use clap::Parser;
use mimalloc::MiMalloc;
use warden_dns_domain::CliOverrides;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// Config could not be loaded or failed validation.
const EXIT_CONFIG: i32 = 1;
/// Bad command-line usage.
const EXIT_USAGE: i32 = 64;

#[derive(Parser)]
#[command(name = "warden-dns")]
#[command(version)]
#[command(about = "Network-wide filtering DNS proxy")]
struct Cli {
    /// Path to the YAML config file
    #[arg(short = 'c', long, default_value = "warden.yaml")]
    config: String,

    /// DNS listener port override
    #[arg(short = 'd', long)]
    dns_port: Option<u16>,

    /// Admin web port override
    #[arg(short = 'w', long)]
    web_port: Option<u16>,

    /// Bind address override
    #[arg(short = 'b', long)]
    bind: Option<String>,
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            let code = match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
                _ => EXIT_USAGE,
            };
            std::process::exit(code);
        }
    };

    let overrides = CliOverrides {
        dns_port: cli.dns_port,
        web_port: cli.web_port,
        bind_host: cli.bind.clone(),
    };

    let config = match bootstrap::load_config(&cli.config, overrides) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("config error: {e}");
            std::process::exit(EXIT_CONFIG);
        }
    };

    bootstrap::init_logging(&config);

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("runtime error: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(server::run(config, cli.config)) {
        tracing::error!(error = %e, "Fatal");
        std::process::exit(1);
    }
}
