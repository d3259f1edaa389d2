use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use clap::Subcommand;
use env_logger::Env;
use log::{error, info};
use url::Url;

use ember_service::client;
use ember_service::config::Config;
use ember_service::error::ServiceError;
use ember_service::service::Service;
use ember_service::tokio_tools::run_in_tokio;

use ember_service::NAME;
use ember_service::VERSION;

#[derive(Subcommand)]
enum Commands {
    /// Start the service and serve until signalled
    Start {},
    /// Validate the configuration
    Validate {},
    /// Run every probe once and print the verdict. Exit code 1 when DOWN.
    Check {},
    /// Query the health of a running service
    Probe {
        /// Base url of the service
        #[arg(short, long, default_value = "http://localhost:8079")]
        url: Url,
    },
}

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Sets a custom config file
    #[arg(short, long, value_name = "FILE")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

pub fn main() -> ExitCode {
    let log_level = Env::default().default_filter_or("info");
    env_logger::Builder::from_env(log_level).init();

    let cli = Cli::parse();

    info!("Value for config: {:?}", cli.config);

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            error!("{} failed: {}", NAME, e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode, ServiceError> {
    let config = Config::load(&cli.config)?;

    match cli.command {
        Some(Commands::Validate {}) => {
            println!("Validating the configuration");
            println!("Config: {:#?}", config);
            Ok(ExitCode::SUCCESS)
        }
        Some(Commands::Start {}) => {
            info!("Starting {}:{}", NAME, VERSION);
            let service = Service::new(config)?;
            run_in_tokio(service.start())?;
            Ok(ExitCode::SUCCESS)
        }
        Some(Commands::Check {}) => {
            let service = Service::new(config)?;
            let verdict = run_in_tokio(service.check())?;
            println!("{}", serde_json::to_string_pretty(&verdict)?);
            Ok(if verdict.is_up() {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(1)
            })
        }
        Some(Commands::Probe { url }) => {
            let (status, body) = run_in_tokio(client::probe(&url))?;
            println!("{}", body);
            Ok(if status.is_success() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        None => {
            println!("No command specified");
            Ok(ExitCode::FAILURE)
        }
    }
}
