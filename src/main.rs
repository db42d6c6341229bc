use clap::Parser;
use log::{error, info};
use vigil::configuration::config::{CliArgs, Config};
use vigil::controller::controller_handler::Controller;

#[tokio::main]
async fn main() {
    // Log level can be raised with RUST_LOG, e.g. RUST_LOG=debug
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .format_target(false)
        .init();

    let args = CliArgs::parse();

    info!("Importing configuration");
    let mut config = match Config::from_file(&args.config_file) {
        Ok(config) => config,
        Err(e) => {
            error!("Unable to import configuration from file: {}", e);
            std::process::exit(1);
        }
    };
    if let Err(e) = config.apply_args(&args) {
        error!("Invalid command-line override: {}", e);
        std::process::exit(1);
    }
    info!("Configuration imported successfully");

    let controller = match Controller::new(config) {
        Ok(controller) => controller,
        Err(e) => {
            error!("Unable to create a controller instance: {}, exiting...", e);
            std::process::exit(1);
        }
    };

    info!("Starting vigil v{}", env!("CARGO_PKG_VERSION"));
    if let Err(e) = controller.run().await {
        error!("Error occured in the controller process: {}, exiting...", e);
        std::process::exit(1);
    }
}
