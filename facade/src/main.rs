use clap::{Arg, Command};
use common::config::Settings;
use common::telemetry::init_logging;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = Command::new("Channel Facade")
        .version("1.0")
        .about("Serves publication-channel lookups from the registry and its snapshot cache")
        .subcommand_required(true)
        .subcommand(
            Command::new("serve").about("Start the HTTP API").arg(
                Arg::new("config")
                    .short('c')
                    .long("config")
                    .value_name("FILE")
                    .help("Sets a custom config file"),
            ),
        )
        .get_matches();

    match matches.subcommand() {
        Some(("serve", serve_matches)) => {
            let config_path = serve_matches
                .get_one::<String>("config")
                .map(|s| s.as_str())
                .unwrap_or("config/facade.toml");
            let settings = Settings::new(config_path)?;
            init_logging(&settings.logging);

            info!(%config_path, "Starting channel facade");
            channel_facade::run_facade(&settings).await?;
            Ok(())
        }
        _ => unreachable!("subcommand_required"),
    }
}
