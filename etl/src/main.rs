use clap::{Arg, Command};
use common::config::Settings;
use common::telemetry::init_logging;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = Command::new("Channel Cache Builder")
        .version("1.0")
        .about("Builds the channel snapshot cache from a registry bulk extract")
        .subcommand_required(true)
        .subcommand(
            Command::new("build")
                .about("Parse the bulk extract and replace the cached snapshots")
                .arg(
                    Arg::new("config")
                        .short('c')
                        .long("config")
                        .value_name("FILE")
                        .help("Sets a custom config file"),
                )
                .arg(
                    Arg::new("extract")
                        .short('e')
                        .long("extract")
                        .value_name("FILE")
                        .help("Bulk extract to ingest, overriding etl.extract_path"),
                ),
        )
        .get_matches();

    match matches.subcommand() {
        Some(("build", build_matches)) => {
            let config_path = build_matches
                .get_one::<String>("config")
                .map(|s| s.as_str())
                .unwrap_or("config/etl.toml");
            let settings = Settings::new(config_path)?;
            init_logging(&settings.logging);

            info!(%config_path, "Starting cache build");
            let extract = build_matches.get_one::<String>("extract").map(|s| s.as_str());
            let manifest = etl::run_etl_pipeline(&settings, extract).await?;

            info!(
                total = manifest.total_rows,
                rejected = manifest.rejected_rows,
                "Cache build finished"
            );
            Ok(())
        }
        _ => unreachable!("subcommand_required"),
    }
}
