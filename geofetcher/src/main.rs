use anyhow::Context;
use clap::{Parser, Subcommand};
use geofetcher::{Authenticator, Credentials, GeoClient, PortalUrls};
use geostore::StoreConfig;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "geofetcher", about = "Extracts and merges map-service layer data")]
struct Cli {
    /// Root of the per-service output tree.
    #[arg(long, env = "GEO_OUTPUTS_DIR", default_value = "outputs")]
    outputs_dir: PathBuf,

    /// Portal host, e.g. https://arcgis.example.io/
    #[arg(long, env = "GEO_PORTAL_HOST")]
    portal: Option<String>,

    /// First-layer account name.
    #[arg(long, env = "GEO_USERNAME")]
    username: Option<String>,

    /// Portal sign-in account name.
    #[arg(long, env = "GEO_PORTAL_USERNAME")]
    portal_username: Option<String>,

    #[arg(long, env = "GEO_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Full extraction of every service and layer, then merge.
    Full,
    /// Incremental sync of layers with a recorded modification date.
    Update,
    /// Merge-only pass over the files already on disk.
    Merge,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let config = StoreConfig::new(&cli.outputs_dir);

    match cli.command {
        Command::Merge => geofetcher::sync::run_merge(&config)?,
        Command::Full => geofetcher::sync::run_full(&mut connect(&cli)?, &config)?,
        Command::Update => geofetcher::sync::run_incremental(&mut connect(&cli)?, &config)?,
    }
    Ok(())
}

fn connect(cli: &Cli) -> anyhow::Result<GeoClient> {
    let portal = cli.portal.as_deref().context("--portal (GEO_PORTAL_HOST) is required")?;
    let credentials = Credentials {
        username: cli
            .username
            .clone()
            .context("--username (GEO_USERNAME) is required")?,
        portal_username: cli
            .portal_username
            .clone()
            .context("--portal-username (GEO_PORTAL_USERNAME) is required")?,
        password: cli
            .password
            .clone()
            .context("--password (GEO_PASSWORD) is required")?,
    };
    let authenticator = Authenticator::new(credentials, PortalUrls::from_host(portal));
    Ok(GeoClient::connect(authenticator)?)
}
