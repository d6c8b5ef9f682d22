use clap::{Arg, Command};
use tracing::info;

use slave::config;
use sync_core::supervision::CancelFlag;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "slave starting");

    let matches = Command::new("tc-sync slave")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Slave side of a synchronized timestamp acquisition session")
        .arg(
            Arg::new("config")
                .help("Path to the slave TOML config file")
                .short('c')
                .long("config")
                .value_name("PATH"),
        )
        .get_matches();

    let cfg = match matches.get_one::<String>("config") {
        Some(path) => config::load_config_from_path(std::path::Path::new(path)),
        None => config::load_config(),
    };
    let cfg = match cfg {
        Ok(cfg) => {
            info!(
                tc = %cfg.tc.address,
                dlt = %cfg.dlt.command_address,
                master = %cfg.peer.master_control_addr,
                "config loaded"
            );
            cfg
        }
        Err(e) => {
            eprintln!("FATAL: failed to load config: {e}");
            std::process::exit(1);
        }
    };

    let cancel = CancelFlag::new();
    let outcome = slave::run(&cfg, &cancel).await;

    for warning in &outcome.warnings {
        tracing::warn!("{warning}");
    }

    if outcome.records.is_empty() {
        eprintln!("FATAL: no dataset was produced");
        std::process::exit(1);
    }
}
