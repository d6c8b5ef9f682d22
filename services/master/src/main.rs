use clap::{Arg, Command};
use tracing::info;

use master::config;
use sync_core::supervision::CancelFlag;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "master starting");

    let matches = Command::new("tc-sync master")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Master side of a synchronized timestamp acquisition session")
        .arg(
            Arg::new("config")
                .help("Path to the master TOML config file")
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
                channels = cfg.acquisition.channels.len(),
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
    let outcome = master::run(&cfg, &cancel).await;

    for warning in &outcome.warnings {
        tracing::warn!("{warning}");
    }
    if let Some(report) = &outcome.report {
        info!(
            mean_offset_ns = report.mean,
            sample_count = report.sample_count,
            insufficient_data = report.insufficient_data,
            "session complete"
        );
    }

    // Exit non-zero only when no dataset was produced at all (spec.md §7).
    if outcome.records.is_empty() {
        eprintln!("FATAL: no dataset was produced");
        std::process::exit(1);
    }
}
