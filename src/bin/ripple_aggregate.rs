/// Prints recency-weighted sensor series from stored snapshots
///
/// Usage: ripple_aggregate [last-10-minutes | last-hour | all-time]
///
/// Output is `{"solar": [...], "water": [...], "temperature": [...]}`, each
/// series ascending by timestamp. An unrecognized filter means all-time.

use std::error::Error;

use ripple_monitor::analysis::aggregate::{aggregate, TimeFilter};
use ripple_monitor::config::Config;
use ripple_monitor::logging::init_logger;
use ripple_monitor::storage::load_snapshots;
use ripple_monitor::storage::pinata::PinataClient;

fn run() -> Result<(), Box<dyn Error>> {
    let config = Config::load()?;
    config.validate_storage()?;

    // stdout carries the JSON, so console logging goes to stderr only.
    init_logger(log::LevelFilter::Warn, config.logging.file.as_deref(), true)?;

    let filter_arg = std::env::args().nth(1);
    let filter = TimeFilter::from_query(filter_arg.as_deref());

    let jwt = config.storage.pinata_jwt.as_deref().ok_or("PINATA_JWT not set")?;
    let pinata = PinataClient::new(
        &config.storage.api_url,
        jwt,
        config.storage.gateway_url.as_deref(),
        config.http_timeout(),
    )?;

    let snapshots = load_snapshots(&pinata)?;
    let series = aggregate(&snapshots, filter);
    println!("{}", serde_json::to_string_pretty(&series)?);
    Ok(())
}

fn main() {
    if let Err(e) = run() {
        eprintln!("ripple_aggregate: {}", e);
        std::process::exit(1);
    }
}
