/// Ripple ingestion daemon
///
/// Subscribes to the sensor topics, buffers readings, raises water-flow
/// warnings, and uploads a snapshot every flush interval.

use std::error::Error;
use std::sync::{mpsc, Arc};
use std::thread;

use log::{error, info};

use ripple_monitor::alert::notify::HttpNotifier;
use ripple_monitor::alert::thresholds::ThresholdDetector;
use ripple_monitor::config::Config;
use ripple_monitor::flush::SnapshotFlusher;
use ripple_monitor::ingest::mqtt;
use ripple_monitor::logging::init_logger;
use ripple_monitor::pipeline::{spawn_ticker, Pipeline, PipelineEvent};
use ripple_monitor::storage::pinata::PinataClient;

fn run() -> Result<(), Box<dyn Error>> {
    let config = Config::load()?;
    config.validate_daemon()?;

    init_logger(
        config.logging.level_filter()?,
        config.logging.file.as_deref(),
        config.logging.console_timestamps,
    )?;

    let endpoint = config.alert.endpoint.as_deref().ok_or("WARNING_ENDPOINT not set")?;
    let jwt = config.storage.pinata_jwt.as_deref().ok_or("PINATA_JWT not set")?;

    let notifier = HttpNotifier::new(endpoint, config.http_timeout())?;
    let pinata = PinataClient::new(
        &config.storage.api_url,
        jwt,
        config.storage.gateway_url.as_deref(),
        config.http_timeout(),
    )?;

    let threshold = config.alert.threshold_config()?;
    info!(
        target: "pipeline",
        "Flushing every {}s; warning above {:.2} held {}s, cooldown {}s, sent to {}",
        config.flush_interval_secs,
        threshold.flow_threshold,
        threshold.sustained_duration.num_seconds(),
        threshold.cooldown.num_seconds(),
        notifier.endpoint()
    );

    let pipeline = Pipeline::new(
        ThresholdDetector::new(threshold),
        notifier,
        SnapshotFlusher::new(Arc::new(pinata)),
    );

    let (tx, rx) = mpsc::channel();
    spawn_ticker(config.flush_interval(), tx.clone());

    let broker = config.broker.clone();
    thread::spawn(move || {
        if let Err(e) = mqtt::run_subscription(&broker, tx.clone()) {
            error!(target: "mqtt", "Subscription stopped: {}", e);
        }
        let _ = tx.send(PipelineEvent::Shutdown);
    });

    pipeline.run(rx);
    Ok(())
}

fn main() {
    if let Err(e) = run() {
        error!(target: "pipeline", "{}", e);
        eprintln!("ripple_monitor: {}", e);
        std::process::exit(1);
    }
}
