mod config;
mod console;
mod models;
mod upload;

use log::{error, info, warn};
use sentry::types::Dsn;
use std::io::{Read, Write};
use tokio::time::{sleep, Duration};

use config::StationConfig;
use console::{open_port, Session, SessionError};
use models::Observation;
use upload::Uploader;

// Pause before trying again after a cycle produced no data
const RETRY_DELAY: Duration = Duration::from_secs(2);

/// How one poll cycle ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CycleOutcome {
    Uploaded,
    UploadFailed,
    InvalidRecord,
    NoData,
}

impl CycleOutcome {
    /// Time to wait before the next cycle
    fn delay(self, poll_interval: Duration) -> Duration {
        match self {
            CycleOutcome::Uploaded | CycleOutcome::UploadFailed => poll_interval,
            CycleOutcome::InvalidRecord | CycleOutcome::NoData => RETRY_DELAY,
        }
    }
}

/// Run one blocking exchange off the async runtime, handing the session back
async fn poll_console<P>(
    mut session: Session<P>,
) -> Result<(Session<P>, Result<Observation, SessionError>), Box<dyn std::error::Error>>
where
    P: Read + Write + Send + 'static,
{
    let (session, result) = tokio::task::spawn_blocking(move || {
        let result = session.poll();
        (session, result)
    })
    .await?;

    Ok((session, result))
}

fn log_summary(observation: &Observation) {
    info!("Observation summary:");
    info!("  Barometer: {:.3} inHg (trend {})", observation.barometer, observation.bar_trend);
    info!(
        "  Temperature: inside {:.1}°F, outside {:.1}°F",
        observation.in_temperature, observation.out_temperature
    );
    info!(
        "  Humidity: inside {}%, outside {}%",
        observation.in_humidity, observation.out_humidity
    );
    info!(
        "  Wind: {} mph from {}° (10-min avg {} mph)",
        observation.wind_speed, observation.wind_direction, observation.ten_min_wind_speed
    );
    info!("  Console battery: {:.2} V", observation.console_battery);
}

/// Poll the console once and upload the record if every field decoded
async fn run_cycle<P>(
    session: Session<P>,
    uploader: &Uploader,
) -> Result<(Session<P>, CycleOutcome), Box<dyn std::error::Error>>
where
    P: Read + Write + Send + 'static,
{
    let (session, result) = poll_console(session).await?;

    let outcome = match result {
        Ok(observation) if observation.valid => {
            log_summary(&observation);

            if let Err(e) = uploader.send(&observation).await {
                error!("Failed to upload observation: {}", e);
                CycleOutcome::UploadFailed
            } else {
                info!("Successfully uploaded observation");
                CycleOutcome::Uploaded
            }
        }
        Ok(_) => {
            warn!("Frame decoded with invalid fields, no data this cycle");
            CycleOutcome::InvalidRecord
        }
        Err(e) => {
            warn!("No data this cycle: {}", e);
            CycleOutcome::NoData
        }
    };

    Ok((session, outcome))
}

async fn main_loop<P>(
    config: StationConfig,
    mut session: Session<P>,
) -> Result<(), Box<dyn std::error::Error>>
where
    P: Read + Write + Send + 'static,
{
    info!("Starting weather console polling on {}", config.device_port);

    let uploader = Uploader::new(config.server_url.clone())?;
    let poll_interval = Duration::from_secs(config.poll_interval_secs);

    loop {
        let (returned, outcome) = run_cycle(session, &uploader).await?;
        session = returned;

        let delay = outcome.delay(poll_interval);
        info!("Sleeping for {} seconds", delay.as_secs_f32());
        sleep(delay).await;
    }
}

/// Set up console logging, and forward warnings and errors to Sentry when a DSN is given
///
/// The returned guard flushes pending Sentry events when dropped.
fn init_logging(sentry_dsn: Option<Dsn>) -> Option<sentry::ClientInitGuard> {
    let logger = env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .format_timestamp_secs()
        .build();
    let max_level = logger.filter();

    let guard = sentry_dsn.map(|dsn| {
        sentry::init(sentry::ClientOptions {
            dsn: Some(dsn),
            release: sentry::release_name!(),
            ..Default::default()
        })
    });

    // Without an initialised client the Sentry side is a no-op
    let logger = sentry_log::SentryLogger::with_dest(logger).filter(|metadata| {
        match metadata.level() {
            log::Level::Error | log::Level::Warn => sentry_log::LogFilter::Event,
            _ => sentry_log::LogFilter::Breadcrumb,
        }
    });

    if log::set_boxed_logger(Box::new(logger)).is_ok() {
        log::set_max_level(max_level);
    }

    guard
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration, then initialize logging so a bad config is still reported
    let config = StationConfig::new();
    let _sentry = init_logging(
        config
            .as_ref()
            .ok()
            .and_then(|config| config.sentry_dsn.clone()),
    );

    let config = match config {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e);
        }
    };

    let port = match open_port(&config.device_port, config.baud_rate) {
        Ok(port) => port,
        Err(e) => {
            error!("Failed to open serial port {}: {}", config.device_port, e);
            return Err(e.into());
        }
    };
    let session = Session::new(port);

    // Handle Ctrl+C gracefully
    let (tx, mut rx) = tokio::sync::oneshot::channel();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            return;
        }
        let _ = tx.send(());
    });

    // Run main loop or wait for shutdown signal
    tokio::select! {
        result = main_loop(config, session) => {
            match result {
                Ok(_) => info!("Program completed successfully"),
                Err(e) => error!("Fatal error: {}", e),
            }
        }
        _ = &mut rx => {
            info!("Program terminated by user. Exiting gracefully.");
        }
    }

    Ok(())
}
