use std::process::ExitCode;

use anyhow::{Context, Result};
use cm4_fan::{
    arg_parser::ArgsOptions,
    bus::{FanWriter, I2cDevice},
    config::{Config, ConfigError},
    controller::{Controller, ControllerSettings},
    errors::FanError,
    logger,
    sensor::TemperatureSensor,
};
use tokio::{
    select,
    signal::{
        ctrl_c,
        unix::{Signal, SignalKind, signal},
    },
};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{error, info};

type BoardController = Controller<Box<dyn TemperatureSensor + Send>, I2cDevice>;

#[tokio::main]
async fn main() -> ExitCode {
    // Parse the command line arguments
    let args_options = ArgsOptions::parse();

    logger::init_logging(args_options.verbose);

    match run(args_options).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            for e in err.chain() {
                error!("{e}");
            }

            ExitCode::FAILURE
        }
    }
}

async fn run(args_options: ArgsOptions) -> Result<()> {
    let config = Config::load(&args_options.config_file_path)
        .with_context(|| "Refusing to start with an invalid configuration")?;

    if args_options.check_config {
        println!("{}", config.to_json()?);
        return Ok(());
    }

    log_config(&config);

    let mut controller = build_controller(&config)
        .with_context(|| "Failed to set up the fan controller")?;

    // Install the handler before anything touches the fan, so
    // no failure after this point skips the shutdown write
    let sigterm = signal(SignalKind::terminate())
        .with_context(|| "Failed to install the SIGTERM handler")?;

    // This token and tracker will be used to handle graceful shutdown
    let tracker = TaskTracker::new();
    let token = CancellationToken::new();

    {
        let token = token.clone();

        tracker.spawn(async move {
            controller.run(token).await;
        });
    }

    let res = wait_for_termination(sigterm).await;
    info!("Termination requested");

    // Cancel the token so the controller writes
    // the shutdown speed and returns
    token.cancel();

    // Wait for the tasks to finish
    tracker.close();
    tracker.wait().await;

    info!("Stopped");

    res
}

fn build_controller(config: &Config) -> Result<BoardController, FanError> {
    let curve = config.curve().map_err(ConfigError::from)?;

    let device = I2cDevice::open(&config.bus.device, config.bus.address)?;
    let writer = FanWriter::new(device, config.bus.register, config.retry_policy());

    let settings = ControllerSettings {
        interval: config.interval(),
        shutdown_speed: config.shutdown_speed(),
        spin_up_on_start: config.spin_up_on_start,
        sensor_failsafe_after: config.sensor_failsafe_after,
    };

    Ok(Controller::new(config.sensor(), curve, writer, settings))
}

// Resolves on SIGINT or SIGTERM
async fn wait_for_termination(mut sigterm: Signal) -> Result<()> {
    select! {
        res = ctrl_c() => res.with_context(|| "Failed to listen for SIGINT")?,
        _ = sigterm.recv() => {},
    }

    Ok(())
}

fn log_config(config: &Config) {
    info!("Running...");
    info!("Polling interval: {} seconds", config.interval_secs);
    info!("Hysteresis: {}°C", config.hysteresis);

    let points: Vec<String> = config
        .thresholds
        .iter()
        .map(|(temp, speed)| format!("{temp}°C={speed}"))
        .collect();
    info!("Thresholds: {}", points.join(" | "));

    info!(
        "Speed range: {}..={}, full stop below: {:?}, shutdown speed: {}",
        config.min_speed,
        config.max_speed,
        config.full_stop_below,
        config.shutdown_speed()
    );
    info!(
        "Fan controller: {} address {:#04x} register {:#04x}",
        config.bus.device.display(),
        config.bus.address,
        config.bus.register
    );
}
