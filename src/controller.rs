use std::time::Duration;

use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::{
    bus::{BusError, FanBus, FanWriter, WriteOutcome},
    fan_curve::{FanSpeed, hysteresis_curve::HysteresisCurve},
    sensor::{SensorError, TemperatureSensor},
};

// Last speed the fan controller is known to hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ControllerState {
    #[default]
    Unknown,
    Commanded(FanSpeed),
}

impl ControllerState {
    pub fn last_speed(&self) -> Option<FanSpeed> {
        match self {
            Self::Unknown => None,
            Self::Commanded(speed) => Some(*speed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Sampling,
    Mapping,
    Writing,
    ShuttingDown,
}

// Result of a single control cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    // A new speed was written to the device
    Commanded(FanSpeed),
    // The device already holds the computed speed
    Unchanged(FanSpeed),
    // No reading this cycle, the fan keeps its speed
    SensorUnavailable,
    // The write failed on every attempt, the state is unchanged
    WriteFailed,
}

pub struct ControllerSettings {
    pub interval: Duration,
    pub shutdown_speed: FanSpeed,
    pub spin_up_on_start: bool,
    pub sensor_failsafe_after: Option<u32>,
}

// Single sensor to single fan control loop
pub struct Controller<S: TemperatureSensor, B: FanBus> {
    sensor: S,
    curve: HysteresisCurve,
    writer: FanWriter<B>,

    settings: ControllerSettings,

    state: ControllerState,
    phase: Phase,

    // Failed readings in a row
    sensor_failures: u32,
}

impl<S: TemperatureSensor, B: FanBus> Controller<S, B> {
    pub fn new(
        sensor: S,
        curve: HysteresisCurve,
        writer: FanWriter<B>,
        settings: ControllerSettings,
    ) -> Self {
        Self {
            sensor,
            curve,
            writer,
            settings,
            state: ControllerState::Unknown,
            phase: Phase::Idle,
            sensor_failures: 0,
        }
    }

    // Run the control loop until the token is cancelled,
    // then leave the fan at the shutdown speed
    pub async fn run(&mut self, run_token: CancellationToken) {
        info!(
            "Controller: Running every {:?} on {}",
            self.settings.interval,
            self.sensor.name()
        );

        if self.settings.spin_up_on_start {
            let max_speed = self.curve.max_speed();

            info!("Spinning fan up to {max_speed}");
            select! {
                _ = run_token.cancelled() => {},
                _ = self.command(max_speed) => {}
            }
        }

        loop {
            if run_token.is_cancelled() {
                break;
            }

            // A cycle stuck in write retries is dropped on cancellation
            let outcome = select! {
                _ = run_token.cancelled() => { break; },
                outcome = self.cycle() => outcome
            };
            trace!("Cycle outcome: {:?}", outcome);

            select! {
                _ = run_token.cancelled() => { break; },
                _ = tokio::time::sleep(self.settings.interval) => {}
            }
        }

        self.shutdown().await;
    }

    // Sample, map and write once
    pub async fn cycle(&mut self) -> CycleOutcome {
        self.set_phase(Phase::Sampling);

        let temp = match self.sensor.read_temperature() {
            Ok(temp) => {
                self.sensor_failures = 0;
                temp
            }
            Err(err) => {
                let outcome = self.handle_sensor_error(err).await;
                self.set_phase(Phase::Idle);

                return outcome;
            }
        };

        self.set_phase(Phase::Mapping);

        let last = self.state.last_speed();
        let speed = self.curve.compute_speed(temp, last);

        debug!("{temp:.1}°C -> {speed}");

        if let Some(last) = last {
            if speed != last {
                let direction = if speed > last { "up" } else { "down" };
                info!("{temp:.1}°C: Moving {direction} from {last} to {speed}");
            }
        }

        self.set_phase(Phase::Writing);
        let outcome = self.command(speed).await;
        self.set_phase(Phase::Idle);

        outcome
    }

    // Write the shutdown speed once, failures are only logged
    pub async fn shutdown(&mut self) {
        self.set_phase(Phase::ShuttingDown);

        let speed = self.settings.shutdown_speed;
        info!("Controller: Quitting, setting fan to {speed}");

        if let CycleOutcome::WriteFailed = self.command(speed).await {
            error!("Fan may be left at {:?}", self.state);
        }
    }

    // Write a speed and update the state if the write succeeded
    async fn command(&mut self, speed: FanSpeed) -> CycleOutcome {
        match self.writer.write_speed(speed).await {
            Ok(outcome) => {
                self.state = ControllerState::Commanded(speed);

                match outcome {
                    WriteOutcome::Written => CycleOutcome::Commanded(speed),
                    WriteOutcome::Skipped => CycleOutcome::Unchanged(speed),
                }
            }
            Err(err) => {
                log_bus_error(&err);
                CycleOutcome::WriteFailed
            }
        }
    }

    async fn handle_sensor_error(&mut self, err: SensorError) -> CycleOutcome {
        self.sensor_failures = self.sensor_failures.saturating_add(1);

        warn!("{}", error_chain(&err));

        let Some(limit) = self.settings.sensor_failsafe_after else {
            return CycleOutcome::SensorUnavailable;
        };

        if self.sensor_failures >= limit {
            let max_speed = self.curve.max_speed();

            if self.state.last_speed() != Some(max_speed) {
                warn!(
                    "{} failed readings in a row, running fan at {max_speed}",
                    self.sensor_failures
                );
            }

            self.set_phase(Phase::Writing);
            self.command(max_speed).await;
        }

        CycleOutcome::SensorUnavailable
    }

    fn set_phase(&mut self, phase: Phase) {
        trace!("Phase {:?} -> {:?}", self.phase, phase);
        self.phase = phase;
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn writer(&self) -> &FanWriter<B> {
        &self.writer
    }

    pub fn writer_mut(&mut self) -> &mut FanWriter<B> {
        &mut self.writer
    }
}

fn log_bus_error(err: &BusError) {
    error!("{}", error_chain(err));
}

// Join an error and its sources into a single line
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut causes = vec![err.to_string()];
    let mut source = err.source();

    while let Some(cause) = source {
        causes.push(cause.to_string());
        source = cause.source();
    }

    causes.join(": ")
}
