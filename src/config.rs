use std::{
    fs::File,
    io::{self, BufReader},
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::{
    bus::{
        RetryPolicy,
        i2c_device::{DEFAULT_FAN_ADDRESS, DEFAULT_FAN_REGISTER, DEFAULT_I2C_DEVICE},
    },
    fan_curve::{
        CurveError, FanSpeed, hysteresis_curve::HysteresisCurve,
        step_curve::StepCurve,
    },
    sensor::{
        TemperatureSensor, ThermalZone, Vcgencmd,
        thermal_zone::DEFAULT_THERMAL_ZONE, vcgencmd::DEFAULT_VCGENCMD,
    },
};

pub const DEFAULT_CONFIG_PATH: &str = "/etc/cm4-fan/config.json";

// Bounds on the polling interval in seconds
pub const MIN_INTERVAL_SECS: u64 = 4;
pub const MAX_INTERVAL_SECS: u64 = 60;

// Bounds on the fan write retries, so the shutdown
// write cannot keep the process alive for long
pub const MAX_WRITE_ATTEMPTS: u32 = 5;
pub const MAX_RETRY_DELAY_MS: u64 = 200;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration file {}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse configuration file {}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error("invalid fan curve settings")]
    Curve(#[from] CurveError),
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SensorConfig {
    ThermalZone { path: PathBuf },
    Vcgencmd { command: PathBuf },
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct BusConfig {
    pub device: PathBuf,
    pub address: u16,
    pub register: u8,
    pub write_attempts: u32,
    pub retry_delay_ms: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub interval_secs: u64,

    // (temperature in °C, fan speed) breakpoints
    pub thresholds: Vec<(f32, u8)>,
    pub hysteresis: f32,

    pub min_speed: u8,
    pub max_speed: u8,
    pub full_stop_below: Option<f32>,

    // Speed written on exit, max_speed when not set
    pub shutdown_speed: Option<u8>,
    pub spin_up_on_start: bool,
    // Run at max_speed after this many failed readings in a row
    pub sensor_failsafe_after: Option<u32>,

    pub sensor: SensorConfig,
    pub bus: BusConfig,
}

impl Config {
    // Load and validate the configuration file,
    // a missing file gives the default configuration
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        debug!("Parsing config file at: {:?}", path);

        let file = match File::open(path) {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                info!(
                    "No configuration file at {}, using defaults",
                    path.display()
                );

                let config = Self::default();
                config.validate()?;
                return Ok(config);
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        let config: Config = serde_json::from_reader(BufReader::new(file))
            .map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        config.validate()?;

        Ok(config)
    }

    // Check everything that cannot be expressed in the types
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(MIN_INTERVAL_SECS..=MAX_INTERVAL_SECS).contains(&self.interval_secs)
        {
            return Err(ConfigError::Invalid(format!(
                "interval_secs must be between {MIN_INTERVAL_SECS} and {MAX_INTERVAL_SECS}, got {}",
                self.interval_secs
            )));
        }

        if self.bus.address > 0x7f {
            return Err(ConfigError::Invalid(format!(
                "bus address {:#x} is not a 7-bit address",
                self.bus.address
            )));
        }

        if !(1..=MAX_WRITE_ATTEMPTS).contains(&self.bus.write_attempts) {
            return Err(ConfigError::Invalid(format!(
                "bus write_attempts must be between 1 and {MAX_WRITE_ATTEMPTS}, got {}",
                self.bus.write_attempts
            )));
        }

        if self.bus.retry_delay_ms > MAX_RETRY_DELAY_MS {
            return Err(ConfigError::Invalid(format!(
                "bus retry_delay_ms must be at most {MAX_RETRY_DELAY_MS}, got {}",
                self.bus.retry_delay_ms
            )));
        }

        if self.sensor_failsafe_after == Some(0) {
            return Err(ConfigError::Invalid(
                "sensor_failsafe_after must be at least 1".to_string(),
            ));
        }

        if let Some(speed) = self.shutdown_speed {
            if !(self.min_speed..=self.max_speed).contains(&speed) {
                return Err(ConfigError::Invalid(format!(
                    "shutdown_speed {speed} is outside {}..={}",
                    self.min_speed, self.max_speed
                )));
            }
        }

        // Building the curve checks the table and the speed limits
        self.curve()?;

        Ok(())
    }

    pub fn curve(&self) -> Result<HysteresisCurve, CurveError> {
        let table = StepCurve::new(&self.thresholds)?;

        HysteresisCurve::new(
            table,
            self.hysteresis,
            FanSpeed::new(self.min_speed),
            FanSpeed::new(self.max_speed),
        )?
        .with_full_stop_below(self.full_stop_below)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn shutdown_speed(&self) -> FanSpeed {
        FanSpeed::new(self.shutdown_speed.unwrap_or(self.max_speed))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.bus.write_attempts,
            Duration::from_millis(self.bus.retry_delay_ms),
        )
    }

    pub fn sensor(&self) -> Box<dyn TemperatureSensor + Send> {
        match &self.sensor {
            SensorConfig::ThermalZone { path } => Box::new(ThermalZone::new(path)),
            SensorConfig::Vcgencmd { command } => Box::new(Vcgencmd::new(command)),
        }
    }

    // Pretty printed Json of the effective configuration
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            interval_secs: 8,

            // 25%, 50%, 75% and 100% duty
            thresholds: vec![(40., 63), (60., 127), (65., 191), (70., 255)],
            hysteresis: 3.,

            min_speed: 45,
            max_speed: 255,
            full_stop_below: None,

            shutdown_speed: None,
            spin_up_on_start: false,
            sensor_failsafe_after: None,

            sensor: SensorConfig::default(),
            bus: BusConfig::default(),
        }
    }
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self::ThermalZone {
            path: PathBuf::from(DEFAULT_THERMAL_ZONE),
        }
    }
}

impl SensorConfig {
    pub fn vcgencmd() -> Self {
        Self::Vcgencmd {
            command: PathBuf::from(DEFAULT_VCGENCMD),
        }
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            device: PathBuf::from(DEFAULT_I2C_DEVICE),
            address: DEFAULT_FAN_ADDRESS,
            register: DEFAULT_FAN_REGISTER,
            write_attempts: 3,
            retry_delay_ms: 50,
        }
    }
}
