pub mod thermal_zone;
pub mod vcgencmd;

use std::io;

use thiserror::Error;

pub use thermal_zone::ThermalZone;
pub use vcgencmd::Vcgencmd;

#[derive(Debug, Error)]
pub enum SensorError {
    #[error("temperature sensor \"{source_name}\" unavailable")]
    Unavailable {
        source_name: String,
        #[source]
        source: SensorFault,
    },
}

// The reason a single reading failed
#[derive(Debug, Error)]
pub enum SensorFault {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("unexpected sensor output: {0:?}")]
    Malformed(String),
    #[error("reading {0} is not a valid temperature")]
    OutOfRange(f32),
    #[error("command exited with {0}")]
    Command(std::process::ExitStatus),
}

impl SensorError {
    pub fn unavailable(
        source_name: impl Into<String>,
        fault: impl Into<SensorFault>,
    ) -> Self {
        Self::Unavailable {
            source_name: source_name.into(),
            source: fault.into(),
        }
    }
}

// Board temperature source
pub trait TemperatureSensor {
    // Return a fresh reading in degrees Celsius.
    // Reading has no side effects and only blocks
    // for as long as the underlying platform call
    fn read_temperature(&mut self) -> Result<f32, SensorError>;

    // Human readable name used in log messages
    fn name(&self) -> String;
}

impl<T: TemperatureSensor + ?Sized> TemperatureSensor for Box<T> {
    fn read_temperature(&mut self) -> Result<f32, SensorError> {
        (**self).read_temperature()
    }

    fn name(&self) -> String {
        (**self).name()
    }
}

// Reject readings no real board can produce, a thermal zone
// reports garbage like this when its driver is misbehaving
pub(crate) fn check_reading(value: f32) -> Result<f32, SensorFault> {
    if value.is_finite() && (-70. ..=200.).contains(&value) {
        Ok(value)
    } else {
        Err(SensorFault::OutOfRange(value))
    }
}
