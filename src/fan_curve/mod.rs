pub mod hysteresis_curve;
pub mod step_curve;

use std::fmt;

use thiserror::Error;

// Raw fan controller duty value, 0 is a full stop and 255 is 100%
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FanSpeed(u8);

impl FanSpeed {
    pub const STOP: FanSpeed = FanSpeed(0);
    pub const FULL: FanSpeed = FanSpeed(u8::MAX);

    pub const fn new(speed: u8) -> FanSpeed {
        FanSpeed(speed)
    }

    // Return the stored register value
    pub const fn get(&self) -> u8 {
        self.0
    }

    // Duty cycle as a rounded percentage, only used for reporting
    pub fn percent(&self) -> u8 {
        ((self.0 as u32 * 100 + 127) / 255) as u8
    }

    pub fn is_stopped(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for FanSpeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}%)", self.0, self.percent())
    }
}

// One breakpoint of the threshold table
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CurvePoint {
    pub temp: f32,
    pub fan_speed: FanSpeed,
}

impl From<(f32, u8)> for CurvePoint {
    fn from(value: (f32, u8)) -> Self {
        Self {
            temp: value.0,
            fan_speed: FanSpeed::new(value.1),
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum CurveError {
    #[error("the threshold table has no points")]
    Empty,
    #[error("threshold temperature {0} is not a finite number")]
    NonFiniteTemperature(f32),
    #[error("threshold temperatures must be strictly increasing ({prev}°C then {next}°C)")]
    UnorderedTemperatures { prev: f32, next: f32 },
    #[error("threshold speeds must not decrease ({prev} at {prev_temp}°C then {next} at {next_temp}°C)")]
    DecreasingSpeeds {
        prev_temp: f32,
        prev: u8,
        next_temp: f32,
        next: u8,
    },
    #[error("minimum speed {min} is greater than maximum speed {max}")]
    InvertedLimits { min: u8, max: u8 },
    #[error("minimum speed must be above zero, use full_stop_below to allow stopping the fan")]
    ZeroMinimum,
    #[error("hysteresis {0}°C must be a finite, non-negative number")]
    InvalidHysteresis(f32),
    #[error("hysteresis {margin}°C must be smaller than the narrowest band ({width}°C)")]
    HysteresisTooWide { margin: f32, width: f32 },
    #[error("full stop temperature {0} is not a finite number")]
    InvalidFullStop(f32),
}
