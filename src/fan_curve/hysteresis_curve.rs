use crate::fan_curve::{CurveError, FanSpeed, step_curve::StepCurve};

// Map temperatures to fan speeds from a threshold table.
//
// The speed rises as soon as the temperature crosses a boundary but only
// falls once the temperature is at least `margin` degrees below the boundary
// of the band the fan is running in. The last commanded speed is passed in
// by the caller, so the curve itself holds no state.
#[derive(Debug, Clone)]
pub struct HysteresisCurve {
    curve: StepCurve,

    // Hysteresis margin in degrees Celsius
    margin: f32,

    // Valid speed range of the fan
    min_speed: FanSpeed,
    max_speed: FanSpeed,

    // Below this temperature (and the first point) the fan is stopped
    full_stop_below: Option<f32>,
}

impl HysteresisCurve {
    pub fn new(
        curve: StepCurve,
        margin: f32,
        min_speed: FanSpeed,
        max_speed: FanSpeed,
    ) -> Result<HysteresisCurve, CurveError> {
        if min_speed > max_speed {
            return Err(CurveError::InvertedLimits {
                min: min_speed.get(),
                max: max_speed.get(),
            });
        }

        if min_speed.is_stopped() {
            return Err(CurveError::ZeroMinimum);
        }

        if !margin.is_finite() || margin < 0. {
            return Err(CurveError::InvalidHysteresis(margin));
        }

        // A margin as wide as a band would skip that band on the way down
        if let Some(width) = curve.narrowest_band() {
            if margin >= width {
                return Err(CurveError::HysteresisTooWide { margin, width });
            }
        }

        Ok(Self {
            curve,
            margin,
            min_speed,
            max_speed,
            full_stop_below: None,
        })
    }

    // Allow the fan to stop below the given temperature
    pub fn with_full_stop_below(
        mut self,
        temp: Option<f32>,
    ) -> Result<HysteresisCurve, CurveError> {
        if let Some(t) = temp {
            if !t.is_finite() {
                return Err(CurveError::InvalidFullStop(t));
            }
        }

        self.full_stop_below = temp;

        Ok(self)
    }

    // Compute the speed for the current temperature given the last
    // commanded speed, None if nothing has been commanded yet
    pub fn compute_speed(&self, temp: f32, last: Option<FanSpeed>) -> FanSpeed {
        let candidate = self.base_speed(temp);

        match last {
            // Cooling down, stay in the current band until the
            // temperature is far enough below its boundary
            Some(last) if candidate < last => {
                let held = self.held_speed(temp);
                candidate.max(held.min(last))
            }
            _ => candidate,
        }
    }

    // Speed for the temperature without hysteresis
    pub fn base_speed(&self, temp: f32) -> FanSpeed {
        if temp > self.curve.highest_temp() {
            return self.max_speed;
        }

        match self.curve.get_speed(temp) {
            Some(speed) => self.clamp(speed),
            None => self.floor_speed(temp, 0.),
        }
    }

    // Same mapping with every boundary lowered by the margin, the
    // top of the table bounds the max_speed band and the full stop
    // temperature bounds the min_speed band
    fn held_speed(&self, temp: f32) -> FanSpeed {
        if temp > self.curve.highest_temp() - self.margin {
            return self.max_speed;
        }

        match self.curve.get_held_speed(temp, self.margin) {
            Some(speed) => self.clamp(speed),
            None => self.floor_speed(temp, self.margin),
        }
    }

    // Speed below the first point of the table, the only place
    // a stopped fan can come from
    fn floor_speed(&self, temp: f32, margin: f32) -> FanSpeed {
        match self.full_stop_below {
            Some(limit) if temp <= limit - margin && temp < limit => FanSpeed::STOP,
            _ => self.min_speed,
        }
    }

    fn clamp(&self, speed: FanSpeed) -> FanSpeed {
        speed.clamp(self.min_speed, self.max_speed)
    }

    pub fn max_speed(&self) -> FanSpeed {
        self.max_speed
    }
}
