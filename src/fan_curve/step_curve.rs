use crate::fan_curve::{CurveError, CurvePoint, FanSpeed};

// Threshold table: each point sets the fan speed from its
// temperature up to the temperature of the next point
#[derive(Debug, Clone)]
pub struct StepCurve {
    points: Vec<CurvePoint>,
}

impl StepCurve {
    // Build the table from the given points, the points must have
    // strictly increasing temperatures and non-decreasing speeds
    pub fn new(points: &[(f32, u8)]) -> Result<StepCurve, CurveError> {
        let points: Vec<CurvePoint> =
            points.iter().map(|p| CurvePoint::from(*p)).collect();

        if points.is_empty() {
            return Err(CurveError::Empty);
        }

        if let Some(p) = points.iter().find(|p| !p.temp.is_finite()) {
            return Err(CurveError::NonFiniteTemperature(p.temp));
        }

        for pair in points.windows(2) {
            let (prev, next) = (pair[0], pair[1]);

            if next.temp <= prev.temp {
                return Err(CurveError::UnorderedTemperatures {
                    prev: prev.temp,
                    next: next.temp,
                });
            }

            if next.fan_speed < prev.fan_speed {
                return Err(CurveError::DecreasingSpeeds {
                    prev_temp: prev.temp,
                    prev: prev.fan_speed.get(),
                    next_temp: next.temp,
                    next: next.fan_speed.get(),
                });
            }
        }

        Ok(Self { points })
    }

    // Speed of the highest point at or below the temperature,
    // None when the temperature is below the first point
    pub fn get_speed(&self, temp: f32) -> Option<FanSpeed> {
        self.points
            .iter()
            .rev()
            .find(|p| p.temp <= temp)
            .map(|p| p.fan_speed)
    }

    // Same lookup with every boundary lowered by the given margin
    // and compared strictly: a band still holds while the
    // temperature is above its boundary minus the margin
    pub fn get_held_speed(&self, temp: f32, margin: f32) -> Option<FanSpeed> {
        self.points
            .iter()
            .rev()
            .find(|p| p.temp - margin < temp)
            .map(|p| p.fan_speed)
    }

    pub fn highest_temp(&self) -> f32 {
        self.points[self.points.len() - 1].temp
    }

    // Width of the narrowest band between two consecutive points
    pub fn narrowest_band(&self) -> Option<f32> {
        self.points
            .windows(2)
            .map(|pair| pair[1].temp - pair[0].temp)
            .reduce(f32::min)
    }

    pub fn points_num(&self) -> usize {
        self.points.len()
    }
}
