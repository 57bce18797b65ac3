use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::sensor::{SensorError, SensorFault, TemperatureSensor, check_reading};

pub const DEFAULT_THERMAL_ZONE: &str = "/sys/class/thermal/thermal_zone0/temp";

// Linux thermal zone exposed through sysfs, the file
// holds the temperature in millidegrees Celsius
#[derive(Debug, Clone)]
pub struct ThermalZone {
    path: PathBuf,
}

impl ThermalZone {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<f32, SensorFault> {
        let raw = fs::read_to_string(&self.path)?;
        let raw = raw.trim();

        let millis: i64 = raw
            .parse()
            .map_err(|_| SensorFault::Malformed(raw.to_string()))?;

        check_reading(millis as f32 / 1000.)
    }
}

impl Default for ThermalZone {
    fn default() -> Self {
        Self::new(Path::new(DEFAULT_THERMAL_ZONE))
    }
}

impl TemperatureSensor for ThermalZone {
    fn read_temperature(&mut self) -> Result<f32, SensorError> {
        self.read()
            .map_err(|fault| SensorError::unavailable(self.name(), fault))
    }

    fn name(&self) -> String {
        self.path.display().to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;

    fn zone_with(content: &str) -> (NamedTempFile, ThermalZone) {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{content}").unwrap();

        let zone = ThermalZone::new(file.path());
        (file, zone)
    }

    #[test]
    fn reads_millidegrees() {
        let (_file, mut zone) = zone_with("48312\n");

        let temp = zone.read_temperature().unwrap();
        assert!((temp - 48.312).abs() < 1e-3);
    }

    #[test]
    fn reads_below_zero() {
        let (_file, mut zone) = zone_with("-4500");

        assert_eq!(zone.read_temperature().unwrap(), -4.5);
    }

    #[test]
    fn garbage_is_unavailable() {
        let (_file, mut zone) = zone_with("hot");

        let SensorError::Unavailable { source, .. } =
            zone.read_temperature().unwrap_err();
        assert!(matches!(source, SensorFault::Malformed(s) if s == "hot"));
    }

    #[test]
    fn missing_file_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let mut zone = ThermalZone::new(&dir.path().join("temp"));

        let SensorError::Unavailable { source, .. } =
            zone.read_temperature().unwrap_err();
        assert!(matches!(source, SensorFault::Io(_)));
    }
}
