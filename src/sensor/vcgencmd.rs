use std::{
    path::{Path, PathBuf},
    process::Command,
};

use tokio::{
    runtime::{Handle, RuntimeFlavor},
    task,
};
use tracing::trace;

use crate::sensor::{SensorError, SensorFault, TemperatureSensor, check_reading};

pub const DEFAULT_VCGENCMD: &str = "vcgencmd";

// SoC temperature reported by the VideoCore firmware
// through `vcgencmd measure_temp`
#[derive(Debug, Clone)]
pub struct Vcgencmd {
    program: PathBuf,
}

impl Vcgencmd {
    pub fn new(program: &Path) -> Self {
        Self {
            program: program.to_path_buf(),
        }
    }

    fn read(&self) -> Result<f32, SensorFault> {
        let output = run_blocking(|| {
            Command::new(&self.program).arg("measure_temp").output()
        })?;

        if !output.status.success() {
            return Err(SensorFault::Command(output.status));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        trace!("vcgencmd output: {:?}", stdout);

        parse_measure_temp(&stdout)
    }
}

impl Default for Vcgencmd {
    fn default() -> Self {
        Self::new(Path::new(DEFAULT_VCGENCMD))
    }
}

impl TemperatureSensor for Vcgencmd {
    fn read_temperature(&mut self) -> Result<f32, SensorError> {
        self.read()
            .map_err(|fault| SensorError::unavailable(self.name(), fault))
    }

    fn name(&self) -> String {
        format!("{} measure_temp", self.program.display())
    }
}

// The firmware call can take a while, on a multi-threaded runtime
// let the other tasks move to another worker in the meantime
fn run_blocking<T>(f: impl FnOnce() -> T) -> T {
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            task::block_in_place(f)
        }
        _ => f(),
    }
}

// Parse output of the form "temp=48.3'C"
pub fn parse_measure_temp(output: &str) -> Result<f32, SensorFault> {
    let malformed = || SensorFault::Malformed(output.trim().to_string());

    let value = output
        .trim()
        .strip_prefix("temp=")
        .and_then(|rest| rest.strip_suffix("'C"))
        .ok_or_else(malformed)?;

    let temp: f32 = value.parse().map_err(|_| malformed())?;

    check_reading(temp)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_firmware_output() {
        assert_eq!(parse_measure_temp("temp=48.3'C\n").unwrap(), 48.3);
        assert_eq!(parse_measure_temp("temp=61'C").unwrap(), 61.);
    }

    #[test]
    fn rejects_other_output() {
        for output in ["", "temp=48.3", "48.3'C", "temp=hot'C", "error=1"] {
            assert!(
                matches!(parse_measure_temp(output), Err(SensorFault::Malformed(_))),
                "{output:?}"
            );
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn runs_inside_the_runtime() {
        let mut sensor = Vcgencmd::new(Path::new("/nonexistent/vcgencmd"));

        assert!(sensor.read_temperature().is_err());
    }

    #[test]
    fn missing_program_is_unavailable() {
        let mut sensor = Vcgencmd::new(Path::new("/nonexistent/vcgencmd"));

        let SensorError::Unavailable { source, .. } =
            sensor.read_temperature().unwrap_err();
        assert!(matches!(source, SensorFault::Io(_)));
    }
}
