use std::{
    fs::{File, OpenOptions},
    io::{self, Write},
    os::fd::AsRawFd,
    path::{Path, PathBuf},
};

use tracing::debug;

use crate::bus::{BusError, FanBus};

// From linux/i2c-dev.h
const I2C_SLAVE: u64 = 0x0703;

pub const DEFAULT_I2C_DEVICE: &str = "/dev/i2c-10";
pub const DEFAULT_FAN_ADDRESS: u16 = 0x2f;
pub const DEFAULT_FAN_REGISTER: u8 = 0x30;

// Fan controller behind a Linux i2c-dev character device
#[derive(Debug)]
pub struct I2cDevice {
    file: File,
    path: PathBuf,
    address: u16,
}

impl I2cDevice {
    // Open the bus and bind it to the 7-bit device address
    pub fn open(path: &Path, address: u16) -> Result<Self, BusError> {
        let not_found = |source: io::Error| BusError::DeviceNotFound {
            path: path.to_path_buf(),
            address,
            source,
        };

        if address > 0x7f {
            return Err(not_found(io::Error::new(
                io::ErrorKind::InvalidInput,
                "not a 7-bit address",
            )));
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(not_found)?;

        // SAFETY: the descriptor is owned by `file` and stays open for the
        // call, I2C_SLAVE takes the address by value
        let ret = unsafe {
            libc::ioctl(file.as_raw_fd(), I2C_SLAVE as _, address as libc::c_ulong)
        };
        if ret < 0 {
            return Err(not_found(io::Error::last_os_error()));
        }

        debug!("Opened fan controller at {} address {:#04x}", path.display(), address);

        Ok(Self {
            file,
            path: path.to_path_buf(),
            address,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn address(&self) -> u16 {
        self.address
    }
}

impl FanBus for I2cDevice {
    fn write_byte_data(&mut self, register: u8, value: u8) -> io::Result<()> {
        // A plain two byte write is the SMBus write byte data transaction
        let written = self.file.write(&[register, value])?;

        if written != 2 {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                format!("short i2c write ({written} of 2 bytes)"),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_bus_is_device_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("i2c-10");

        let err = I2cDevice::open(&path, DEFAULT_FAN_ADDRESS).unwrap_err();
        assert!(matches!(
            err,
            BusError::DeviceNotFound { address: 0x2f, ref source, .. }
                if source.kind() == io::ErrorKind::NotFound
        ));
    }

    #[test]
    fn non_i2c_file_is_device_not_found() {
        let file = tempfile::NamedTempFile::new().unwrap();

        // A regular file opens but rejects the ioctl
        let err = I2cDevice::open(file.path(), DEFAULT_FAN_ADDRESS).unwrap_err();
        assert!(matches!(err, BusError::DeviceNotFound { .. }));
    }

    #[test]
    fn rejects_wide_addresses() {
        let file = tempfile::NamedTempFile::new().unwrap();

        let err = I2cDevice::open(file.path(), 0x80).unwrap_err();
        assert!(matches!(
            err,
            BusError::DeviceNotFound { ref source, .. }
                if source.kind() == io::ErrorKind::InvalidInput
        ));
    }

    #[test]
    fn error_message_shows_hex_address() {
        let err = I2cDevice::open(Path::new("/nonexistent/i2c-10"), 0x2f)
            .unwrap_err();

        assert_eq!(
            err.to_string(),
            "fan controller not found at /nonexistent/i2c-10 address 0x2f"
        );
    }
}
