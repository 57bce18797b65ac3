pub mod fan_writer;
pub mod i2c_device;

use std::{io, path::PathBuf};

use thiserror::Error;

pub use fan_writer::{FanWriter, RetryPolicy, WriteOutcome};
pub use i2c_device::I2cDevice;

#[derive(Debug, Error)]
pub enum BusError {
    #[error("fan controller not found at {} address {address:#04x}", .path.display())]
    DeviceNotFound {
        path: PathBuf,
        address: u16,
        #[source]
        source: io::Error,
    },
    #[error("failed to write fan speed {value} after {attempts} attempts")]
    WriteFailed {
        value: u8,
        attempts: u32,
        #[source]
        source: io::Error,
    },
}

// Raw access to the fan controller registers
pub trait FanBus {
    // Write a single byte to a device register (SMBus write byte data)
    fn write_byte_data(&mut self, register: u8, value: u8) -> io::Result<()>;
}

impl<T: FanBus + ?Sized> FanBus for Box<T> {
    fn write_byte_data(&mut self, register: u8, value: u8) -> io::Result<()> {
        (**self).write_byte_data(register, value)
    }
}
