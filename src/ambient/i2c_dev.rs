//! Linux `i2c-dev` backed [`I2cBus`](super::sensor::I2cBus): set the
//! slave address via `ioctl(I2C_SLAVE)`, then plain `write`/`read` —
//! no SMBUS ioctls, since both sensors in the registry only need
//! simple register read/write transactions.

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::os::unix::io::AsRawFd;
use std::path::Path;
use std::sync::Mutex;

use crate::error::{Error, Result};

use super::sensor::I2cBus;

const I2C_SLAVE: libc::c_ulong = 0x0703;

pub struct LinuxI2cBus {
    file: Mutex<File>,
}

impl LinuxI2cBus {
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| Error::resource("I2C bus device", e))?;
        Ok(LinuxI2cBus { file: Mutex::new(file) })
    }

    fn select(&self, file: &File, address: u8) -> Result<()> {
        let ret = unsafe { libc::ioctl(file.as_raw_fd(), I2C_SLAVE, address as libc::c_ulong) };
        if ret < 0 {
            return Err(Error::errno(format!("failed selecting I2C address {:#04x}", address)));
        }
        Ok(())
    }
}

impl I2cBus for LinuxI2cBus {
    fn write_register(&self, address: u8, register: u8, value: u8) -> Result<()> {
        let mut file = self.file.lock().unwrap();
        self.select(&file, address)?;
        file.write_all(&[register, value]).map_err(Error::from)
    }

    fn read_register(&self, address: u8, register: u8) -> Result<u8> {
        let mut buf = [0u8; 1];
        let mut file = self.file.lock().unwrap();
        self.select(&file, address)?;
        file.write_all(&[register]).map_err(Error::from)?;
        file.read_exact(&mut buf).map_err(Error::from)?;
        Ok(buf[0])
    }

    fn read_block(&self, address: u8, register: u8, buf: &mut [u8]) -> Result<()> {
        let mut file = self.file.lock().unwrap();
        self.select(&file, address)?;
        file.write_all(&[register]).map_err(Error::from)?;
        file.read_exact(buf).map_err(Error::from)
    }
}
