use crate::drivers::flash::FlashError;

/// Errors surfaced by the IMU core.
///
/// `E` is the error type of the underlying I²C implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error<E> {
    /// Register transfer failed on the bus
    Bus(E),
    /// CHIP_ID did not read back as a BNO055 (contains the value read)
    InvalidChipId(u8),
    /// A register write did not fit into one bus transfer
    TransferTooLong(usize),
    /// Calibration capture requested before all sub-scores reached 3
    /// (contains the calibration status byte)
    NotCalibrated(u8),
    /// Flash unlock/erase/program/lock failed
    Flash(FlashError),
}

impl<E> From<E> for Error<E> {
    fn from(error: E) -> Self {
        Self::Bus(error)
    }
}

impl<E: embedded_hal::i2c::Error> Error<E> {
    /// HAL independent cause of a bus failure.
    pub fn bus_kind(&self) -> Option<embedded_hal::i2c::ErrorKind> {
        match self {
            Error::Bus(e) => Some(e.kind()),
            _ => None,
        }
    }
}

// Bus errors are logged through their `ErrorKind` so any HAL's error works.
#[cfg(feature = "defmt")]
impl<E: embedded_hal::i2c::Error> defmt::Format for Error<E> {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Error::Bus(e) => defmt::write!(f, "Bus({})", e.kind()),
            Error::InvalidChipId(id) => defmt::write!(f, "InvalidChipId(0x{:02X})", id),
            Error::TransferTooLong(len) => defmt::write!(f, "TransferTooLong({})", len),
            Error::NotCalibrated(status) => defmt::write!(f, "NotCalibrated(0x{:02X})", status),
            Error::Flash(e) => defmt::write!(f, "Flash({})", e),
        }
    }
}
