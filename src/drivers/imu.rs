//! BNO055 register client and telemetry block decoding.

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::mutex::Mutex;
use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::i2c::I2c;

use crate::config::{CONFIG_MODE_SETTLE_MS, FUSION_MODE_SETTLE_MS};
use crate::Error;

// BNO055 I2C address, COM3 pulled high
pub const BNO055_ADDRESS_HIGH: u8 = 0x29;

// BNO055 ID
pub const BNO055_ID: u8 = 0xA0;

/// Register map, page 0 unless noted.
pub mod reg {
    pub const CHIP_ID: u8 = 0x00;
    pub const ACC_DATA_X_LSB: u8 = 0x08;
    pub const MAG_DATA_X_LSB: u8 = 0x0E;
    pub const GYR_DATA_X_LSB: u8 = 0x14;
    pub const EUL_HEADING_LSB: u8 = 0x1A;
    pub const QUA_DATA_W_LSB: u8 = 0x20;
    pub const LIA_DATA_X_LSB: u8 = 0x28;
    pub const GRV_DATA_X_LSB: u8 = 0x2E;
    pub const TEMP: u8 = 0x34;
    pub const CALIB_STAT: u8 = 0x35;
    pub const OPR_MODE: u8 = 0x3D;
    pub const SYS_TRIGGER: u8 = 0x3F;
    pub const ACC_OFFSET_X_LSB: u8 = 0x55;
    pub const MAG_RADIUS_MSB: u8 = 0x6A;
}

/// SYS_TRIGGER bit selecting the external 32 kHz crystal.
pub const SYS_TRIGGER_EXT_CLK: u8 = 1 << 7;

/// Number of offset/radius bytes (ACC_OFFSET_X_LSB ..= MAG_RADIUS_MSB).
pub const OFFSETS_LEN: usize = (reg::MAG_RADIUS_MSB - reg::ACC_OFFSET_X_LSB + 1) as usize;

// Largest register write issued in one transfer (the offset block).
const MAX_WRITE_LEN: usize = 32;

/// OPR_MODE codes, see datasheet table 3-5.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum OperatingMode {
    Config = 0b0000_0000,
    Ndof = 0b0000_1100,
}

impl OperatingMode {
    /// Time the chip needs before it accepts the next command in this mode.
    pub const fn settle_ms(self) -> u32 {
        match self {
            OperatingMode::Config => CONFIG_MODE_SETTLE_MS,
            OperatingMode::Ndof => FUSION_MODE_SETTLE_MS,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Vector3 {
    pub x: i16,
    pub y: i16,
    pub z: i16,
}

/// Euler angles, 1° = 16 LSB.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EulerAngles {
    pub heading: i16,
    pub roll: i16,
    pub pitch: i16,
}

/// Unit quaternion, 1.0 = 2^14 LSB.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Quaternion {
    pub w: u16,
    pub x: u16,
    pub y: u16,
    pub z: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CalibrationStatus {
    pub sys: u8,   // System calibration (0-3)
    pub gyro: u8,  // Gyroscope calibration (0-3)
    pub accel: u8, // Accelerometer calibration (0-3)
    pub mag: u8,   // Magnetometer calibration (0-3)
}

impl CalibrationStatus {
    pub const FULLY_CALIBRATED: u8 = 0xFF;

    pub fn from_byte(calib_byte: u8) -> Self {
        Self {
            sys: (calib_byte >> 6) & 0x03,
            gyro: (calib_byte >> 4) & 0x03,
            accel: (calib_byte >> 2) & 0x03,
            mag: calib_byte & 0x03,
        }
    }

    pub fn is_fully_calibrated(&self) -> bool {
        self.sys == 3 && self.gyro == 3 && self.accel == 3 && self.mag == 3
    }
}

/// One decoded read of the contiguous telemetry block starting at
/// `ACC_DATA_X_LSB`.
///
/// Acceleration values use 1 m/s² = 100 LSB, magnetic field 1 µT = 16 LSB,
/// angular velocity 1 °/s = 16 LSB, temperature 1 °C = 1 LSB.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Snapshot {
    pub acceleration: Vector3,
    pub magnetic_field: Vector3,
    pub angular_velocity: Vector3,
    pub orientation: EulerAngles,
    pub quaternion: Quaternion,
    pub linear_acceleration: Vector3,
    pub gravity_vector: Vector3,
    pub temperature: i8,
    pub calibration_status: u8,
}

// Byte offsets inside the telemetry block, relative to ACC_DATA_X_LSB.
mod offset {
    use super::reg;

    pub const ACC: usize = 0;
    pub const MAG: usize = (reg::MAG_DATA_X_LSB - reg::ACC_DATA_X_LSB) as usize;
    pub const GYR: usize = (reg::GYR_DATA_X_LSB - reg::ACC_DATA_X_LSB) as usize;
    pub const EUL: usize = (reg::EUL_HEADING_LSB - reg::ACC_DATA_X_LSB) as usize;
    pub const QUA: usize = (reg::QUA_DATA_W_LSB - reg::ACC_DATA_X_LSB) as usize;
    pub const LIA: usize = (reg::LIA_DATA_X_LSB - reg::ACC_DATA_X_LSB) as usize;
    pub const GRV: usize = (reg::GRV_DATA_X_LSB - reg::ACC_DATA_X_LSB) as usize;
    pub const TEMP: usize = (reg::TEMP - reg::ACC_DATA_X_LSB) as usize;
    pub const CALIB: usize = (reg::CALIB_STAT - reg::ACC_DATA_X_LSB) as usize;
}

fn i16_at(raw: &[u8], at: usize) -> i16 {
    i16::from_le_bytes([raw[at], raw[at + 1]])
}

fn u16_at(raw: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([raw[at], raw[at + 1]])
}

impl Vector3 {
    pub const LEN: usize = 6;

    fn decode(raw: &[u8], at: usize) -> Self {
        Self {
            x: i16_at(raw, at),
            y: i16_at(raw, at + 2),
            z: i16_at(raw, at + 4),
        }
    }

    pub fn encode(&self, out: &mut [u8]) {
        out[0..2].copy_from_slice(&self.x.to_le_bytes());
        out[2..4].copy_from_slice(&self.y.to_le_bytes());
        out[4..6].copy_from_slice(&self.z.to_le_bytes());
    }
}

impl EulerAngles {
    pub const LEN: usize = 6;

    fn decode(raw: &[u8], at: usize) -> Self {
        Self {
            heading: i16_at(raw, at),
            roll: i16_at(raw, at + 2),
            pitch: i16_at(raw, at + 4),
        }
    }

    pub fn encode(&self, out: &mut [u8]) {
        out[0..2].copy_from_slice(&self.heading.to_le_bytes());
        out[2..4].copy_from_slice(&self.roll.to_le_bytes());
        out[4..6].copy_from_slice(&self.pitch.to_le_bytes());
    }
}

impl Quaternion {
    pub const LEN: usize = 8;

    fn decode(raw: &[u8], at: usize) -> Self {
        Self {
            w: u16_at(raw, at),
            x: u16_at(raw, at + 2),
            y: u16_at(raw, at + 4),
            z: u16_at(raw, at + 6),
        }
    }

    pub fn encode(&self, out: &mut [u8]) {
        out[0..2].copy_from_slice(&self.w.to_le_bytes());
        out[2..4].copy_from_slice(&self.x.to_le_bytes());
        out[4..6].copy_from_slice(&self.y.to_le_bytes());
        out[6..8].copy_from_slice(&self.z.to_le_bytes());
    }
}

impl Snapshot {
    /// Size of the telemetry block on the bus.
    pub const LEN: usize = offset::CALIB + 1;

    pub fn from_bytes(raw: &[u8; Self::LEN]) -> Self {
        Self {
            acceleration: Vector3::decode(raw, offset::ACC),
            magnetic_field: Vector3::decode(raw, offset::MAG),
            angular_velocity: Vector3::decode(raw, offset::GYR),
            orientation: EulerAngles::decode(raw, offset::EUL),
            quaternion: Quaternion::decode(raw, offset::QUA),
            linear_acceleration: Vector3::decode(raw, offset::LIA),
            gravity_vector: Vector3::decode(raw, offset::GRV),
            temperature: raw[offset::TEMP] as i8,
            calibration_status: raw[offset::CALIB],
        }
    }

    /// Inverse of [`Snapshot::from_bytes`]; this is also the all-data payload.
    pub fn to_bytes(&self) -> [u8; Self::LEN] {
        let mut raw = [0u8; Self::LEN];
        self.acceleration.encode(&mut raw[offset::ACC..]);
        self.magnetic_field.encode(&mut raw[offset::MAG..]);
        self.angular_velocity.encode(&mut raw[offset::GYR..]);
        self.orientation.encode(&mut raw[offset::EUL..]);
        self.quaternion.encode(&mut raw[offset::QUA..]);
        self.linear_acceleration.encode(&mut raw[offset::LIA..]);
        self.gravity_vector.encode(&mut raw[offset::GRV..]);
        raw[offset::TEMP] = self.temperature as u8;
        raw[offset::CALIB] = self.calibration_status;
        raw
    }

    pub fn calibration(&self) -> CalibrationStatus {
        CalibrationStatus::from_byte(self.calibration_status)
    }
}

/// Register access to one device on a shared I²C bus.
///
/// Every call holds the bus lock for exactly one transfer and releases it on
/// return, including when the transfer fails.
pub struct RegisterBus<'a, M: RawMutex, I2C> {
    bus: &'a Mutex<M, I2C>,
    addr: u8,
}

impl<'a, M, I2C> RegisterBus<'a, M, I2C>
where
    M: RawMutex,
    I2C: I2c,
{
    pub const fn new(bus: &'a Mutex<M, I2C>, addr: u8) -> Self {
        Self { bus, addr }
    }

    pub fn address(&self) -> u8 {
        self.addr
    }

    pub async fn write(&self, reg: u8, data: &[u8]) -> Result<(), Error<I2C::Error>> {
        if data.len() > MAX_WRITE_LEN {
            return Err(Error::TransferTooLong(data.len()));
        }
        let mut buffer = [0u8; MAX_WRITE_LEN + 1];
        buffer[0] = reg;
        buffer[1..=data.len()].copy_from_slice(data);

        let mut i2c = self.bus.lock().await;
        i2c.write(self.addr, &buffer[..=data.len()]).await?;
        Ok(())
    }

    pub async fn read(&self, reg: u8, buf: &mut [u8]) -> Result<(), Error<I2C::Error>> {
        let mut i2c = self.bus.lock().await;
        i2c.write_read(self.addr, &[reg], buf).await?;
        Ok(())
    }

    pub async fn write_byte(&self, reg: u8, value: u8) -> Result<(), Error<I2C::Error>> {
        self.write(reg, &[value]).await
    }

    pub async fn read_byte(&self, reg: u8) -> Result<u8, Error<I2C::Error>> {
        let mut buf = [0u8; 1];
        self.read(reg, &mut buf).await?;
        Ok(buf[0])
    }
}

pub struct Bno055<'a, M: RawMutex, I2C> {
    bus: RegisterBus<'a, M, I2C>,
}

impl<'a, M, I2C> Bno055<'a, M, I2C>
where
    M: RawMutex,
    I2C: I2c,
{
    /// BNO055 with COM3 pulled high, as wired on the brick.
    pub const fn new(bus: &'a Mutex<M, I2C>) -> Self {
        Self::with_address(bus, BNO055_ADDRESS_HIGH)
    }

    pub const fn with_address(bus: &'a Mutex<M, I2C>, addr: u8) -> Self {
        Self {
            bus: RegisterBus::new(bus, addr),
        }
    }

    pub fn bus(&self) -> &RegisterBus<'a, M, I2C> {
        &self.bus
    }

    /// Wait for CHIP_ID to read back as a BNO055, retrying with progressive
    /// backoff while the chip finishes its power-on reset.
    pub async fn verify_chip_id<D: DelayNs>(
        &self,
        delay: &mut D,
        attempts: u8,
    ) -> Result<(), Error<I2C::Error>> {
        let mut last_error = Error::InvalidChipId(0);

        for attempt in 1..=attempts {
            match self.bus.read_byte(reg::CHIP_ID).await {
                Ok(BNO055_ID) => {
                    info!("BNO055 chip ID verified on attempt {}", attempt);
                    return Ok(());
                }
                Ok(id) => {
                    warn!(
                        "Invalid BNO055 ID: 0x{:02X}, expected 0x{:02X}",
                        id, BNO055_ID
                    );
                    last_error = Error::InvalidChipId(id);
                }
                Err(e) => {
                    warn!("BNO055 chip ID read {} failed", attempt);
                    last_error = e;
                }
            }

            if attempt < attempts {
                // 20ms, 40ms, 80ms, ...
                let delay_ms = 20u32 << (attempt - 1);
                delay.delay_ms(delay_ms).await;
            }
        }

        error!("BNO055 not responding after {} attempts", attempts);
        Err(last_error)
    }

    /// Write OPR_MODE and wait for the mode switch to settle.
    pub async fn set_mode<D: DelayNs>(
        &self,
        mode: OperatingMode,
        delay: &mut D,
    ) -> Result<(), Error<I2C::Error>> {
        self.bus.write_byte(reg::OPR_MODE, mode as u8).await?;
        delay.delay_ms(mode.settle_ms()).await;
        Ok(())
    }

    /// Clock the fusion core from the external crystal. Only accepted in
    /// config mode.
    pub async fn use_external_clock(&self) -> Result<(), Error<I2C::Error>> {
        self.bus
            .write_byte(reg::SYS_TRIGGER, SYS_TRIGGER_EXT_CLK)
            .await
    }

    /// Read the whole telemetry block in one transfer so all axes come from
    /// the same sample.
    pub async fn read_snapshot(&self) -> Result<Snapshot, Error<I2C::Error>> {
        let mut raw = [0u8; Snapshot::LEN];
        self.bus.read(reg::ACC_DATA_X_LSB, &mut raw).await?;
        Ok(Snapshot::from_bytes(&raw))
    }

    /// Offset and radius registers. Only valid in config mode.
    pub async fn read_offsets(&self) -> Result<[u8; OFFSETS_LEN], Error<I2C::Error>> {
        let mut raw = [0u8; OFFSETS_LEN];
        self.bus.read(reg::ACC_OFFSET_X_LSB, &mut raw).await?;
        Ok(raw)
    }

    pub async fn write_offsets(&self, raw: &[u8; OFFSETS_LEN]) -> Result<(), Error<I2C::Error>> {
        self.bus.write(reg::ACC_OFFSET_X_LSB, raw).await
    }
}
