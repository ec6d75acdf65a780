//! Calibration record persistence.
//!
//! The BNO055 forgets its calibration on every power cycle. Once the fusion
//! core reports full calibration the offsets are read back and stored in a
//! flash slot; at boot the slot is pushed back into the sensor.
//!
//! Slot layout (little-endian):
//!
//! ```text
//! 0   acc offset  x, y, z   3 x i16
//! 6   mag offset  x, y, z   3 x i16
//! 12  gyr offset  x, y, z   3 x i16
//! 18  acc radius            i16
//! 20  mag radius            i16
//! 22  marker                u32
//! 26  padding (0xFF) up to CALIBRATION_SLOT_SIZE
//! ```

use embassy_sync::blocking_mutex::raw::RawMutex;
use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::i2c::I2c;

use crate::config::{
    CALIBRATION_FLASH_OFFSET, CALIBRATION_FLASH_PAGE_SIZE, CALIBRATION_MARKER,
    CALIBRATION_SLOT_SIZE,
};
use crate::drivers::flash::{ButtonSuspended, CalibrationFlash, FlashError, ResetButton};
use crate::drivers::imu::{Bno055, CalibrationStatus, OperatingMode, Snapshot, OFFSETS_LEN};
use crate::Error;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CalibrationRecord {
    pub acc_offset: [i16; 3],
    pub mag_offset: [i16; 3],
    pub gyr_offset: [i16; 3],
    pub acc_radius: i16,
    pub mag_radius: i16,
    pub marker: u32,
}

impl CalibrationRecord {
    pub const LEN: usize = OFFSETS_LEN + 4;

    /// Record built from the sensor's offset registers, stamped valid.
    pub fn from_offsets(raw: &[u8; OFFSETS_LEN]) -> Self {
        let word = |i: usize| i16::from_le_bytes([raw[2 * i], raw[2 * i + 1]]);
        Self {
            acc_offset: [word(0), word(1), word(2)],
            mag_offset: [word(3), word(4), word(5)],
            gyr_offset: [word(6), word(7), word(8)],
            acc_radius: word(9),
            mag_radius: word(10),
            marker: CALIBRATION_MARKER,
        }
    }

    /// The 22 bytes written back to ACC_OFFSET_X_LSB onwards.
    pub fn offsets(&self) -> [u8; OFFSETS_LEN] {
        let mut raw = [0u8; OFFSETS_LEN];
        let radii = [self.acc_radius, self.mag_radius];
        let words = self
            .acc_offset
            .iter()
            .chain(&self.mag_offset)
            .chain(&self.gyr_offset)
            .chain(&radii);
        for (chunk, word) in raw.chunks_exact_mut(2).zip(words) {
            chunk.copy_from_slice(&word.to_le_bytes());
        }
        raw
    }

    pub fn from_bytes(raw: &[u8; Self::LEN]) -> Self {
        let mut offsets = [0u8; OFFSETS_LEN];
        offsets.copy_from_slice(&raw[..OFFSETS_LEN]);
        Self {
            marker: u32::from_le_bytes([raw[22], raw[23], raw[24], raw[25]]),
            ..Self::from_offsets(&offsets)
        }
    }

    pub fn to_bytes(&self) -> [u8; Self::LEN] {
        let mut raw = [0u8; Self::LEN];
        raw[..OFFSETS_LEN].copy_from_slice(&self.offsets());
        raw[OFFSETS_LEN..].copy_from_slice(&self.marker.to_le_bytes());
        raw
    }

    pub fn is_valid(&self) -> bool {
        self.marker == CALIBRATION_MARKER
    }

    fn log(&self) {
        info!(
            " Mag Offset: {} {} {}",
            self.mag_offset[0], self.mag_offset[1], self.mag_offset[2]
        );
        info!(
            " Acc Offset: {} {} {}",
            self.acc_offset[0], self.acc_offset[1], self.acc_offset[2]
        );
        info!(
            " Gyr Offset: {} {} {}",
            self.gyr_offset[0], self.gyr_offset[1], self.gyr_offset[2]
        );
        info!(" Acc Radius: {}", self.acc_radius);
        info!(" Mag Radius: {}", self.mag_radius);
    }
}

/// Owns the flash slot and the reset button that must stay quiet while the
/// slot is rewritten.
pub struct CalibrationStore<F, B> {
    flash: F,
    button: B,
}

impl<F, B> CalibrationStore<F, B>
where
    F: CalibrationFlash,
    B: ResetButton,
{
    pub fn new(flash: F, button: B) -> Self {
        Self { flash, button }
    }

    /// The stored record, or `None` when the slot is erased, foreign or torn.
    pub fn load(&mut self) -> Result<Option<CalibrationRecord>, FlashError> {
        let mut raw = [0u8; CalibrationRecord::LEN];
        self.flash.read(CALIBRATION_FLASH_OFFSET, &mut raw)?;
        let record = CalibrationRecord::from_bytes(&raw);
        Ok(record.is_valid().then_some(record))
    }

    /// Replace the slot with `record`.
    ///
    /// Runs with interrupts masked and the reset button disabled; both are
    /// restored on every exit path. The controller is relocked even when
    /// erase or program fails.
    pub fn persist(&mut self, record: &CalibrationRecord) -> Result<(), FlashError> {
        let mut slot = [0xFFu8; CALIBRATION_SLOT_SIZE];
        slot[..CalibrationRecord::LEN].copy_from_slice(&record.to_bytes());

        let Self { flash, button } = self;
        let _button = ButtonSuspended::new(button);
        critical_section::with(|_| {
            flash.unlock()?;
            let written = flash
                .erase(
                    CALIBRATION_FLASH_OFFSET,
                    CALIBRATION_FLASH_OFFSET + CALIBRATION_FLASH_PAGE_SIZE,
                )
                .and_then(|()| flash.program(CALIBRATION_FLASH_OFFSET, &slot));
            let locked = flash.lock();
            written.and(locked)
        })
    }

    /// Push the stored calibration into the sensor and start sensor fusion.
    ///
    /// The sensor must be in config mode. Fusion is started whether or not a
    /// valid record was found. Returns whether a record was applied.
    pub async fn restore<M, I2C, D>(
        &mut self,
        imu: &Bno055<'_, M, I2C>,
        delay: &mut D,
    ) -> Result<bool, Error<I2C::Error>>
    where
        M: RawMutex,
        I2C: I2c,
        D: DelayNs,
    {
        let record = match self.load() {
            Ok(record) => record,
            Err(e) => {
                warn!("Reading calibration from flash failed: {:?}", e);
                None
            }
        };

        let written = match record {
            Some(record) => {
                info!("Read calibration from flash and save to BNO055:");
                record.log();
                imu.write_offsets(&record.offsets()).await.map(|()| true)
            }
            None => {
                info!("No calibration found");
                Ok(false)
            }
        };

        // Fusion starts even when the offset write failed.
        imu.set_mode(OperatingMode::Ndof, delay).await?;
        written
    }

    /// Read the sensor's offsets and persist them.
    ///
    /// Refuses with [`Error::NotCalibrated`], touching neither the sensor nor
    /// flash, unless `snapshot` reports every sub-score at 3.
    pub async fn capture_and_persist<M, I2C, D>(
        &mut self,
        imu: &Bno055<'_, M, I2C>,
        snapshot: &Snapshot,
        delay: &mut D,
    ) -> Result<CalibrationRecord, Error<I2C::Error>>
    where
        M: RawMutex,
        I2C: I2c,
        D: DelayNs,
    {
        if snapshot.calibration_status != CalibrationStatus::FULLY_CALIBRATED {
            debug!(
                "Calibration not complete: 0x{:02X}",
                snapshot.calibration_status
            );
            return Err(Error::NotCalibrated(snapshot.calibration_status));
        }

        imu.set_mode(OperatingMode::Config, delay).await?;
        let offsets = imu.read_offsets().await;
        // Back to fusion before looking at the result so a failed read does
        // not leave the sensor in config mode.
        imu.set_mode(OperatingMode::Ndof, delay).await?;
        let record = CalibrationRecord::from_offsets(&offsets?);

        info!("Read calibration from BNO055 and save to flash:");
        record.log();

        self.persist(&record).map_err(|e| {
            error!("Saving calibration to flash failed: {:?}", e);
            Error::Flash(e)
        })?;
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_layout_matches_register_order() {
        let mut offsets = [0u8; OFFSETS_LEN];
        for (i, chunk) in offsets.chunks_exact_mut(2).enumerate() {
            chunk.copy_from_slice(&(i as i16 - 5).to_le_bytes());
        }

        let record = CalibrationRecord::from_offsets(&offsets);
        assert_eq!(record.acc_offset, [-5, -4, -3]);
        assert_eq!(record.mag_offset, [-2, -1, 0]);
        assert_eq!(record.gyr_offset, [1, 2, 3]);
        assert_eq!(record.acc_radius, 4);
        assert_eq!(record.mag_radius, 5);
        assert!(record.is_valid());
        assert_eq!(record.offsets(), offsets);

        let raw = record.to_bytes();
        assert_eq!(&raw[22..], &CALIBRATION_MARKER.to_le_bytes());
        assert_eq!(CalibrationRecord::from_bytes(&raw), record);
    }

    #[test]
    fn erased_flash_is_not_a_record() {
        let record = CalibrationRecord::from_bytes(&[0xFF; CalibrationRecord::LEN]);
        assert!(!record.is_valid());
    }
}
