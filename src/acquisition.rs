//! Sensor acquisition: one telemetry read every `SENSOR_UPDATE_DIVISOR`
//! calculation ticks.

use embassy_sync::blocking_mutex::raw::RawMutex;
use embedded_hal_async::i2c::I2c;

use crate::config::SENSOR_UPDATE_DIVISOR;
use crate::drivers::imu::{Bno055, Snapshot};
use crate::Error;

/// Read counters since the last [`Acquisition::take_stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AcquisitionStats {
    pub reads: u32,
    pub errors: u32,
    pub duplicates: u32,
}

pub struct Acquisition {
    counter: u8,
    snapshot: Snapshot,
    stats: AcquisitionStats,
    error_count: u32,
    consecutive_errors: u32,
}

impl Default for Acquisition {
    fn default() -> Self {
        Self::new()
    }
}

impl Acquisition {
    pub fn new() -> Self {
        Self {
            counter: 0,
            snapshot: Snapshot::default(),
            stats: AcquisitionStats::default(),
            error_count: 0,
            consecutive_errors: 0,
        }
    }

    /// Latest complete reading.
    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    /// Calculation ticks since the last read attempt.
    pub fn counter(&self) -> u8 {
        self.counter
    }

    pub fn take_stats(&mut self) -> AcquisitionStats {
        core::mem::take(&mut self.stats)
    }

    /// Count one calculation tick and read the sensor when due.
    ///
    /// Returns `Ok(true)` when the snapshot was replaced. A failed read keeps
    /// the previous snapshot; the counter restarts either way.
    pub async fn on_tick<M, I2C>(
        &mut self,
        imu: &Bno055<'_, M, I2C>,
    ) -> Result<bool, Error<I2C::Error>>
    where
        M: RawMutex,
        I2C: I2c,
    {
        self.counter += 1;
        if self.counter < SENSOR_UPDATE_DIVISOR {
            return Ok(false);
        }
        self.counter = 0;

        match imu.read_snapshot().await {
            Ok(snapshot) => {
                self.stats.reads += 1;
                if snapshot == self.snapshot {
                    self.stats.duplicates += 1;
                }
                self.snapshot = snapshot;

                if self.consecutive_errors > 0 {
                    info!(
                        "IMU recovered after {} consecutive errors",
                        self.consecutive_errors
                    );
                    self.consecutive_errors = 0;
                }
                Ok(true)
            }
            Err(e) => {
                self.stats.errors += 1;
                self.error_count += 1;
                self.consecutive_errors += 1;

                if self.consecutive_errors % 100 == 1 {
                    warn!("IMU read error #{}: {:?}", self.error_count, e.bus_kind());
                }
                Err(e)
            }
        }
    }
}
