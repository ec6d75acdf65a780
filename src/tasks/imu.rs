use embassy_executor::task;
use embassy_stm32::i2c::I2c;
use embassy_stm32::mode::Async;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_time::{Delay, Duration, Ticker};

use crate::brick::{Brick, TickKind};
use crate::config::{STATS_INTERVAL_TICKS, TICK_PERIOD_MS};
use crate::drivers::flash::Stm32Flash;
use crate::drivers::leds::PwmLeds;
use crate::ipc::{dropped_frames, OutboxSink, REQUEST_CH};

use super::GatedButton;

pub type ImuBus = I2c<'static, Async>;

pub type FirmwareBrick =
    Brick<'static, CriticalSectionRawMutex, ImuBus, Delay, Stm32Flash, GatedButton, PwmLeds>;

#[task]
pub async fn imu_task(mut brick: FirmwareBrick) {
    match brick.init().await {
        Ok(true) => info!("IMU ready, calibration restored"),
        Ok(false) => info!("IMU ready, no stored calibration"),
        // Keep ticking: reads keep failing and are reported by the acquisition
        Err(e) => error!("IMU initialization failed: {:?}", e),
    }

    info!("IMU task started - ticking every {}ms", TICK_PERIOD_MS);
    let mut sink = OutboxSink;
    let mut ticker = Ticker::every(Duration::from_millis(TICK_PERIOD_MS));
    let mut ticks = 0u32;
    let mut dropped = dropped_frames();

    loop {
        ticker.next().await;

        // Read errors are counted and rate limited by the acquisition
        let _ = brick.tick(TickKind::Calculation, &mut sink).await;
        let _ = brick.tick(TickKind::Message, &mut sink).await;

        while let Ok((header, request)) = REQUEST_CH.try_receive() {
            brick.serve(header, request, &mut sink).await;
        }

        ticks += 1;
        if ticks >= STATS_INTERVAL_TICKS {
            ticks = 0;
            let stats = brick.take_stats();
            let total = dropped_frames();
            info!(
                "IMU: {} reads/s, {} errors, {}% duplicates, {} frames dropped",
                stats.reads,
                stats.errors,
                (stats.duplicates * 100) / stats.reads.max(1),
                total.wrapping_sub(dropped)
            );
            dropped = total;
        }
    }
}
