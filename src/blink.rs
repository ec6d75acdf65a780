//! Orientation and acceleration feedback on the LED array.

use embedded_hal_async::delay::DelayNs;

use crate::config::STARTUP_BLINK_STEP_MS;
use crate::drivers::imu::Snapshot;
use crate::drivers::leds::{LedDriver, LedFrame, ACCEL_CHANNELS, COMPASS_CHANNELS};

/// Highest lookup index.
pub const STEPS: usize = 40;

/// Cubic ease-in/ease-out from 0 to 0xFFFF over 41 steps.
///
/// `LOOKUP[i] = 0x7FFF -/+ (1000 - k³ / 8) * 0x7FFF / 1000` with `k = 20 - i`
/// for the lower half and `k = i - 20` for the upper half.
pub const LOOKUP: [u16; STEPS + 1] = [
    1, 1, 33, 99, 263, 492, 885, 1377, 2098, 2982, 4096, 5440, 7078, 8979, 11240, 13795, 16777,
    20119, 23888, 28082, 32767, 37452, 41646, 45415, 48757, 51739, 54294, 56555, 58456, 60094,
    61438, 62552, 63436, 64157, 64649, 65042, 65271, 65435, 65501, 65534, 65534,
];

const ACCEL_RANGE: i16 = 1000;
const ACCEL_BUCKET: i16 = 50;

/// Bucket an acceleration reading into a lookup index, saturating outside
/// ±1000 LSB.
pub fn accel_index(value: i16) -> usize {
    ((value.clamp(-ACCEL_RANGE, ACCEL_RANGE) + ACCEL_RANGE) / ACCEL_BUCKET) as usize
}

/// Heading register value (1° = 16 LSB) as whole degrees in `0..360`.
pub fn heading_degrees(raw: i16) -> u16 {
    (raw / 16).rem_euclid(360) as u16
}

pub fn accel_duties(snapshot: &Snapshot) -> [u16; ACCEL_CHANNELS] {
    let acc = snapshot.acceleration;
    [
        LOOKUP[accel_index(acc.x)],
        LOOKUP[accel_index(acc.y)],
        LOOKUP[STEPS - accel_index(acc.z)],
    ]
}

/// Virtual compass rose: inside quadrant `q` channel `q` fades out while the
/// channel before it fades in; the other two stay off.
pub fn compass_duties(degrees: u16) -> [u16; COMPASS_CHANNELS] {
    let degrees = (degrees % 360) as usize;
    let quadrant = degrees / 90;
    let index = (degrees % 90) * STEPS / 90;

    let mut duties = [0u16; COMPASS_CHANNELS];
    duties[quadrant] = LOOKUP[STEPS - index];
    duties[(quadrant + COMPASS_CHANNELS - 1) % COMPASS_CHANNELS] = LOOKUP[index];
    duties
}

pub fn frame_for(snapshot: &Snapshot) -> LedFrame {
    LedFrame {
        accel: accel_duties(snapshot),
        compass: compass_duties(heading_degrees(snapshot.orientation.heading)),
    }
}

/// Frame `step` of one ramp. Rising ramps go up the table, falling ramps down.
pub fn ramp_frame(step: usize, rising: bool) -> LedFrame {
    let step = step.min(STEPS);
    let duty = if rising {
        LOOKUP[step]
    } else {
        LOOKUP[STEPS - step]
    };
    LedFrame {
        accel: [duty; ACCEL_CHANNELS],
        compass: [duty; COMPASS_CHANNELS],
    }
}

/// Ready signal: up, down, up again, then dark and powered off.
pub async fn play_startup<L: LedDriver, D: DelayNs>(leds: &mut L, delay: &mut D) {
    leds.power(true);
    for rising in [true, false, true] {
        for step in 0..=STEPS {
            leds.show(&ramp_frame(step, rising));
            delay.delay_ms(STARTUP_BLINK_STEP_MS).await;
        }
    }
    leds.show(&LedFrame::DARK);
    leds.power(false);
}
