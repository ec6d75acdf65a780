pub mod flash;
pub mod imu;
pub mod leds;

pub use flash::{CalibrationFlash, FlashError, ResetButton};
pub use imu::{Bno055, CalibrationStatus, EulerAngles, OperatingMode, Quaternion, RegisterBus, Snapshot, Vector3};
pub use leds::{LedDriver, LedFrame};
