// Centralize all configuration constants

// Tick scheduling. Both tick kinds run once per tick period, so periods set
// by the host in milliseconds are periods in ticks.
pub const TICK_PERIOD_MS: u64 = 1;
pub const SENSOR_UPDATE_DIVISOR: u8 = 10;
pub const LED_UPDATE_PHASE: u8 = 5;
pub const STATS_INTERVAL_TICKS: u32 = 1000;

// BNO055 bus
pub const I2C_FREQUENCY_HZ: u32 = 100_000;
pub const BNO055_STARTUP_MS: u64 = 650; // datasheet 1.2, power-on reset
pub const CONFIG_MODE_SETTLE_MS: u32 = 19;
pub const FUSION_MODE_SETTLE_MS: u32 = 7;
pub const CHIP_ID_ATTEMPTS: u8 = 5;

// LEDs
pub const STARTUP_BLINK_STEP_MS: u32 = 6;
pub const LED_PWM_FREQUENCY_KHZ: u32 = 1;

// Calibration record in flash: last 2 KiB page of the STM32G071RB.
pub const CALIBRATION_FLASH_OFFSET: u32 = 0x1_F800;
pub const CALIBRATION_FLASH_PAGE_SIZE: u32 = 2048;
pub const CALIBRATION_SLOT_SIZE: usize = 32; // record padded to the 8-byte program granularity
pub const CALIBRATION_MARKER: u32 = 0x3255_4D49; // "IMU2" little-endian

// Messaging
pub const SEND_TIMEOUT_MS: u64 = 20;
pub const OUTBOX_SIZE: usize = 8;
pub const REQUEST_CHANNEL_SIZE: usize = 4;
pub const UART_BAUDRATE: u32 = 1_000_000;
