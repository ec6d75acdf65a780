#![no_std]
#![no_main]

use defmt::*;
use embassy_executor::Spawner;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::Mutex;
use embassy_time::{Delay, Timer};
use static_cell::StaticCell;
use {defmt_rtt as _, panic_probe as _};

use imu_brick::{
    calibration::CalibrationStore,
    config::BNO055_STARTUP_MS,
    drivers::{flash::Stm32Flash, imu::Bno055, leds::PwmLeds},
    tasks::{
        imu_task, reset_button_task, transport_rx_task, transport_tx_task, GatedButton, ImuBus,
    },
    Board, Brick,
};

static I2C_BUS: StaticCell<Mutex<CriticalSectionRawMutex, ImuBus>> = StaticCell::new();

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    info!("Starting IMU brick");
    let board = Board::init();
    info!("Board initialized, uid {}", board.uid);

    spawner.spawn(transport_tx_task(board.uart_tx)).unwrap();
    spawner.spawn(transport_rx_task(board.uart_rx, board.uid)).unwrap();
    spawner.spawn(reset_button_task(board.reset_button)).unwrap();

    // BNO055 power-on reset
    Timer::after_millis(BNO055_STARTUP_MS).await;

    let bus = I2C_BUS.init(Mutex::new(board.i2c));
    let brick = Brick::new(
        Bno055::new(bus),
        Delay,
        CalibrationStore::new(Stm32Flash::new(board.flash), GatedButton),
        PwmLeds::new(board.accel_pwm, board.compass_pwm),
        board.uid,
    );
    spawner.spawn(imu_task(brick)).unwrap();
    info!("IMU task spawned on main executor");

    core::future::pending::<()>().await;
}
