//! Register client behaviour against the mock bus.

mod common;

use common::{BusOp, MockError, MockI2c, RecordingDelay};
use embassy_futures::block_on;
use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embassy_sync::mutex::Mutex;
use imu_brick::drivers::imu::{
    reg, Bno055, EulerAngles, OperatingMode, Snapshot, Vector3, BNO055_ADDRESS_HIGH,
};
use imu_brick::Error;

#[test]
fn talks_to_the_high_address() {
    let i2c = MockI2c::new();
    let bus = Mutex::<NoopRawMutex, _>::new(i2c.clone());
    let imu = Bno055::new(&bus);

    block_on(imu.bus().read_byte(reg::CHIP_ID)).unwrap();
    assert_eq!(
        i2c.ops(),
        [BusOp::Read {
            address: BNO055_ADDRESS_HIGH,
            reg: reg::CHIP_ID,
            len: 1
        }]
    );
}

#[test]
fn chip_id_retries_with_backoff() {
    let i2c = MockI2c::new();
    let bus = Mutex::<NoopRawMutex, _>::new(i2c.clone());
    let imu = Bno055::new(&bus);
    let mut delay = RecordingDelay::default();

    i2c.fail_next(2);
    block_on(imu.verify_chip_id(&mut delay, 5)).unwrap();

    assert_eq!(*delay.waits_ns.borrow(), [20_000_000, 40_000_000]);
}

#[test]
fn wrong_chip_id_is_reported() {
    let i2c = MockI2c::new();
    i2c.set_register(reg::CHIP_ID, 0x55);
    let bus = Mutex::<NoopRawMutex, _>::new(i2c.clone());
    let imu = Bno055::new(&bus);
    let mut delay = RecordingDelay::default();

    let result = block_on(imu.verify_chip_id(&mut delay, 3));
    assert_eq!(result, Err(Error::InvalidChipId(0x55)));
    assert_eq!(i2c.reads_from(reg::CHIP_ID), 3);
    // no wait after the last attempt
    assert_eq!(delay.waits_ns.borrow().len(), 2);
}

#[test]
fn snapshot_is_one_block_read() {
    let i2c = MockI2c::new();
    let expected = Snapshot {
        acceleration: Vector3 {
            x: -981,
            y: 12,
            z: 3,
        },
        orientation: EulerAngles {
            heading: 90 * 16,
            roll: -4,
            pitch: 5,
        },
        temperature: 23,
        calibration_status: 0b11_11_01_00,
        ..Snapshot::default()
    };
    i2c.set_block(&expected);
    let bus = Mutex::<NoopRawMutex, _>::new(i2c.clone());
    let imu = Bno055::new(&bus);

    let snapshot = block_on(imu.read_snapshot()).unwrap();
    assert_eq!(snapshot, expected);
    assert_eq!(
        i2c.ops(),
        [BusOp::Read {
            address: BNO055_ADDRESS_HIGH,
            reg: reg::ACC_DATA_X_LSB,
            len: 46
        }]
    );
}

#[test]
fn mode_switch_waits_to_settle() {
    let i2c = MockI2c::new();
    let bus = Mutex::<NoopRawMutex, _>::new(i2c.clone());
    let imu = Bno055::new(&bus);
    let mut delay = RecordingDelay::default();

    block_on(imu.set_mode(OperatingMode::Config, &mut delay)).unwrap();
    block_on(imu.set_mode(OperatingMode::Ndof, &mut delay)).unwrap();

    assert_eq!(i2c.writes_to(reg::OPR_MODE), [0x00, 0x0C]);
    assert_eq!(*delay.waits_ns.borrow(), [19_000_000, 7_000_000]);
}

#[test]
fn offsets_go_out_in_one_write() {
    let i2c = MockI2c::new();
    let bus = Mutex::<NoopRawMutex, _>::new(i2c.clone());
    let imu = Bno055::new(&bus);
    let offsets = common::sample_offsets();

    block_on(imu.write_offsets(&offsets)).unwrap();
    assert_eq!(
        i2c.ops(),
        [BusOp::Write {
            address: BNO055_ADDRESS_HIGH,
            reg: reg::ACC_OFFSET_X_LSB,
            data: offsets.to_vec()
        }]
    );
    assert_eq!(block_on(imu.read_offsets()).unwrap(), offsets);
}

#[test]
fn bus_is_released_after_a_failed_transfer() {
    let i2c = MockI2c::new();
    let bus = Mutex::<NoopRawMutex, _>::new(i2c.clone());
    let imu = Bno055::new(&bus);

    i2c.fail_next(1);
    assert_eq!(block_on(imu.read_snapshot()), Err(Error::Bus(MockError)));
    assert!(bus.try_lock().is_ok());
    assert!(block_on(imu.read_snapshot()).is_ok());
}

#[test]
fn oversized_write_is_refused() {
    let i2c = MockI2c::new();
    let bus = Mutex::<NoopRawMutex, _>::new(i2c.clone());
    let imu = Bno055::new(&bus);

    let result = block_on(imu.bus().write(reg::ACC_OFFSET_X_LSB, &[0; 40]));
    assert_eq!(result, Err(Error::TransferTooLong(40)));
    assert!(i2c.ops().is_empty());
}
