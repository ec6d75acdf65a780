//! Mock bus, flash, LEDs and sink shared by the integration tests.
#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;

use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embedded_hal::i2c::{ErrorKind, NoAcknowledgeSource};
use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::i2c::{ErrorType, I2c, Operation};

use imu_brick::brick::Brick;
use imu_brick::drivers::flash::{CalibrationFlash, FlashError, ResetButton};
use imu_brick::drivers::imu::{reg, Snapshot, BNO055_ID, OFFSETS_LEN};
use imu_brick::drivers::leds::{LedDriver, LedFrame};
use imu_brick::protocol::{Frame, SendError, TelemetrySink};

/// Transfers seen by the mock bus
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusOp {
    /// Register write, first register and the bytes written
    Write { address: u8, reg: u8, data: Vec<u8> },
    /// Register read, first register and length
    Read { address: u8, reg: u8, len: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MockError;

impl embedded_hal::i2c::Error for MockError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address)
    }
}

#[derive(Debug)]
pub struct BusState {
    pub registers: [u8; 256],
    pub ops: Vec<BusOp>,
    /// Number of upcoming transfers that fail
    pub fail_next: usize,
    /// Transfers starting at this register fail
    pub fail_register: Option<u8>,
}

/// Register file behind an I²C address, with auto-incrementing access.
#[derive(Clone)]
pub struct MockI2c {
    state: Rc<RefCell<BusState>>,
}

impl MockI2c {
    pub fn new() -> Self {
        let mut registers = [0u8; 256];
        registers[reg::CHIP_ID as usize] = BNO055_ID;
        Self {
            state: Rc::new(RefCell::new(BusState {
                registers,
                ops: Vec::new(),
                fail_next: 0,
                fail_register: None,
            })),
        }
    }

    pub fn state(&self) -> std::cell::RefMut<'_, BusState> {
        self.state.borrow_mut()
    }

    pub fn ops(&self) -> Vec<BusOp> {
        self.state.borrow().ops.clone()
    }

    pub fn clear_ops(&self) {
        self.state.borrow_mut().ops.clear();
    }

    pub fn fail_next(&self, count: usize) {
        self.state.borrow_mut().fail_next = count;
    }

    pub fn fail_register(&self, reg: Option<u8>) {
        self.state.borrow_mut().fail_register = reg;
    }

    pub fn set_register(&self, reg: u8, value: u8) {
        self.state.borrow_mut().registers[reg as usize] = value;
    }

    pub fn register(&self, reg: u8) -> u8 {
        self.state.borrow().registers[reg as usize]
    }

    pub fn set_block(&self, snapshot: &Snapshot) {
        let start = reg::ACC_DATA_X_LSB as usize;
        self.state.borrow_mut().registers[start..start + Snapshot::LEN]
            .copy_from_slice(&snapshot.to_bytes());
    }

    pub fn set_offsets(&self, offsets: &[u8; OFFSETS_LEN]) {
        let start = reg::ACC_OFFSET_X_LSB as usize;
        self.state.borrow_mut().registers[start..start + OFFSETS_LEN].copy_from_slice(offsets);
    }

    pub fn offsets(&self) -> [u8; OFFSETS_LEN] {
        let start = reg::ACC_OFFSET_X_LSB as usize;
        let mut raw = [0u8; OFFSETS_LEN];
        raw.copy_from_slice(&self.state.borrow().registers[start..start + OFFSETS_LEN]);
        raw
    }

    /// Values written to `reg` as single-byte writes, in order.
    pub fn writes_to(&self, reg: u8) -> Vec<u8> {
        self.ops()
            .into_iter()
            .filter_map(|op| match op {
                BusOp::Write { reg: r, data, .. } if r == reg && data.len() == 1 => Some(data[0]),
                _ => None,
            })
            .collect()
    }

    pub fn reads_from(&self, reg: u8) -> usize {
        self.ops()
            .iter()
            .filter(|op| matches!(op, BusOp::Read { reg: r, .. } if *r == reg))
            .count()
    }
}

impl ErrorType for MockI2c {
    type Error = MockError;
}

impl I2c for MockI2c {
    async fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        let mut state = self.state.borrow_mut();
        if state.fail_next > 0 {
            state.fail_next -= 1;
            return Err(MockError);
        }
        if let Some(Operation::Write(bytes)) = operations.first() {
            if bytes.first().copied() == state.fail_register && state.fail_register.is_some() {
                return Err(MockError);
            }
        }

        let mut pointer = 0usize;
        for operation in operations.iter_mut() {
            match operation {
                Operation::Write(bytes) => {
                    let Some((&reg, data)) = bytes.split_first() else {
                        continue;
                    };
                    pointer = reg as usize;
                    if data.is_empty() {
                        continue;
                    }
                    for (i, byte) in data.iter().enumerate() {
                        state.registers[(pointer + i) & 0xFF] = *byte;
                    }
                    state.ops.push(BusOp::Write {
                        address,
                        reg,
                        data: data.to_vec(),
                    });
                }
                Operation::Read(buf) => {
                    for (i, byte) in buf.iter_mut().enumerate() {
                        *byte = state.registers[(pointer + i) & 0xFF];
                    }
                    state.ops.push(BusOp::Read {
                        address,
                        reg: pointer as u8,
                        len: buf.len(),
                    });
                    pointer += buf.len();
                }
            }
        }
        Ok(())
    }
}

/// Delay that returns immediately and records the requested time.
#[derive(Debug, Default, Clone)]
pub struct RecordingDelay {
    pub waits_ns: Rc<RefCell<Vec<u32>>>,
}

impl RecordingDelay {
    pub fn total_ms(&self) -> u64 {
        self.waits_ns.borrow().iter().map(|ns| *ns as u64).sum::<u64>() / 1_000_000
    }
}

impl DelayNs for RecordingDelay {
    async fn delay_ns(&mut self, ns: u32) {
        self.waits_ns.borrow_mut().push(ns);
    }

    async fn delay_ms(&mut self, ms: u32) {
        self.waits_ns.borrow_mut().push(ms.saturating_mul(1_000_000));
    }
}

/// Flash write sequence as seen by the flash and the reset button.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashEvent {
    ButtonDisabled,
    Unlock,
    Erase { from: u32, to: u32 },
    Program { offset: u32, len: usize },
    Lock,
    ButtonEnabled,
}

pub type EventLog = Rc<RefCell<Vec<FlashEvent>>>;

const FLASH_SIZE: usize = 0x2_0000;
const FLASH_PAGE: usize = 2048;

pub struct MockFlash {
    pub memory: Rc<RefCell<Vec<u8>>>,
    pub events: EventLog,
    pub fail_unlock: bool,
    pub fail_erase: bool,
    pub fail_program: bool,
    pub fail_lock: bool,
}

impl MockFlash {
    pub fn new(events: EventLog) -> Self {
        Self {
            memory: Rc::new(RefCell::new(vec![0xFF; FLASH_SIZE])),
            events,
            fail_unlock: false,
            fail_erase: false,
            fail_program: false,
            fail_lock: false,
        }
    }

    pub fn write_raw(&self, offset: u32, data: &[u8]) {
        let offset = offset as usize;
        self.memory.borrow_mut()[offset..offset + data.len()].copy_from_slice(data);
    }
}

impl CalibrationFlash for MockFlash {
    fn read(&mut self, offset: u32, buf: &mut [u8]) -> Result<(), FlashError> {
        let offset = offset as usize;
        let memory = self.memory.borrow();
        let src = memory
            .get(offset..offset + buf.len())
            .ok_or(FlashError::OutOfBounds)?;
        buf.copy_from_slice(src);
        Ok(())
    }

    fn unlock(&mut self) -> Result<(), FlashError> {
        self.events.borrow_mut().push(FlashEvent::Unlock);
        if self.fail_unlock {
            return Err(FlashError::Unlock);
        }
        Ok(())
    }

    fn erase(&mut self, from: u32, to: u32) -> Result<(), FlashError> {
        self.events.borrow_mut().push(FlashEvent::Erase { from, to });
        if self.fail_erase {
            return Err(FlashError::Erase);
        }
        let (from, to) = (from as usize, to as usize);
        if from % FLASH_PAGE != 0 || to % FLASH_PAGE != 0 || to > FLASH_SIZE {
            return Err(FlashError::OutOfBounds);
        }
        self.memory.borrow_mut()[from..to].fill(0xFF);
        Ok(())
    }

    fn program(&mut self, offset: u32, data: &[u8]) -> Result<(), FlashError> {
        self.events.borrow_mut().push(FlashEvent::Program {
            offset,
            len: data.len(),
        });
        if self.fail_program || data.len() % 8 != 0 {
            return Err(FlashError::Program);
        }
        let offset = offset as usize;
        let mut memory = self.memory.borrow_mut();
        let dst = &mut memory[offset..offset + data.len()];
        if dst.iter().any(|b| *b != 0xFF) {
            return Err(FlashError::Program);
        }
        dst.copy_from_slice(data);
        Ok(())
    }

    fn lock(&mut self) -> Result<(), FlashError> {
        self.events.borrow_mut().push(FlashEvent::Lock);
        if self.fail_lock {
            return Err(FlashError::Lock);
        }
        Ok(())
    }
}

pub struct MockButton {
    pub events: EventLog,
}

impl ResetButton for MockButton {
    fn disable(&mut self) {
        self.events.borrow_mut().push(FlashEvent::ButtonDisabled);
    }

    fn enable(&mut self) {
        self.events.borrow_mut().push(FlashEvent::ButtonEnabled);
    }
}

#[derive(Debug, Default)]
pub struct LedState {
    pub powered: bool,
    pub frames: Vec<LedFrame>,
}

#[derive(Clone, Default)]
pub struct MockLeds {
    pub state: Rc<RefCell<LedState>>,
}

impl MockLeds {
    pub fn frames(&self) -> Vec<LedFrame> {
        self.state.borrow().frames.clone()
    }

    pub fn last_frame(&self) -> Option<LedFrame> {
        self.state.borrow().frames.last().copied()
    }

    pub fn clear(&self) {
        self.state.borrow_mut().frames.clear();
    }
}

impl LedDriver for MockLeds {
    fn power(&mut self, on: bool) {
        self.state.borrow_mut().powered = on;
    }

    fn show(&mut self, frame: &LedFrame) {
        self.state.borrow_mut().frames.push(*frame);
    }
}

/// Collects frames; refuses them all while `full` is set.
#[derive(Default)]
pub struct RecordingSink {
    pub frames: Vec<Frame>,
    pub full: bool,
}

impl RecordingSink {
    pub fn function_ids(&self) -> Vec<u8> {
        self.frames.iter().map(|f| f[5]).collect()
    }
}

impl TelemetrySink for RecordingSink {
    async fn send(&mut self, frame: Frame) -> Result<(), SendError> {
        if self.full {
            return Err(SendError::Timeout);
        }
        self.frames.push(frame);
        Ok(())
    }
}

pub type TestBrick<'a> =
    Brick<'a, NoopRawMutex, MockI2c, RecordingDelay, MockFlash, MockButton, MockLeds>;

pub const TEST_UID: u32 = 0x1234_5678;

/// Everything a test needs to look behind the brick.
pub struct Rig {
    pub i2c: MockI2c,
    pub delay: RecordingDelay,
    pub leds: MockLeds,
    pub events: EventLog,
    pub memory: Rc<RefCell<Vec<u8>>>,
}

impl Rig {
    pub fn new() -> (Self, MockFlash, MockButton) {
        let events = EventLog::default();
        let flash = MockFlash::new(events.clone());
        let button = MockButton {
            events: events.clone(),
        };
        let rig = Self {
            i2c: MockI2c::new(),
            delay: RecordingDelay::default(),
            leds: MockLeds::default(),
            events,
            memory: flash.memory.clone(),
        };
        (rig, flash, button)
    }

    pub fn flash_events(&self) -> Vec<FlashEvent> {
        self.events.borrow().clone()
    }
}

/// Snapshot with every calibration sub-score at 3.
pub fn calibrated_snapshot() -> Snapshot {
    Snapshot {
        calibration_status: 0xFF,
        ..Snapshot::default()
    }
}

pub fn sample_offsets() -> [u8; OFFSETS_LEN] {
    let mut raw = [0u8; OFFSETS_LEN];
    for (i, byte) in raw.iter_mut().enumerate() {
        *byte = 0x10 + i as u8;
    }
    raw
}
