#![cfg_attr(not(test), no_std)]

#[macro_use]
mod fmt;

pub mod acquisition;
pub mod blink;
pub mod brick;
pub mod calibration;
pub mod config;
pub mod dispatch;
pub mod drivers;
pub mod error;
pub mod ipc;
pub mod protocol;

#[cfg(feature = "stm32")]
pub mod board;
#[cfg(feature = "stm32")]
pub mod tasks;

#[cfg(feature = "stm32")]
pub use board::Board;
pub use brick::{Brick, TickKind};
pub use drivers::imu::Snapshot;
pub use error::Error;
