pub mod button;
pub mod imu;
pub mod transport;

pub use button::{reset_button_task, GatedButton};
pub use imu::{imu_task, FirmwareBrick, ImuBus};
pub use transport::{transport_rx_task, transport_tx_task};
