use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use portable_atomic::{AtomicU32, Ordering};

use crate::config::{OUTBOX_SIZE, REQUEST_CHANNEL_SIZE};
use crate::protocol::{Frame, Header, Request};

/* Host requests, transport rx -> tick task */
pub static REQUEST_CH: Channel<CriticalSectionRawMutex, (Header, Request), REQUEST_CHANNEL_SIZE> = Channel::new();

/* Outgoing packets, tick task -> transport tx */
pub static OUTBOX: Channel<CriticalSectionRawMutex, Frame, OUTBOX_SIZE> = Channel::new();

/// Frames discarded because the outbox stayed full.
pub static DROPPED_FRAMES: AtomicU32 = AtomicU32::new(0);

pub fn dropped_frames() -> u32 {
    DROPPED_FRAMES.load(Ordering::Relaxed)
}

#[cfg(feature = "stm32")]
pub use self::timed::OutboxSink;

#[cfg(feature = "stm32")]
mod timed {
    use embassy_time::{with_timeout, Duration};
    use portable_atomic::Ordering;

    use super::{DROPPED_FRAMES, OUTBOX};
    use crate::config::SEND_TIMEOUT_MS;
    use crate::protocol::{Frame, SendError, TelemetrySink};

    /// Sink into [`OUTBOX`] that waits up to `SEND_TIMEOUT_MS` for room.
    pub struct OutboxSink;

    impl TelemetrySink for OutboxSink {
        async fn send(&mut self, frame: Frame) -> Result<(), SendError> {
            with_timeout(Duration::from_millis(SEND_TIMEOUT_MS), OUTBOX.send(frame))
                .await
                .map_err(|_| {
                    DROPPED_FRAMES.fetch_add(1, Ordering::Relaxed);
                    SendError::Timeout
                })
        }
    }
}
