//! Periodic callback dispatcher.
//!
//! Every quantity has its own period in message ticks. Periods run
//! independently of each other and of when they were configured. When the
//! transport falls a whole period behind, the backlog is dropped instead of
//! being sent in a burst: at most one callback per quantity and tick.

use heapless::Vec;

use crate::drivers::imu::Snapshot;
use crate::protocol::{callback_frame, Message, Quantity, TelemetrySink};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PeriodEntry {
    /// Ticks between callbacks, 0 disables the callback.
    pub period: u32,
    /// Ticks elapsed towards the next callback.
    pub counter: u32,
}

impl PeriodEntry {
    /// Count one tick. Returns whether a callback is due.
    pub fn advance(&mut self) -> bool {
        self.counter = self.counter.saturating_add(1);
        if self.period == 0 || self.counter < self.period {
            return false;
        }
        // A whole period was missed, drop the backlog.
        if self.counter >= self.period.saturating_mul(2) {
            self.counter = self.period;
        }
        self.counter -= self.period;
        true
    }
}

pub type DueSet = Vec<Quantity, { Quantity::COUNT }>;

pub struct Dispatcher {
    uid: u32,
    table: [PeriodEntry; Quantity::COUNT],
}

impl Dispatcher {
    pub const fn new(uid: u32) -> Self {
        Self {
            uid,
            table: [PeriodEntry {
                period: 0,
                counter: 0,
            }; Quantity::COUNT],
        }
    }

    pub fn set_period(&mut self, quantity: Quantity, period: u32) {
        debug!("{:?} period set to {}", quantity, period);
        self.table[quantity.index()].period = period;
    }

    pub fn period(&self, quantity: Quantity) -> u32 {
        self.table[quantity.index()].period
    }

    /// Advance every counter by one tick and collect the due quantities in
    /// table order.
    pub fn advance(&mut self) -> DueSet {
        let mut due = DueSet::new();
        for (quantity, entry) in Quantity::ALL.iter().zip(self.table.iter_mut()) {
            if entry.advance() {
                // capacity equals the number of quantities
                let _ = due.push(*quantity);
            }
        }
        due
    }

    /// One message tick: advance all counters, then emit the due callbacks
    /// from `snapshot`. Returns the number of callbacks handed to `sink`.
    pub async fn tick<S: TelemetrySink>(&mut self, snapshot: &Snapshot, sink: &mut S) -> usize {
        let due = self.advance();
        let mut sent = 0;
        for quantity in due {
            let message = Message::from_snapshot(quantity, snapshot);
            match sink.send(callback_frame(self.uid, &message)).await {
                Ok(()) => sent += 1,
                Err(e) => warn!("{:?} callback dropped: {:?}", quantity, e),
            }
        }
        sent
    }
}
