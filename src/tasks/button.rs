use embassy_executor::task;
use embassy_stm32::exti::ExtiInput;
use embassy_time::Timer;
use portable_atomic::{AtomicBool, Ordering};

use crate::drivers::flash::ResetButton;

const DEBOUNCE_MS: u64 = 20;

static SUSPENDED: AtomicBool = AtomicBool::new(false);

/// Reset button handled by [`reset_button_task`]. Presses are ignored while
/// it is disabled.
pub struct GatedButton;

impl ResetButton for GatedButton {
    fn disable(&mut self) {
        SUSPENDED.store(true, Ordering::Release);
    }

    fn enable(&mut self) {
        SUSPENDED.store(false, Ordering::Release);
    }
}

#[task]
pub async fn reset_button_task(mut button: ExtiInput<'static>) {
    loop {
        button.wait_for_falling_edge().await;
        Timer::after_millis(DEBOUNCE_MS).await;

        // A press latched during a flash write only counts if still held.
        if SUSPENDED.load(Ordering::Acquire) || button.is_high() {
            debug!("Reset button press ignored");
            continue;
        }
        warn!("Reset button pressed, resetting");
        cortex_m::peripheral::SCB::sys_reset();
    }
}
