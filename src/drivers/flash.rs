//! Non-volatile storage for the calibration record.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FlashError {
    Read,
    Unlock,
    Erase,
    Program,
    Lock,
    OutOfBounds,
}

/// Erase/program primitives of the flash controller.
///
/// Offsets are relative to the start of flash. `program` expects an erased
/// range and a length that is a multiple of the controller's write size.
pub trait CalibrationFlash {
    fn read(&mut self, offset: u32, buf: &mut [u8]) -> Result<(), FlashError>;
    fn unlock(&mut self) -> Result<(), FlashError>;
    fn erase(&mut self, from: u32, to: u32) -> Result<(), FlashError>;
    fn program(&mut self, offset: u32, data: &[u8]) -> Result<(), FlashError>;
    fn lock(&mut self) -> Result<(), FlashError>;
}

/// An input whose interrupt could reset the board while flash is being
/// programmed.
pub trait ResetButton {
    fn disable(&mut self);
    fn enable(&mut self);
}

/// Keeps the reset button disabled until dropped.
pub struct ButtonSuspended<'a, B: ResetButton> {
    button: &'a mut B,
}

impl<'a, B: ResetButton> ButtonSuspended<'a, B> {
    pub fn new(button: &'a mut B) -> Self {
        button.disable();
        Self { button }
    }
}

impl<B: ResetButton> Drop for ButtonSuspended<'_, B> {
    fn drop(&mut self) {
        self.button.enable();
    }
}

#[cfg(feature = "stm32")]
pub use self::stm32::Stm32Flash;

#[cfg(feature = "stm32")]
mod stm32 {
    use super::{CalibrationFlash, FlashError};
    use embassy_stm32::flash::{Blocking, Flash};

    pub struct Stm32Flash {
        flash: Flash<'static, Blocking>,
    }

    impl Stm32Flash {
        pub fn new(flash: Flash<'static, Blocking>) -> Self {
            Self { flash }
        }
    }

    impl CalibrationFlash for Stm32Flash {
        fn read(&mut self, offset: u32, buf: &mut [u8]) -> Result<(), FlashError> {
            self.flash.blocking_read(offset, buf).map_err(|e| {
                warn!("Flash read at 0x{:X} failed: {:?}", offset, e);
                FlashError::Read
            })
        }

        // The HAL unlocks and relocks the controller around every erase and
        // program call.
        fn unlock(&mut self) -> Result<(), FlashError> {
            Ok(())
        }

        fn erase(&mut self, from: u32, to: u32) -> Result<(), FlashError> {
            self.flash.blocking_erase(from, to).map_err(|_| FlashError::Erase)
        }

        fn program(&mut self, offset: u32, data: &[u8]) -> Result<(), FlashError> {
            self.flash
                .blocking_write(offset, data)
                .map_err(|_| FlashError::Program)
        }

        fn lock(&mut self) -> Result<(), FlashError> {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CountingButton {
        disabled: u32,
        enabled: u32,
    }

    impl ResetButton for CountingButton {
        fn disable(&mut self) {
            self.disabled += 1;
        }
        fn enable(&mut self) {
            self.enabled += 1;
        }
    }

    #[test]
    fn button_is_restored_when_guard_drops() {
        let mut button = CountingButton {
            disabled: 0,
            enabled: 0,
        };
        {
            let _guard = ButtonSuspended::new(&mut button);
        }
        assert_eq!(button.disabled, 1);
        assert_eq!(button.enabled, 1);
    }
}
