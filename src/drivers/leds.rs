//! LED array: three acceleration LEDs and a four-LED compass rose.

pub const ACCEL_CHANNELS: usize = 3;
pub const COMPASS_CHANNELS: usize = 4;

/// Duty cycles for every LED, 0 = off, 0xFFFF = full brightness.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LedFrame {
    pub accel: [u16; ACCEL_CHANNELS],
    pub compass: [u16; COMPASS_CHANNELS],
}

impl LedFrame {
    pub const DARK: Self = Self {
        accel: [0; ACCEL_CHANNELS],
        compass: [0; COMPASS_CHANNELS],
    };
}

pub trait LedDriver {
    /// Enable or disable the PWM outputs. Disabled LEDs stay dark regardless
    /// of the last frame shown.
    fn power(&mut self, on: bool);
    fn show(&mut self, frame: &LedFrame);
}

#[cfg(feature = "stm32")]
pub use self::stm32::PwmLeds;

#[cfg(feature = "stm32")]
mod stm32 {
    use super::{LedDriver, LedFrame};
    use embassy_stm32::peripherals::{TIM1, TIM3};
    use embassy_stm32::timer::simple_pwm::SimplePwm;
    use embassy_stm32::timer::Channel;

    const CHANNELS: [Channel; 4] = [Channel::Ch1, Channel::Ch2, Channel::Ch3, Channel::Ch4];

    /// TIM1 CH1-3 drive the acceleration LEDs, TIM3 CH1-4 the compass.
    pub struct PwmLeds {
        accel: SimplePwm<'static, TIM1>,
        compass: SimplePwm<'static, TIM3>,
    }

    impl PwmLeds {
        pub fn new(accel: SimplePwm<'static, TIM1>, compass: SimplePwm<'static, TIM3>) -> Self {
            Self { accel, compass }
        }
    }

    fn scale(duty: u16, max: u16) -> u16 {
        ((duty as u32 * max as u32) / u16::MAX as u32) as u16
    }

    impl LedDriver for PwmLeds {
        fn power(&mut self, on: bool) {
            for (i, ch) in CHANNELS.iter().enumerate() {
                if i < super::ACCEL_CHANNELS {
                    let mut pwm = self.accel.channel(*ch);
                    pwm.set_duty_cycle(0);
                    if on {
                        pwm.enable();
                    } else {
                        pwm.disable();
                    }
                }
                let mut pwm = self.compass.channel(*ch);
                pwm.set_duty_cycle(0);
                if on {
                    pwm.enable();
                } else {
                    pwm.disable();
                }
            }
        }

        fn show(&mut self, frame: &LedFrame) {
            let max = self.accel.max_duty_cycle();
            for (ch, duty) in CHANNELS.iter().zip(frame.accel) {
                self.accel.channel(*ch).set_duty_cycle(scale(duty, max));
            }
            let max = self.compass.max_duty_cycle();
            for (ch, duty) in CHANNELS.iter().zip(frame.compass) {
                self.compass.channel(*ch).set_duty_cycle(scale(duty, max));
            }
        }
    }
}
