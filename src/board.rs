use embassy_stm32::exti::ExtiInput;
use embassy_stm32::flash::{Blocking, Flash};
use embassy_stm32::gpio::{OutputType, Pull};
use embassy_stm32::mode::Async;
use embassy_stm32::peripherals::{TIM1, TIM3};
use embassy_stm32::time::{khz, Hertz};
use embassy_stm32::timer::low_level::CountingMode;
use embassy_stm32::timer::simple_pwm::{PwmPin, SimplePwm};
use embassy_stm32::usart::{Config as UsartConfig, Uart};
use embassy_stm32::{bind_interrupts, i2c, peripherals, rcc, uid, usart, Config};
use static_cell::StaticCell;

use crate::config::{I2C_FREQUENCY_HZ, LED_PWM_FREQUENCY_KHZ, UART_BAUDRATE};

// ── IRQ table ─────────────────────────────────────────────
bind_interrupts!(pub struct Irqs {
    USART1 => usart::InterruptHandler<peripherals::USART1>;
    I2C2   => i2c::EventInterruptHandler<peripherals::I2C2>,
              i2c::ErrorInterruptHandler<peripherals::I2C2>;
});

static UART_RX_DMA_BUF: StaticCell<[u8; 256]> = StaticCell::new();

// ── Board struct ──────────────────────────────────────────
pub struct Board {
    pub i2c: i2c::I2c<'static, Async>, // DMA, BNO055
    pub uart_tx: usart::UartTx<'static, Async>,
    pub uart_rx: usart::RingBufferedUartRx<'static>,
    pub flash: Flash<'static, Blocking>,
    pub accel_pwm: SimplePwm<'static, TIM1>,
    pub compass_pwm: SimplePwm<'static, TIM3>,
    pub reset_button: ExtiInput<'static>,
    pub uid: u32,
}

impl Board {
    pub fn init() -> Self {
        let mut config = Config::default();

        // HSI16 -> PLL -> 64MHz
        config.rcc.hsi = Some(rcc::Hsi {
            sys_div: rcc::HsiSysDiv::DIV1,
        });
        config.rcc.pll = Some(rcc::Pll {
            source: rcc::PllSource::HSI,    // 16MHz
            prediv: rcc::PllPreDiv::DIV2,   // 8MHz
            mul: rcc::PllMul::MUL16,        // 128MHz
            divp: None,
            divq: None,
            divr: Some(rcc::PllRDiv::DIV2), // 64MHz
        });
        config.rcc.sys = rcc::Sysclk::PLL1_R;
        let p = embassy_stm32::init(config);

        // USART1 to the host (DMA CH2 TX, CH3 RX)
        let mut us_cfg = UsartConfig::default();
        us_cfg.baudrate = UART_BAUDRATE;
        us_cfg.rx_pull = Pull::Up;

        let uart = Uart::new(p.USART1, p.PC5, p.PC4, Irqs, p.DMA1_CH2, p.DMA1_CH3, us_cfg).unwrap();
        let (uart_tx, rx) = uart.split();
        let uart_rx = rx.into_ring_buffered(UART_RX_DMA_BUF.init([0; 256]));

        // I²C2 to the BNO055 (DMA CH7 TX, CH6 RX), external pull-ups
        let mut i2c_cfg = i2c::Config::default();
        i2c_cfg.sda_pullup = false;
        i2c_cfg.scl_pullup = false;

        let i2c = i2c::I2c::new(
            p.I2C2,
            p.PB10,
            p.PB11,
            Irqs,
            p.DMA1_CH7,
            p.DMA1_CH6,
            Hertz(I2C_FREQUENCY_HZ),
            i2c_cfg,
        );

        // LEDs: TIM1 CH1-3 acceleration X/Y/Z, TIM3 CH1-4 compass
        let accel_pwm = SimplePwm::new(
            p.TIM1,
            Some(PwmPin::new_ch1(p.PA8, OutputType::PushPull)),
            Some(PwmPin::new_ch2(p.PA9, OutputType::PushPull)),
            Some(PwmPin::new_ch3(p.PA10, OutputType::PushPull)),
            None,
            khz(LED_PWM_FREQUENCY_KHZ),
            CountingMode::EdgeAlignedUp,
        );
        let compass_pwm = SimplePwm::new(
            p.TIM3,
            Some(PwmPin::new_ch1(p.PC6, OutputType::PushPull)),
            Some(PwmPin::new_ch2(p.PC7, OutputType::PushPull)),
            Some(PwmPin::new_ch3(p.PC8, OutputType::PushPull)),
            Some(PwmPin::new_ch4(p.PC9, OutputType::PushPull)),
            khz(LED_PWM_FREQUENCY_KHZ),
            CountingMode::EdgeAlignedUp,
        );

        let flash = Flash::new_blocking(p.FLASH);
        let reset_button = ExtiInput::new(p.PC13, p.EXTI13, Pull::Up);

        Self {
            i2c,
            uart_tx,
            uart_rx,
            flash,
            accel_pwm,
            compass_pwm,
            reset_button,
            uid: fold_uid(uid::uid()),
        }
    }
}

// 96-bit device id folded into the 32-bit packet uid.
fn fold_uid(raw: &[u8; 12]) -> u32 {
    raw.chunks_exact(4)
        .map(|w| u32::from_le_bytes([w[0], w[1], w[2], w[3]]))
        .fold(0, |acc, w| acc ^ w)
}
