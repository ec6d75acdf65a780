//! The assembled IMU core, driven by the two tick kinds.

use embassy_sync::blocking_mutex::raw::RawMutex;
use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::i2c::I2c;

use crate::acquisition::{Acquisition, AcquisitionStats};
use crate::blink;
use crate::calibration::{CalibrationRecord, CalibrationStore};
use crate::config::{CHIP_ID_ATTEMPTS, LED_UPDATE_PHASE};
use crate::dispatch::Dispatcher;
use crate::drivers::flash::{CalibrationFlash, ResetButton};
use crate::drivers::imu::{Bno055, OperatingMode, Snapshot};
use crate::drivers::leds::{LedDriver, LedFrame};
use crate::protocol::{
    response_frame, Header, Message, Quantity, Request, Response, TelemetrySink,
};
use crate::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TickKind {
    Calculation,
    Message,
}

pub struct Brick<'a, M: RawMutex, I2C, D, F, B, L> {
    imu: Bno055<'a, M, I2C>,
    delay: D,
    acquisition: Acquisition,
    dispatcher: Dispatcher,
    calibration: CalibrationStore<F, B>,
    leds: L,
    leds_enabled: bool,
}

impl<'a, M, I2C, D, F, B, L> Brick<'a, M, I2C, D, F, B, L>
where
    M: RawMutex,
    I2C: I2c,
    D: DelayNs,
    F: CalibrationFlash,
    B: ResetButton,
    L: LedDriver,
{
    pub fn new(
        imu: Bno055<'a, M, I2C>,
        delay: D,
        calibration: CalibrationStore<F, B>,
        leds: L,
        uid: u32,
    ) -> Self {
        Self {
            imu,
            delay,
            acquisition: Acquisition::new(),
            dispatcher: Dispatcher::new(uid),
            calibration,
            leds,
            leds_enabled: false,
        }
    }

    /// Bring the sensor up: ready animation, config mode, external clock,
    /// stored calibration, sensor fusion, LEDs on.
    ///
    /// Returns whether a stored calibration was applied.
    pub async fn init(&mut self) -> Result<bool, Error<I2C::Error>> {
        info!("IMU init start");
        blink::play_startup(&mut self.leds, &mut self.delay).await;

        self.imu
            .verify_chip_id(&mut self.delay, CHIP_ID_ATTEMPTS)
            .await?;
        self.imu
            .set_mode(OperatingMode::Config, &mut self.delay)
            .await?;
        self.imu.use_external_clock().await?;
        let restored = self.calibration.restore(&self.imu, &mut self.delay).await?;

        self.set_leds(true);
        info!("IMU init done");
        Ok(restored)
    }

    pub fn snapshot(&self) -> &Snapshot {
        self.acquisition.snapshot()
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn take_stats(&mut self) -> AcquisitionStats {
        self.acquisition.take_stats()
    }

    pub fn set_period(&mut self, quantity: Quantity, period: u32) {
        self.dispatcher.set_period(quantity, period);
    }

    pub fn period(&self, quantity: Quantity) -> u32 {
        self.dispatcher.period(quantity)
    }

    pub fn set_leds(&mut self, on: bool) {
        if on != self.leds_enabled {
            debug!("LEDs {}", if on { "on" } else { "off" });
        }
        self.leds.power(on);
        if !on {
            self.leds.show(&LedFrame::DARK);
        }
        self.leds_enabled = on;
    }

    pub fn leds_enabled(&self) -> bool {
        self.leds_enabled
    }

    pub async fn tick<S: TelemetrySink>(
        &mut self,
        kind: TickKind,
        sink: &mut S,
    ) -> Result<(), Error<I2C::Error>> {
        match kind {
            TickKind::Calculation => self.calculation_tick().await,
            TickKind::Message => {
                self.message_tick(sink).await;
                Ok(())
            }
        }
    }

    /// Sample the sensor every few ticks and refresh the LEDs half way
    /// between two samples.
    pub async fn calculation_tick(&mut self) -> Result<(), Error<I2C::Error>> {
        let result = self.acquisition.on_tick(&self.imu).await;
        if self.acquisition.counter() == LED_UPDATE_PHASE {
            self.update_leds();
        }
        result.map(|_| ())
    }

    pub async fn message_tick<S: TelemetrySink>(&mut self, sink: &mut S) -> usize {
        self.dispatcher
            .tick(self.acquisition.snapshot(), sink)
            .await
    }

    fn update_leds(&mut self) {
        if !self.leds_enabled {
            return;
        }
        let frame = blink::frame_for(self.acquisition.snapshot());
        self.leds.show(&frame);
    }

    /// Store the sensor's current calibration, if it is complete.
    pub async fn save_calibration(&mut self) -> Result<CalibrationRecord, Error<I2C::Error>> {
        let snapshot = *self.acquisition.snapshot();
        self.calibration
            .capture_and_persist(&self.imu, &snapshot, &mut self.delay)
            .await
    }

    /// Apply a host request. Returns the response payload for requests that
    /// have one.
    pub async fn handle_request(&mut self, request: Request) -> Option<Response> {
        match request {
            Request::Get(quantity) => Some(Response::Value(Message::from_snapshot(
                quantity,
                self.acquisition.snapshot(),
            ))),
            Request::LedsOn => {
                self.set_leds(true);
                None
            }
            Request::LedsOff => {
                self.set_leds(false);
                None
            }
            Request::AreLedsOn => Some(Response::Bool(self.leds_enabled)),
            Request::SaveCalibration => {
                let saved = match self.save_calibration().await {
                    Ok(_) => true,
                    Err(e) => {
                        warn!("Save calibration failed: {:?}", e);
                        false
                    }
                };
                Some(Response::Bool(saved))
            }
            Request::SetPeriod(quantity, period) => {
                self.set_period(quantity, period);
                None
            }
            Request::GetPeriod(quantity) => Some(Response::Period(self.period(quantity))),
        }
    }

    /// Apply a request and send its reply, if any, through `sink`.
    pub async fn serve<S: TelemetrySink>(&mut self, header: Header, request: Request, sink: &mut S) {
        trace!("request {:?} seq {}", request, header.sequence());
        let response = self.handle_request(request).await;
        if let Some(reply) = response_frame(&header, response.as_ref()) {
            if let Err(e) = sink.send(reply).await {
                warn!("Reply to {:?} dropped: {:?}", request, e);
            }
        }
    }
}
