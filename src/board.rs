//! Status LEDs and device reset lines.

use core::convert::Infallible;

use embedded_hal::digital::{OutputPin, PinState};
use embedded_hal_async::delay::DelayNs;

use crate::error::{Error, Result};

/// RTK reset is active low.
pub const RTK_RESET_HOLD_MS: u32 = 100;

/// IMU reset is active high.
pub const IMU_RESET_HOLD_MS: u32 = 2_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Led {
    Run,
    Error,
}

fn drive<P: OutputPin>(pin: &mut P, high: bool) -> Result<(), Infallible> {
    pin.set_state(PinState::from(high)).map_err(|_| Error::Pin)
}

pub struct StatusLeds<R, E> {
    run: R,
    err: E,
}

impl<R: OutputPin, E: OutputPin> StatusLeds<R, E> {
    pub fn new(run: R, err: E) -> Self {
        Self { run, err }
    }

    pub fn set(&mut self, led: Led, on: bool) -> Result<(), Infallible> {
        match led {
            Led::Run => drive(&mut self.run, on),
            Led::Error => drive(&mut self.err, on),
        }
    }

    pub fn on(&mut self, led: Led) -> Result<(), Infallible> {
        self.set(led, true)
    }

    pub fn off(&mut self, led: Led) -> Result<(), Infallible> {
        self.set(led, false)
    }
}

/// Hardware reset lines of the RTK receiver and the IMU.
pub struct ResetLines<T, I, D> {
    rtk: T,
    imu: I,
    delay: D,
}

impl<T, I, D> ResetLines<T, I, D>
where
    T: OutputPin,
    I: OutputPin,
    D: DelayNs,
{
    pub fn new(rtk: T, imu: I, delay: D) -> Self {
        Self { rtk, imu, delay }
    }

    pub async fn reset_rtk(&mut self) -> Result<(), Infallible> {
        info!("resetting rtk receiver");
        drive(&mut self.rtk, false)?;
        self.delay.delay_ms(RTK_RESET_HOLD_MS).await;
        drive(&mut self.rtk, true)
    }

    pub async fn reset_imu(&mut self) -> Result<(), Infallible> {
        info!("resetting imu");
        drive(&mut self.imu, true)?;
        self.delay.delay_ms(IMU_RESET_HOLD_MS).await;
        drive(&mut self.imu, false)
    }
}
