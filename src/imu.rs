//! MPU-6050 accelerometer/gyroscope over I2C.
//!
//! Configuration goes through bit-field writes on the live registers so that
//! bits this driver does not own (FSYNC, self-test, cycle) survive. Scale
//! factors chosen during [`Mpu6050::initialize`] are kept on the driver and
//! used by every conversion afterwards.

use embedded_hal_async::i2c::I2c;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::register::RegisterBus;

/// MPU-6050 address with AD0 tied low
pub const DEFAULT_ADDRESS: u8 = 0x68;

/// Standard gravity, m/s²
pub const GRAVITY: f32 = 9.80665;

/// Gyro output rate assumed until the low-pass filter says otherwise
pub const DEFAULT_GYRO_OUTPUT_RATE_HZ: u32 = 1_000;

/// Gyro output rate with the digital low-pass filter bypassed
pub const UNFILTERED_GYRO_OUTPUT_RATE_HZ: u32 = 8_000;

const TEMP_OFFSET_LSB: f32 = 521.0;
const TEMP_SENSITIVITY: f32 = 340.0;
const TEMP_AT_OFFSET: f32 = 36.53;

pub mod regs {
    use crate::register::BitField;

    pub const SMPLRT_DIV: u8 = 0x19;
    pub const CONFIG: u8 = 0x1A;
    pub const GYRO_CONFIG: u8 = 0x1B;
    pub const ACCEL_CONFIG: u8 = 0x1C;

    // Output registers hold the high byte at the lower address.
    pub const ACCEL_XOUT_H: u8 = 0x3B;
    pub const ACCEL_XOUT_L: u8 = 0x3C;
    pub const ACCEL_YOUT_H: u8 = 0x3D;
    pub const ACCEL_YOUT_L: u8 = 0x3E;
    pub const ACCEL_ZOUT_H: u8 = 0x3F;
    pub const ACCEL_ZOUT_L: u8 = 0x40;
    pub const TEMP_OUT_H: u8 = 0x41;
    pub const TEMP_OUT_L: u8 = 0x42;
    pub const GYRO_XOUT_H: u8 = 0x43;
    pub const GYRO_XOUT_L: u8 = 0x44;
    pub const GYRO_YOUT_H: u8 = 0x45;
    pub const GYRO_YOUT_L: u8 = 0x46;
    pub const GYRO_ZOUT_H: u8 = 0x47;
    pub const GYRO_ZOUT_L: u8 = 0x48;

    pub const PWR_MGMT_1: u8 = 0x6B;
    pub const WHO_AM_I: u8 = 0x75;

    pub const WHO_AM_I_VALUE: u8 = 0x68;

    pub const CFG_DLPF_CFG: BitField = BitField::new(2, 3);
    pub const GCONFIG_FS_SEL: BitField = BitField::new(4, 2);
    pub const ACONFIG_AFS_SEL: BitField = BitField::new(4, 2);
    pub const PWR1_CLKSEL: BitField = BitField::new(2, 3);
    pub const PWR1_SLEEP: BitField = BitField::bit(6);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ClockSource {
    Internal,
    #[default]
    PllXGyro,
    PllYGyro,
    PllZGyro,
    PllExternal32k,
    PllExternal19M,
    KeepReset,
}

impl ClockSource {
    pub const fn code(self) -> u8 {
        match self {
            ClockSource::Internal => 0,
            ClockSource::PllXGyro => 1,
            ClockSource::PllYGyro => 2,
            ClockSource::PllZGyro => 3,
            ClockSource::PllExternal32k => 4,
            ClockSource::PllExternal19M => 5,
            ClockSource::KeepReset => 7,
        }
    }
}

/// Accelerometer full-scale range. Unknown register codes fall back to ±16 g.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AccelRange {
    G2,
    G4,
    G8,
    #[default]
    G16,
}

impl AccelRange {
    pub const fn code(self) -> u8 {
        match self {
            AccelRange::G2 => 0,
            AccelRange::G4 => 1,
            AccelRange::G8 => 2,
            AccelRange::G16 => 3,
        }
    }

    /// LSB per g
    pub const fn sensitivity(self) -> f32 {
        match self {
            AccelRange::G2 => 16384.0,
            AccelRange::G4 => 8192.0,
            AccelRange::G8 => 4096.0,
            AccelRange::G16 => 2048.0,
        }
    }
}

impl From<u8> for AccelRange {
    fn from(code: u8) -> Self {
        match code {
            0 => AccelRange::G2,
            1 => AccelRange::G4,
            2 => AccelRange::G8,
            3 => AccelRange::G16,
            _ => {
                warn!("unknown accel range {}, using +-16g", code);
                AccelRange::default()
            }
        }
    }
}

/// Gyroscope full-scale range. Unknown register codes fall back to ±2000 °/s.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum GyroRange {
    Dps250,
    Dps500,
    Dps1000,
    #[default]
    Dps2000,
}

impl GyroRange {
    pub const fn code(self) -> u8 {
        match self {
            GyroRange::Dps250 => 0,
            GyroRange::Dps500 => 1,
            GyroRange::Dps1000 => 2,
            GyroRange::Dps2000 => 3,
        }
    }

    /// LSB per °/s
    pub const fn sensitivity(self) -> f32 {
        match self {
            GyroRange::Dps250 => 131.0,
            GyroRange::Dps500 => 65.5,
            GyroRange::Dps1000 => 32.8,
            GyroRange::Dps2000 => 16.4,
        }
    }
}

impl From<u8> for GyroRange {
    fn from(code: u8) -> Self {
        match code {
            0 => GyroRange::Dps250,
            1 => GyroRange::Dps500,
            2 => GyroRange::Dps1000,
            3 => GyroRange::Dps2000,
            _ => {
                warn!("unknown gyro range {}, using +-2000dps", code);
                GyroRange::default()
            }
        }
    }
}

/// Digital low-pass filter bandwidth. `Hz256` bypasses the filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LowPassBandwidth {
    #[default]
    Hz256,
    Hz188,
    Hz98,
    Hz42,
    Hz20,
    Hz10,
    Hz5,
}

impl LowPassBandwidth {
    pub const fn code(self) -> u8 {
        match self {
            LowPassBandwidth::Hz256 => 0,
            LowPassBandwidth::Hz188 => 1,
            LowPassBandwidth::Hz98 => 2,
            LowPassBandwidth::Hz42 => 3,
            LowPassBandwidth::Hz20 => 4,
            LowPassBandwidth::Hz10 => 5,
            LowPassBandwidth::Hz5 => 6,
        }
    }

    pub const fn bypasses_filter(self) -> bool {
        matches!(self, LowPassBandwidth::Hz256)
    }
}

impl From<u8> for LowPassBandwidth {
    fn from(code: u8) -> Self {
        match code {
            0 => LowPassBandwidth::Hz256,
            1 => LowPassBandwidth::Hz188,
            2 => LowPassBandwidth::Hz98,
            3 => LowPassBandwidth::Hz42,
            4 => LowPassBandwidth::Hz20,
            5 => LowPassBandwidth::Hz10,
            6 => LowPassBandwidth::Hz5,
            _ => {
                warn!("unknown low-pass bandwidth {}, bypassing filter", code);
                LowPassBandwidth::default()
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ImuConfig {
    pub clock: ClockSource,
    pub accel_range: AccelRange,
    pub gyro_range: GyroRange,
    pub bandwidth: LowPassBandwidth,
    pub sample_rate_hz: u32,
}

impl Default for ImuConfig {
    fn default() -> Self {
        Self {
            clock: ClockSource::PllXGyro,
            accel_range: AccelRange::G4,
            gyro_range: GyroRange::Dps500,
            bandwidth: LowPassBandwidth::Hz42,
            sample_rate_hz: 100,
        }
    }
}

/// One reading of every channel, in SI units except angular rate (°/s).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ImuSample {
    /// m/s²
    pub accel: [f32; 3],
    /// °/s
    pub gyro: [f32; 3],
    /// °C
    pub temperature: f32,
}

pub struct Mpu6050<I> {
    bus: RegisterBus<I>,
    accel_sensitivity: Option<f32>,
    gyro_sensitivity: Option<f32>,
    gyro_output_rate_hz: u32,
}

impl<I: I2c> Mpu6050<I> {
    pub fn new(i2c: I) -> Self {
        Self::with_address(i2c, DEFAULT_ADDRESS)
    }

    pub fn with_address(i2c: I, address: u8) -> Self {
        Self {
            bus: RegisterBus::new(i2c, address),
            accel_sensitivity: None,
            gyro_sensitivity: None,
            gyro_output_rate_hz: DEFAULT_GYRO_OUTPUT_RATE_HZ,
        }
    }

    pub fn release(self) -> I {
        self.bus.release()
    }

    pub fn accel_sensitivity(&self) -> Option<f32> {
        self.accel_sensitivity
    }

    pub fn gyro_sensitivity(&self) -> Option<f32> {
        self.gyro_sensitivity
    }

    pub fn gyro_output_rate_hz(&self) -> u32 {
        self.gyro_output_rate_hz
    }

    pub async fn who_am_i(&mut self) -> Result<u8, I::Error> {
        self.bus.read_register(regs::WHO_AM_I).await
    }

    /// Select the clock, set both full-scale ranges and take the device out of sleep.
    pub async fn initialize(
        &mut self,
        clock: ClockSource,
        accel: AccelRange,
        gyro: GyroRange,
    ) -> Result<(), I::Error> {
        self.bus
            .write_bits(regs::PWR_MGMT_1, regs::PWR1_CLKSEL, clock.code())
            .await?;

        self.accel_sensitivity = Some(accel.sensitivity());
        self.bus
            .write_bits(regs::ACCEL_CONFIG, regs::ACONFIG_AFS_SEL, accel.code())
            .await?;

        self.gyro_sensitivity = Some(gyro.sensitivity());
        self.bus
            .write_bits(regs::GYRO_CONFIG, regs::GCONFIG_FS_SEL, gyro.code())
            .await?;

        self.bus
            .write_bits(regs::PWR_MGMT_1, regs::PWR1_SLEEP, 0)
            .await?;

        info!(
            "mpu6050 awake: clock {:?}, accel {:?}, gyro {:?}",
            clock, accel, gyro
        );
        Ok(())
    }

    /// Program the low-pass filter.
    ///
    /// Bypassing the filter switches the gyro output rate to 8 kHz. Any other
    /// bandwidth keeps whatever rate was in effect, and the sample-rate divider
    /// is not recomputed; call [`Mpu6050::set_sample_rate`] again afterwards.
    pub async fn set_low_pass_filter(
        &mut self,
        bandwidth: LowPassBandwidth,
    ) -> Result<(), I::Error> {
        if bandwidth.bypasses_filter() {
            self.gyro_output_rate_hz = UNFILTERED_GYRO_OUTPUT_RATE_HZ;
        }
        self.bus
            .write_bits(regs::CONFIG, regs::CFG_DLPF_CFG, bandwidth.code())
            .await?;
        debug!(
            "dlpf {:?}, gyro output rate {} Hz",
            bandwidth, self.gyro_output_rate_hz
        );
        Ok(())
    }

    /// Write the divider giving `rate_hz` samples per second from the current gyro output rate.
    pub async fn set_sample_rate(&mut self, rate_hz: u32) -> Result<(), I::Error> {
        let divider = sample_rate_divider(self.gyro_output_rate_hz, rate_hz)
            .ok_or(Error::InvalidSampleRate(rate_hz))?;
        self.bus.write_register(regs::SMPLRT_DIV, divider).await?;
        debug!("sample rate {} Hz, divider {}", rate_hz, divider);
        Ok(())
    }

    /// Run the whole bring-up in order: ranges and wake, low-pass filter, sample rate.
    pub async fn configure(&mut self, config: &ImuConfig) -> Result<(), I::Error> {
        self.initialize(config.clock, config.accel_range, config.gyro_range)
            .await?;
        self.set_low_pass_filter(config.bandwidth).await?;
        self.set_sample_rate(config.sample_rate_hz).await
    }

    /// Acceleration in m/s² for x, y, z.
    pub async fn read_acceleration(&mut self) -> Result<[f32; 3], I::Error> {
        let sensitivity = self.accel_sensitivity.ok_or(Error::NotInitialized)?;
        let raw = self
            .read_triplet([
                (regs::ACCEL_XOUT_L, regs::ACCEL_XOUT_H),
                (regs::ACCEL_YOUT_L, regs::ACCEL_YOUT_H),
                (regs::ACCEL_ZOUT_L, regs::ACCEL_ZOUT_H),
            ])
            .await?;
        Ok(raw.map(|v| v as f32 / sensitivity * GRAVITY))
    }

    /// Angular rate in °/s for x, y, z.
    pub async fn read_angular_rate(&mut self) -> Result<[f32; 3], I::Error> {
        let sensitivity = self.gyro_sensitivity.ok_or(Error::NotInitialized)?;
        let raw = self
            .read_triplet([
                (regs::GYRO_XOUT_L, regs::GYRO_XOUT_H),
                (regs::GYRO_YOUT_L, regs::GYRO_YOUT_H),
                (regs::GYRO_ZOUT_L, regs::GYRO_ZOUT_H),
            ])
            .await?;
        Ok(raw.map(|v| v as f32 / sensitivity))
    }

    /// Die temperature in °C.
    pub async fn read_temperature(&mut self) -> Result<f32, I::Error> {
        let raw = self.read_word(regs::TEMP_OUT_L, regs::TEMP_OUT_H).await?;
        Ok(temperature_from_raw(raw))
    }

    pub async fn read_all(&mut self) -> Result<ImuSample, I::Error> {
        Ok(ImuSample {
            accel: self.read_acceleration().await?,
            gyro: self.read_angular_rate().await?,
            temperature: self.read_temperature().await?,
        })
    }

    async fn read_triplet(&mut self, axes: [(u8, u8); 3]) -> Result<[i16; 3], I::Error> {
        let mut out = [0i16; 3];
        for (value, (low, high)) in out.iter_mut().zip(axes) {
            *value = self.read_word(low, high).await?;
        }
        Ok(out)
    }

    // Low-byte register (higher address) first, then the high byte.
    async fn read_word(&mut self, low: u8, high: u8) -> Result<i16, I::Error> {
        let lo = self.bus.read_register(low).await?;
        let hi = self.bus.read_register(high).await?;
        Ok(i16::from_be_bytes([hi, lo]))
    }
}

/// `output_rate / rate - 1`, or `None` when that is not a valid one-byte divider.
pub fn sample_rate_divider(output_rate_hz: u32, rate_hz: u32) -> Option<u8> {
    if rate_hz == 0 || rate_hz > output_rate_hz {
        return None;
    }
    u8::try_from(output_rate_hz / rate_hz - 1).ok()
}

pub fn temperature_from_raw(raw: i16) -> f32 {
    (raw as f32 - TEMP_OFFSET_LSB) / TEMP_SENSITIVITY + TEMP_AT_OFFSET
}
