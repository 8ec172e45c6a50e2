use core::fmt;

/// Errors surfaced by the board drivers.
///
/// `E` is the error type of the transport the driver talks through: the
/// I2C bus for the IMU and the serial port for the RTK receiver and the
/// LoRa module. GPIO failures are collapsed into [`Error::Pin`] since the
/// pins on one board rarely share an error type with the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error<E> {
    /// Bus or serial transaction failed
    Bus(E),
    /// A control or reset line could not be driven or read
    Pin,
    /// The radio did not answer a configuration query in time
    Timeout,
    /// A configuration query is already waiting for its reply
    Busy,
    /// A formatted command did not fit into the line buffer
    CommandTooLong,
    /// Sample rate is zero, above the gyro output rate, or needs a divider above 255
    InvalidSampleRate(u32),
    /// Conversion requested before the full-scale ranges were configured
    NotInitialized,
}

pub type Result<T, E> = core::result::Result<T, Error<E>>;

impl<E: fmt::Debug> fmt::Display for Error<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Bus(e) => write!(f, "bus error: {:?}", e),
            Error::Pin => f.write_str("gpio error"),
            Error::Timeout => f.write_str("timed out waiting for radio reply"),
            Error::Busy => f.write_str("configuration query already outstanding"),
            Error::CommandTooLong => f.write_str("command exceeds line buffer"),
            Error::InvalidSampleRate(rate) => write!(f, "invalid sample rate: {} Hz", rate),
            Error::NotInitialized => f.write_str("imu not initialized"),
        }
    }
}
