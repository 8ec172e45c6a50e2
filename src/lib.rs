#![cfg_attr(not(test), no_std)]
#![deny(unsafe_code)]

// Must come first so the logging macros are visible to the other modules.
#[macro_use]
mod fmt;

pub mod board;
pub mod error;
pub mod imu;
pub mod lora;
pub mod register;
pub mod rtk;
pub mod telemetry;

#[cfg(feature = "firmware")]
pub mod pins;

#[cfg(test)]
mod mock;

pub use error::{Error, Result};
