//! Latest readings and their wire frame for LoRa transparent transmit.

use embassy_sync::{blocking_mutex::raw::CriticalSectionRawMutex, mutex::Mutex};
use heapless::Vec;
use postcard::{from_bytes, to_vec};
use serde::{Deserialize, Serialize};

use crate::imu::ImuSample;
use crate::lora::NetworkIdentity;

/// Largest encoded frame; a full frame is well under this.
pub const MAX_FRAME_LEN: usize = 64;

pub type Frame = Vec<u8, MAX_FRAME_LEN>;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Telemetry {
    pub sequence: u32,
    pub imu: Option<ImuSample>,
    pub identity: Option<NetworkIdentity>, // LoRa address/channel as read back
}

impl Telemetry {
    pub const EMPTY: Telemetry = Telemetry {
        sequence: 0,
        imu: None,
        identity: None,
    };
}

impl Default for Telemetry {
    fn default() -> Self {
        Self::EMPTY
    }
}

/// Shared between the sampling task and the LoRa transmit task.
pub static TELEMETRY: Mutex<CriticalSectionRawMutex, Telemetry> = Mutex::new(Telemetry::EMPTY);

pub fn encode(telemetry: &Telemetry) -> postcard::Result<Frame> {
    to_vec(telemetry)
}

pub fn decode(frame: &[u8]) -> postcard::Result<Telemetry> {
    from_bytes(frame)
}
