//! UART LoRa module: operating mode, network address and channel.
//!
//! The module is switched between modes with its M0/M1 lines. Address and
//! channel can only be written or read back in configuration mode. A read
//! back is answered asynchronously on the UART receive path, which is owned
//! by a different task; the two sides meet in a [`ConfigHandshake`].

use core::cell::Cell;

use embassy_futures::select::{select, Either};
use embassy_sync::blocking_mutex::{raw::CriticalSectionRawMutex, Mutex};
use embassy_sync::signal::Signal;
use embedded_hal::digital::{InputPin, OutputPin, PinState};
use embedded_hal_async::delay::DelayNs;
use embedded_io_async::Write;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Settle time around every mode change and configuration frame
pub const MODE_SETTLE_MS: u32 = 100;

pub const DEFAULT_QUERY_TIMEOUT_MS: u32 = 1_000;

const WRITE_REGISTERS: u8 = 0xC0;
const ADDRESS_REGISTER: u8 = 0x1D;
const TRAILING_CONFIG: u8 = 0x40;

/// Read-back request for address and channel
pub const QUERY_COMMAND: [u8; 3] = [0xC1, 0xC1, 0xC1];

pub const REPLY_LEN: usize = 6;

/// Unknown mode codes select `Normal`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LoraMode {
    #[default]
    Normal,
    Wake,
    Sleep,
    Configuration,
}

impl LoraMode {
    /// Levels of (M0, M1), `true` meaning high.
    pub const fn pins(self) -> (bool, bool) {
        match self {
            LoraMode::Normal => (false, false),
            LoraMode::Wake => (true, false),
            LoraMode::Sleep => (false, true),
            LoraMode::Configuration => (true, true),
        }
    }
}

impl From<u8> for LoraMode {
    fn from(code: u8) -> Self {
        match code {
            0 => LoraMode::Normal,
            1 => LoraMode::Wake,
            2 => LoraMode::Sleep,
            3 => LoraMode::Configuration,
            _ => {
                warn!("unknown lora mode {}, using normal", code);
                LoraMode::default()
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct NetworkIdentity {
    pub address: u16,
    pub channel: u8,
}

impl NetworkIdentity {
    pub const fn new(address: u16, channel: u8) -> Self {
        Self { address, channel }
    }

    /// Register write frame: opcode, address (big-endian), start register, channel, trailer.
    pub const fn to_command(self) -> [u8; 6] {
        let [high, low] = self.address.to_be_bytes();
        [
            WRITE_REGISTERS,
            high,
            low,
            ADDRESS_REGISTER,
            self.channel,
            TRAILING_CONFIG,
        ]
    }

    /// Decode a read-back reply; anything that is not exactly six bytes is rejected.
    pub fn from_reply(frame: &[u8]) -> Option<Self> {
        match frame {
            [_, high, low, _, channel, _] => Some(Self {
                address: u16::from_be_bytes([*high, *low]),
                channel: *channel,
            }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HandshakeState {
    Idle,
    Awaiting,
    Fulfilled,
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    state: HandshakeState,
    captured: Option<NetworkIdentity>,
}

const IDLE: Slot = Slot {
    state: HandshakeState::Idle,
    captured: None,
};

/// Meeting point between a configuration query and the UART receive path.
///
/// Only one query may be outstanding. The querying side arms it before
/// transmitting; the receive side fulfils it from
/// [`ConfigHandshake::on_reply_received`]. State and captured reply change
/// together under one lock, so a query closing at the same moment a reply
/// lands either sees the reply or leaves it unmatched. Lives in a `static`
/// on target.
pub struct ConfigHandshake {
    slot: Mutex<CriticalSectionRawMutex, Cell<Slot>>,
    fulfilled: Signal<CriticalSectionRawMutex, ()>,
}

impl Default for ConfigHandshake {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigHandshake {
    pub const fn new() -> Self {
        Self {
            slot: Mutex::new(Cell::new(IDLE)),
            fulfilled: Signal::new(),
        }
    }

    pub fn state(&self) -> HandshakeState {
        self.slot.lock(|slot| slot.get().state)
    }

    pub fn is_awaiting(&self) -> bool {
        self.state() == HandshakeState::Awaiting
    }

    /// A fulfilled reply is waiting to be collected.
    pub fn has_reply(&self) -> bool {
        self.slot.lock(|slot| slot.get().captured.is_some())
    }

    /// Start waiting for a reply. Returns `false` if a query is already outstanding.
    pub fn arm(&self) -> bool {
        self.slot.lock(|slot| {
            if slot.get().state == HandshakeState::Awaiting {
                return false;
            }
            slot.set(Slot {
                state: HandshakeState::Awaiting,
                captured: None,
            });
            self.fulfilled.reset();
            true
        })
    }

    /// Close the current query. Returns the reply if one landed before it closed.
    pub fn cancel(&self) -> Option<NetworkIdentity> {
        let captured = self.slot.lock(|slot| slot.replace(IDLE).captured);
        self.fulfilled.reset();
        captured
    }

    /// Feed a frame received from the radio.
    ///
    /// Frames arriving while nothing is armed, or of the wrong length, are
    /// dropped and the captured identity is left untouched. Returns whether
    /// the frame completed the handshake.
    pub fn on_reply_received(&self, frame: &[u8]) -> bool {
        let accepted = self.slot.lock(|slot| {
            if slot.get().state != HandshakeState::Awaiting {
                return false;
            }
            match NetworkIdentity::from_reply(frame) {
                Some(identity) => {
                    slot.set(Slot {
                        state: HandshakeState::Fulfilled,
                        captured: Some(identity),
                    });
                    true
                }
                None => false,
            }
        });

        if accepted {
            self.fulfilled.signal(());
        } else {
            trace!("dropping {} byte lora frame", frame.len());
        }
        accepted
    }

    /// Wait until the armed query is fulfilled and collect the reply.
    pub async fn wait(&self) -> NetworkIdentity {
        loop {
            self.fulfilled.wait().await;
            let captured = self.slot.lock(|slot| {
                let current = slot.get();
                if current.captured.is_some() {
                    slot.set(IDLE);
                }
                current.captured
            });
            if let Some(identity) = captured {
                return identity;
            }
        }
    }
}

/// LoRa module on a UART with M0/M1 mode lines and an AUX busy line.
pub struct LoraRadio<'h, U, M0, M1, A, D> {
    uart: U,
    m0: M0,
    m1: M1,
    aux: A,
    delay: D,
    handshake: &'h ConfigHandshake,
    mode: LoraMode,
}

impl<'h, U, M0, M1, A, D> LoraRadio<'h, U, M0, M1, A, D>
where
    U: Write,
    M0: OutputPin,
    M1: OutputPin,
    A: InputPin,
    D: DelayNs,
{
    /// The mode lines are assumed to already hold `Normal`; call
    /// [`LoraRadio::set_mode`] to force them.
    pub fn new(uart: U, m0: M0, m1: M1, aux: A, delay: D, handshake: &'h ConfigHandshake) -> Self {
        Self {
            uart,
            m0,
            m1,
            aux,
            delay,
            handshake,
            mode: LoraMode::Normal,
        }
    }

    pub fn mode(&self) -> LoraMode {
        self.mode
    }

    pub fn handshake(&self) -> &'h ConfigHandshake {
        self.handshake
    }

    pub fn release(self) -> (U, M0, M1, A, D) {
        (self.uart, self.m0, self.m1, self.aux, self.delay)
    }

    pub fn set_mode(&mut self, mode: LoraMode) -> Result<(), U::Error> {
        let (m0, m1) = mode.pins();
        self.m0
            .set_state(PinState::from(m0))
            .map_err(|_| Error::Pin)?;
        self.m1
            .set_state(PinState::from(m1))
            .map_err(|_| Error::Pin)?;
        self.mode = mode;
        debug!("lora mode {:?}", mode);
        Ok(())
    }

    /// AUX is high while the module is idle and low while it is busy.
    pub fn aux_ready(&mut self) -> Result<bool, U::Error> {
        self.aux.is_high().map_err(|_| Error::Pin)
    }

    /// Transparent data transmit.
    pub async fn send(&mut self, data: &[u8]) -> Result<(), U::Error> {
        self.uart.write_all(data).await.map_err(Error::Bus)
    }

    /// Program address and channel, then return the module to `Normal`.
    ///
    /// A transmit failure is reported after the mode lines are restored. A
    /// pin failure while restoring is logged and left visible through
    /// [`LoraRadio::mode`]; it never replaces the outcome of the write.
    pub async fn set_address_and_channel(
        &mut self,
        identity: NetworkIdentity,
    ) -> Result<(), U::Error> {
        let command = identity.to_command();

        let mut session = ConfigSession::enter(self).await?;
        let sent = session.radio.uart.write_all(&command).await;
        session.radio.delay.delay_ms(MODE_SETTLE_MS).await;
        session.leave().await;

        sent.map_err(Error::Bus)?;
        info!(
            "lora address {} channel {} written",
            identity.address, identity.channel
        );
        Ok(())
    }

    /// Read address and channel back from the module.
    ///
    /// The reply is delivered by whoever owns the receive side calling
    /// [`ConfigHandshake::on_reply_received`]. `timeout_ms` bounds the wait
    /// after the post-transmit settle time; on expiry the handshake is
    /// cancelled and [`Error::Timeout`] returned. Mode restore failures are
    /// handled as in [`LoraRadio::set_address_and_channel`].
    ///
    /// Dropping the future part way cancels the handshake and drives the
    /// mode lines back to `Normal` without the settle delay.
    pub async fn query_address_and_channel(
        &mut self,
        timeout_ms: u32,
    ) -> Result<NetworkIdentity, U::Error> {
        let mut session = ConfigSession::enter(self).await?;
        let result = session.exchange_query(timeout_ms).await;
        session.leave().await;
        result
    }
}

/// One stay in configuration mode.
///
/// If the owning future is dropped before [`ConfigSession::leave`], an armed
/// query is cancelled and the mode lines are driven back to `Normal`.
struct ConfigSession<'r, 'h, U, M0, M1, A, D>
where
    U: Write,
    M0: OutputPin,
    M1: OutputPin,
    A: InputPin,
    D: DelayNs,
{
    radio: &'r mut LoraRadio<'h, U, M0, M1, A, D>,
    armed: bool,
    restore: bool,
}

impl<'r, 'h, U, M0, M1, A, D> ConfigSession<'r, 'h, U, M0, M1, A, D>
where
    U: Write,
    M0: OutputPin,
    M1: OutputPin,
    A: InputPin,
    D: DelayNs,
{
    async fn enter(radio: &'r mut LoraRadio<'h, U, M0, M1, A, D>) -> Result<Self, U::Error> {
        let mut session = Self {
            radio,
            armed: false,
            restore: true,
        };
        session.radio.set_mode(LoraMode::Configuration)?;
        session.radio.delay.delay_ms(MODE_SETTLE_MS).await;
        Ok(session)
    }

    async fn exchange_query(&mut self, timeout_ms: u32) -> Result<NetworkIdentity, U::Error> {
        let handshake = self.radio.handshake;
        if !handshake.arm() {
            warn!("lora query already outstanding");
            return Err(Error::Busy);
        }
        self.armed = true;

        if let Err(e) = self.radio.uart.write_all(&QUERY_COMMAND).await {
            self.armed = false;
            handshake.cancel();
            return Err(Error::Bus(e));
        }
        self.radio.delay.delay_ms(MODE_SETTLE_MS).await;

        let reply = select(handshake.wait(), self.radio.delay.delay_ms(timeout_ms)).await;
        self.armed = false;

        let identity = match reply {
            Either::First(identity) => identity,
            // The reply may have landed alongside the timeout
            Either::Second(()) => match handshake.cancel() {
                Some(identity) => identity,
                None => {
                    warn!("lora query timed out after {} ms", timeout_ms);
                    return Err(Error::Timeout);
                }
            },
        };
        info!(
            "lora address {} channel {}",
            identity.address, identity.channel
        );
        Ok(identity)
    }

    async fn leave(mut self) {
        self.restore = false;
        if self.radio.set_mode(LoraMode::Normal).is_err() {
            warn!("lora mode lines stuck in {:?}", self.radio.mode);
        }
        self.radio.delay.delay_ms(MODE_SETTLE_MS).await;
    }
}

impl<'r, 'h, U, M0, M1, A, D> Drop for ConfigSession<'r, 'h, U, M0, M1, A, D>
where
    U: Write,
    M0: OutputPin,
    M1: OutputPin,
    A: InputPin,
    D: DelayNs,
{
    fn drop(&mut self) {
        if self.armed {
            self.radio.handshake.cancel();
        }
        if self.restore && self.radio.set_mode(LoraMode::Normal).is_err() {
            warn!("lora mode lines stuck in {:?}", self.radio.mode);
        }
    }
}
