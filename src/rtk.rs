//! RTK GNSS receiver configuration.
//!
//! The receiver takes ASCII command lines on its configuration port (COM1)
//! and never acknowledges them, so every line is followed by a fixed settle
//! time. Each operating mode is built as a [`Sequence`] of lines and delays
//! and handed to [`run_sequence`].

use core::fmt::{self, Write as _};

use embedded_hal_async::delay::DelayNs;
use embedded_io_async::Write;
use heapless::{String, Vec};

use crate::error::{Error, Result};

/// Settle time after every command except the factory reset
pub const COMMAND_SETTLE_MS: u32 = 100;

/// Time the receiver needs to reboot after `freset`
pub const REBOOT_SETTLE_MS: u32 = 10_000;

pub const LINE_CAPACITY: usize = 96;
pub const MAX_STEPS: usize = 10;

/// Port the receiver streams corrections and NMEA on
const OUTPUT_PORT: &str = "com3";

/// RTCM messages a base publishes, with their output period in seconds
const RTCM_OUTPUTS: [(u16, u8); 6] = [
    (1006, 10),
    (1033, 10),
    (1074, 1),
    (1124, 1),
    (1084, 1),
    (1094, 1),
];

pub type Line = String<LINE_CAPACITY>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    /// Full command line including the trailing `\r\n`
    pub command: Line,
    pub settle_ms: u32,
}

pub type Sequence = Vec<Step, MAX_STEPS>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CommandTooLong;

impl<E> From<CommandTooLong> for Error<E> {
    fn from(_: CommandTooLong) -> Self {
        Error::CommandTooLong
    }
}

/// How a base station fixes its own reference position.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BaseMode {
    /// Surveyed position: degrees, degrees, metres
    Position {
        latitude: f64,
        longitude: f64,
        altitude: f64,
    },
    /// Average its own fix for this many seconds
    SurveyTime { seconds: u32 },
}

/// Rover NMEA output rate. Unknown rates fall back to 1 Hz.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RoverRate {
    #[default]
    Hz1,
    Hz2,
    Hz5,
    Hz10,
    Hz20,
    Hz50,
}

impl RoverRate {
    /// Output period in seconds, exactly as the receiver expects it typed.
    pub const fn period(self) -> &'static str {
        match self {
            RoverRate::Hz1 => "1",
            RoverRate::Hz2 => "0.5",
            RoverRate::Hz5 => "0.2",
            RoverRate::Hz10 => "0.1",
            RoverRate::Hz20 => "0.05",
            RoverRate::Hz50 => "0.02",
        }
    }
}

impl From<u32> for RoverRate {
    fn from(hz: u32) -> Self {
        match hz {
            1 => RoverRate::Hz1,
            2 => RoverRate::Hz2,
            5 => RoverRate::Hz5,
            10 => RoverRate::Hz10,
            20 => RoverRate::Hz20,
            50 => RoverRate::Hz50,
            _ => {
                warn!("unsupported rover rate {} Hz, using 1 Hz", hz);
                RoverRate::default()
            }
        }
    }
}

fn push_step(
    sequence: &mut Sequence,
    settle_ms: u32,
    args: fmt::Arguments<'_>,
) -> core::result::Result<(), CommandTooLong> {
    let mut command = Line::new();
    command.write_fmt(args).map_err(|_| CommandTooLong)?;
    command.push_str("\r\n").map_err(|_| CommandTooLong)?;
    sequence
        .push(Step { command, settle_ms })
        .map_err(|_| CommandTooLong)
}

/// Factory reset, base mode, RTCM outputs, save.
pub fn base_sequence(mode: &BaseMode) -> core::result::Result<Sequence, CommandTooLong> {
    let mut sequence = Sequence::new();
    push_step(&mut sequence, REBOOT_SETTLE_MS, format_args!("freset"))?;

    match *mode {
        BaseMode::Position {
            latitude,
            longitude,
            altitude,
        } => push_step(
            &mut sequence,
            COMMAND_SETTLE_MS,
            format_args!("mode base {:.9} {:.9} {:.2}", latitude, longitude, altitude),
        )?,
        BaseMode::SurveyTime { seconds } => push_step(
            &mut sequence,
            COMMAND_SETTLE_MS,
            format_args!("mode base time {}", seconds),
        )?,
    }

    for (message, period) in RTCM_OUTPUTS {
        push_step(
            &mut sequence,
            COMMAND_SETTLE_MS,
            format_args!("rtcm{} {} {}", message, OUTPUT_PORT, period),
        )?;
    }

    push_step(&mut sequence, COMMAND_SETTLE_MS, format_args!("saveconfig"))?;
    Ok(sequence)
}

/// Factory reset, rover mode, GGA and THS output at `rate`, save.
pub fn rover_sequence(rate: RoverRate) -> core::result::Result<Sequence, CommandTooLong> {
    let mut sequence = Sequence::new();
    push_step(&mut sequence, REBOOT_SETTLE_MS, format_args!("freset"))?;
    push_step(&mut sequence, COMMAND_SETTLE_MS, format_args!("mode rover"))?;
    for sentence in ["gpgga", "gpths"] {
        push_step(
            &mut sequence,
            COMMAND_SETTLE_MS,
            format_args!("{} {} {}", sentence, OUTPUT_PORT, rate.period()),
        )?;
    }
    push_step(&mut sequence, COMMAND_SETTLE_MS, format_args!("saveconfig"))?;
    Ok(sequence)
}

/// Send each line in order, sleeping its settle time after it.
pub async fn run_sequence<W, D>(
    port: &mut W,
    delay: &mut D,
    sequence: &[Step],
) -> Result<(), W::Error>
where
    W: Write,
    D: DelayNs,
{
    for step in sequence {
        debug!("rtk <- {}", step.command.as_str().trim_end());
        port.write_all(step.command.as_bytes())
            .await
            .map_err(Error::Bus)?;
        delay.delay_ms(step.settle_ms).await;
    }
    Ok(())
}

/// The receiver's two serial links: COM1 for configuration, COM3 for correction data.
pub struct RtkReceiver<C, B, D> {
    config_port: C,
    data_port: B,
    delay: D,
}

impl<C, B, D> RtkReceiver<C, B, D>
where
    C: Write,
    B: Write,
    D: DelayNs,
{
    pub fn new(config_port: C, data_port: B, delay: D) -> Self {
        Self {
            config_port,
            data_port,
            delay,
        }
    }

    pub fn release(self) -> (C, B, D) {
        (self.config_port, self.data_port, self.delay)
    }

    /// Raw bytes to the configuration port.
    pub async fn send_config(&mut self, bytes: &[u8]) -> Result<(), C::Error> {
        self.config_port.write_all(bytes).await.map_err(Error::Bus)
    }

    /// Raw correction bytes to the data port.
    pub async fn send_base_data(&mut self, bytes: &[u8]) -> Result<(), B::Error> {
        self.data_port.write_all(bytes).await.map_err(Error::Bus)
    }

    pub async fn configure_base(&mut self, mode: &BaseMode) -> Result<(), C::Error> {
        let sequence = base_sequence(mode)?;
        info!("configuring rtk base: {:?}", mode);
        run_sequence(&mut self.config_port, &mut self.delay, &sequence).await
    }

    pub async fn configure_base_at_position(
        &mut self,
        latitude: f64,
        longitude: f64,
        altitude: f64,
    ) -> Result<(), C::Error> {
        self.configure_base(&BaseMode::Position {
            latitude,
            longitude,
            altitude,
        })
        .await
    }

    pub async fn configure_base_at_time(&mut self, seconds: u32) -> Result<(), C::Error> {
        self.configure_base(&BaseMode::SurveyTime { seconds }).await
    }

    pub async fn configure_rover(&mut self, rate: RoverRate) -> Result<(), C::Error> {
        let sequence = rover_sequence(rate)?;
        info!("configuring rtk rover at {:?}", rate);
        run_sequence(&mut self.config_port, &mut self.delay, &sequence).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{Event, Journal, MockDelay, MockSerial};

    fn receiver(journal: &Journal) -> RtkReceiver<MockSerial, MockSerial, MockDelay> {
        RtkReceiver::new(
            MockSerial::new(journal, "com1"),
            MockSerial::new(journal, "com3"),
            MockDelay::new(journal),
        )
    }

    fn tx(line: &str) -> Event {
        Event::Tx {
            port: "com1",
            bytes: line.as_bytes().to_vec(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn rover_at_10hz_emits_exact_lines_and_delays() {
        let journal = Journal::default();
        let mut rtk = receiver(&journal);

        rtk.configure_rover(RoverRate::Hz10).await.unwrap();

        assert_eq!(
            journal.io_events(),
            vec![
                tx("freset\r\n"),
                Event::Delay(10_000),
                tx("mode rover\r\n"),
                Event::Delay(100),
                tx("gpgga com3 0.1\r\n"),
                Event::Delay(100),
                tx("gpths com3 0.1\r\n"),
                Event::Delay(100),
                tx("saveconfig\r\n"),
                Event::Delay(100),
            ]
        );
    }

    #[test]
    fn every_rover_rate_maps_to_its_period() {
        let expected = [
            (1u32, "1"),
            (2, "0.5"),
            (5, "0.2"),
            (10, "0.1"),
            (20, "0.05"),
            (50, "0.02"),
        ];
        for (hz, period) in expected {
            let sequence = rover_sequence(RoverRate::from(hz)).unwrap();
            assert_eq!(sequence[2].command.as_str(), format!("gpgga com3 {period}\r\n"));
            assert_eq!(sequence[3].command.as_str(), format!("gpths com3 {period}\r\n"));
        }
    }

    #[test]
    fn unknown_rover_rate_uses_1hz_entry() {
        assert_eq!(RoverRate::from(7u32), RoverRate::Hz1);
        let sequence = rover_sequence(RoverRate::from(100u32)).unwrap();
        assert_eq!(sequence[2].command.as_str(), "gpgga com3 1\r\n");
    }

    #[tokio::test(start_paused = true)]
    async fn base_at_position_formats_coordinates_exactly() {
        let journal = Journal::default();
        let mut rtk = receiver(&journal);

        rtk.configure_base_at_position(40.123456789, -105.5, 1655.4321)
            .await
            .unwrap();

        assert_eq!(
            journal.tx_lines("com1"),
            vec![
                "freset\r\n",
                "mode base 40.123456789 -105.500000000 1655.43\r\n",
                "rtcm1006 com3 10\r\n",
                "rtcm1033 com3 10\r\n",
                "rtcm1074 com3 1\r\n",
                "rtcm1124 com3 1\r\n",
                "rtcm1084 com3 1\r\n",
                "rtcm1094 com3 1\r\n",
                "saveconfig\r\n",
            ]
        );
        let mut delays = vec![10_000];
        delays.extend([100; 8]);
        assert_eq!(journal.delays(), delays);
    }

    #[tokio::test(start_paused = true)]
    async fn base_at_time_only_changes_the_mode_line() {
        let journal = Journal::default();
        let mut rtk = receiver(&journal);

        rtk.configure_base_at_time(300).await.unwrap();

        let lines = journal.tx_lines("com1");
        assert_eq!(lines.len(), 9);
        assert_eq!(lines[1], "mode base time 300\r\n");
        assert_eq!(lines[8], "saveconfig\r\n");
        assert_eq!(journal.delays()[0], 10_000);
    }

    #[tokio::test(start_paused = true)]
    async fn oversized_command_is_rejected_before_anything_is_sent() {
        let journal = Journal::default();
        let mut rtk = receiver(&journal);

        let result = rtk.configure_base_at_position(0.0, 0.0, 1e80).await;

        assert_eq!(result, Err(Error::CommandTooLong));
        assert!(journal.events().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn transport_failure_stops_the_sequence() {
        let journal = Journal::default();
        let mut rtk = RtkReceiver::new(
            MockSerial::failing(&journal, "com1"),
            MockSerial::new(&journal, "com3"),
            MockDelay::new(&journal),
        );

        assert!(matches!(
            rtk.configure_rover(RoverRate::Hz1).await,
            Err(Error::Bus(_))
        ));
        assert!(journal.delays().is_empty());
    }

    #[tokio::test]
    async fn pass_through_goes_to_the_matching_port() {
        let journal = Journal::default();
        let mut rtk = receiver(&journal);

        rtk.send_config(b"log version\r\n").await.unwrap();
        rtk.send_base_data(&[0xd3, 0x00, 0x13]).await.unwrap();

        assert_eq!(journal.tx_lines("com1"), vec!["log version\r\n"]);
        assert_eq!(journal.tx_frames("com3"), vec![vec![0xd3, 0x00, 0x13]]);
    }
}
