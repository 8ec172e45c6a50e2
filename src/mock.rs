//! Host doubles for the bus, serial, GPIO and delay traits.
//!
//! Every double records into one shared [`Journal`] so tests can assert on
//! the interleaving of commands, pin changes and settle delays.

use std::boxed::Box;
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::string::String;
use std::vec::Vec;

use embedded_hal::digital::{self, InputPin, OutputPin};
use embedded_hal::i2c::{self, Operation};
use embedded_hal_async::delay::DelayNs;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    RegRead { register: u8 },
    RegWrite { register: u8, value: u8 },
    Tx { port: &'static str, bytes: Vec<u8> },
    Pin { name: &'static str, high: bool },
    Delay(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockError {
    Nack,
    Io,
}

impl i2c::Error for MockError {
    fn kind(&self) -> i2c::ErrorKind {
        match self {
            MockError::Nack => i2c::ErrorKind::NoAcknowledge(i2c::NoAcknowledgeSource::Address),
            MockError::Io => i2c::ErrorKind::Other,
        }
    }
}

impl digital::Error for MockError {
    fn kind(&self) -> digital::ErrorKind {
        digital::ErrorKind::Other
    }
}

impl embedded_io_async::Error for MockError {
    fn kind(&self) -> embedded_io_async::ErrorKind {
        embedded_io_async::ErrorKind::Other
    }
}

#[derive(Debug, Clone, Default)]
pub struct Journal(Rc<RefCell<Vec<Event>>>);

impl Journal {
    pub fn push(&self, event: Event) {
        self.0.borrow_mut().push(event);
    }

    pub fn events(&self) -> Vec<Event> {
        self.0.borrow().clone()
    }

    pub fn clear(&self) {
        self.0.borrow_mut().clear();
    }

    /// Everything except register traffic, in order.
    pub fn io_events(&self) -> Vec<Event> {
        self.events()
            .into_iter()
            .filter(|e| !matches!(e, Event::RegRead { .. } | Event::RegWrite { .. }))
            .collect()
    }

    pub fn tx_frames(&self, port: &str) -> Vec<Vec<u8>> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Tx { port: p, bytes } if p == port => Some(bytes),
                _ => None,
            })
            .collect()
    }

    pub fn tx_lines(&self, port: &str) -> Vec<String> {
        self.tx_frames(port)
            .into_iter()
            .map(|bytes| String::from_utf8(bytes).expect("ascii command"))
            .collect()
    }

    pub fn delays(&self) -> Vec<u32> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Delay(ms) => Some(ms),
                _ => None,
            })
            .collect()
    }
}

/// Simulated register file of one I2C device.
#[derive(Clone)]
pub struct MockI2c {
    address: u8,
    registers: Rc<RefCell<[u8; 256]>>,
    journal: Journal,
}

impl MockI2c {
    pub fn new(journal: &Journal, address: u8) -> Self {
        Self {
            address,
            registers: Rc::new(RefCell::new([0u8; 256])),
            journal: journal.clone(),
        }
    }

    pub fn poke(&self, register: u8, value: u8) {
        self.registers.borrow_mut()[register as usize] = value;
    }

    /// Store `value` big-endian at `high`/`high + 1`, as the sensor output registers hold it.
    pub fn poke_i16(&self, high: u8, value: i16) {
        let [h, l] = value.to_be_bytes();
        self.poke(high, h);
        self.poke(high + 1, l);
    }

    pub fn peek(&self, register: u8) -> u8 {
        self.registers.borrow()[register as usize]
    }

    pub fn register_writes(&self) -> Vec<(u8, u8)> {
        self.journal
            .events()
            .into_iter()
            .filter_map(|e| match e {
                Event::RegWrite { register, value } => Some((register, value)),
                _ => None,
            })
            .collect()
    }

    pub fn register_reads(&self) -> Vec<u8> {
        self.journal
            .events()
            .into_iter()
            .filter_map(|e| match e {
                Event::RegRead { register } => Some(register),
                _ => None,
            })
            .collect()
    }
}

impl i2c::ErrorType for MockI2c {
    type Error = MockError;
}

impl embedded_hal_async::i2c::I2c for MockI2c {
    async fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        if address != self.address {
            return Err(MockError::Nack);
        }

        let mut pointer = 0u8;
        let mut registers = self.registers.borrow_mut();
        for operation in operations.iter_mut() {
            match operation {
                Operation::Write(bytes) => {
                    if let Some((first, rest)) = bytes.split_first() {
                        pointer = *first;
                        for value in rest {
                            registers[pointer as usize] = *value;
                            self.journal.push(Event::RegWrite {
                                register: pointer,
                                value: *value,
                            });
                            pointer = pointer.wrapping_add(1);
                        }
                    }
                }
                Operation::Read(buf) => {
                    for byte in buf.iter_mut() {
                        *byte = registers[pointer as usize];
                        self.journal.push(Event::RegRead { register: pointer });
                        pointer = pointer.wrapping_add(1);
                    }
                }
            }
        }
        Ok(())
    }
}

/// Serial port recording one frame per `write` call.
pub struct MockSerial {
    port: &'static str,
    journal: Journal,
    fail: bool,
    responder: Option<Box<dyn FnMut(&[u8])>>,
}

impl MockSerial {
    pub fn new(journal: &Journal, port: &'static str) -> Self {
        Self {
            port,
            journal: journal.clone(),
            fail: false,
            responder: None,
        }
    }

    pub fn failing(journal: &Journal, port: &'static str) -> Self {
        Self {
            fail: true,
            ..Self::new(journal, port)
        }
    }

    /// Run `responder` with every transmitted frame, after it has been recorded.
    pub fn with_responder(mut self, responder: impl FnMut(&[u8]) + 'static) -> Self {
        self.responder = Some(Box::new(responder));
        self
    }
}

impl embedded_io_async::ErrorType for MockSerial {
    type Error = MockError;
}

impl embedded_io_async::Write for MockSerial {
    async fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        if self.fail {
            return Err(MockError::Io);
        }
        self.journal.push(Event::Tx {
            port: self.port,
            bytes: buf.to_vec(),
        });
        if let Some(responder) = self.responder.as_mut() {
            responder(buf);
        }
        Ok(buf.len())
    }

    async fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

#[derive(Clone)]
pub struct MockPin {
    name: &'static str,
    level: Rc<Cell<bool>>,
    stuck: Rc<Cell<bool>>,
    journal: Journal,
}

impl MockPin {
    pub fn new(journal: &Journal, name: &'static str, high: bool) -> Self {
        Self {
            name,
            level: Rc::new(Cell::new(high)),
            stuck: Rc::new(Cell::new(false)),
            journal: journal.clone(),
        }
    }

    /// While stuck, output writes fail and leave the level alone.
    pub fn set_stuck(&self, stuck: bool) {
        self.stuck.set(stuck);
    }

    pub fn is_set_high(&self) -> bool {
        self.level.get()
    }

    /// Drive an input pin from the test side without journalling it.
    pub fn drive(&self, high: bool) {
        self.level.set(high);
    }
}

impl MockPin {
    fn write(&mut self, high: bool) -> Result<(), MockError> {
        if self.stuck.get() {
            return Err(MockError::Io);
        }
        self.level.set(high);
        self.journal.push(Event::Pin {
            name: self.name,
            high,
        });
        Ok(())
    }
}

impl digital::ErrorType for MockPin {
    type Error = MockError;
}

impl OutputPin for MockPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.write(false)
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.write(true)
    }
}

impl InputPin for MockPin {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        Ok(self.level.get())
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        Ok(!self.level.get())
    }
}

/// Delay that journals the requested duration and sleeps on the tokio clock.
///
/// Tests run with a paused clock, so long device delays finish instantly but
/// keep their ordering against other tasks.
#[derive(Clone)]
pub struct MockDelay {
    journal: Journal,
}

impl MockDelay {
    pub fn new(journal: &Journal) -> Self {
        Self {
            journal: journal.clone(),
        }
    }
}

impl DelayNs for MockDelay {
    async fn delay_ns(&mut self, ns: u32) {
        self.journal.push(Event::Delay(ns / 1_000_000));
        tokio::time::sleep(std::time::Duration::from_nanos(ns as u64)).await;
    }

    async fn delay_ms(&mut self, ms: u32) {
        self.journal.push(Event::Delay(ms));
        tokio::time::sleep(std::time::Duration::from_millis(ms as u64)).await;
    }
}
