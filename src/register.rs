//! Single-byte register access and bit-field read-modify-write.
//!
//! Fields are described the way register maps print them: the index of the
//! most significant bit plus a length, so `BitField::new(4, 2)` covers bits
//! `[4:3]`.

use embedded_hal_async::i2c::I2c;

use crate::error::{Error, Result};

/// A run of bits inside one 8-bit register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BitField {
    start: u8,
    length: u8,
}

impl BitField {
    /// Field whose most significant bit is `start` and that spans `length` bits
    /// towards bit 0.
    ///
    /// Panics (at compile time when used in a `const`) if the field does not
    /// fit inside one byte.
    pub const fn new(start: u8, length: u8) -> Self {
        assert!(start < 8, "bit field start must be within the byte");
        assert!(length >= 1 && length <= 8, "bit field length must be 1..=8");
        assert!(start + 1 >= length, "bit field runs past bit 0");
        Self { start, length }
    }

    pub const fn bit(index: u8) -> Self {
        Self::new(index, 1)
    }

    pub const fn start(&self) -> u8 {
        self.start
    }

    pub const fn len(&self) -> u8 {
        self.length
    }

    /// Position of the field's least significant bit.
    pub const fn shift(&self) -> u8 {
        self.start + 1 - self.length
    }

    pub const fn mask(&self) -> u8 {
        ((((1u16 << self.length) - 1) << self.shift()) & 0xff) as u8
    }

    /// Replace the field inside `current` with `value`, leaving all other bits as they were.
    ///
    /// Bits of `value` above the field width are dropped.
    pub const fn insert(&self, current: u8, value: u8) -> u8 {
        let mask = self.mask();
        (current & !mask) | ((value << self.shift()) & mask)
    }

    pub const fn extract(&self, current: u8) -> u8 {
        (current & self.mask()) >> self.shift()
    }
}

/// A device on an I2C bus addressed through 8-bit registers.
///
/// Nothing serialises the read and write halves of [`RegisterBus::write_bits`];
/// a second writer to the same register between them loses its update.
pub struct RegisterBus<I> {
    i2c: I,
    address: u8,
}

impl<I: I2c> RegisterBus<I> {
    pub fn new(i2c: I, address: u8) -> Self {
        Self { i2c, address }
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    pub fn release(self) -> I {
        self.i2c
    }

    pub async fn read_register(&mut self, register: u8) -> Result<u8, I::Error> {
        let mut buf = [0u8; 1];
        self.i2c
            .write_read(self.address, &[register], &mut buf)
            .await
            .map_err(Error::Bus)?;
        Ok(buf[0])
    }

    pub async fn write_register(&mut self, register: u8, value: u8) -> Result<(), I::Error> {
        self.i2c
            .write(self.address, &[register, value])
            .await
            .map_err(Error::Bus)
    }

    /// Read `register`, splice `value` into `field` and write the byte back.
    pub async fn write_bits(
        &mut self,
        register: u8,
        field: BitField,
        value: u8,
    ) -> Result<(), I::Error> {
        let current = self.read_register(register).await?;
        let updated = field.insert(current, value);
        trace!(
            "reg {:?}: {:?} -> {:?} (mask {:?})",
            register,
            current,
            updated,
            field.mask()
        );
        self.write_register(register, updated).await
    }

    pub async fn read_bits(&mut self, register: u8, field: BitField) -> Result<u8, I::Error> {
        let current = self.read_register(register).await?;
        Ok(field.extract(current))
    }
}
