// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! Non-volatile flash abstraction.
//!
//! This module provides the [`Flash`] trait, which represents an *abstract
//! flash device*: a region of memory that can be read at will, but can only
//! be written by erasing and then programming it. Such a "device" can range
//! from a simple Rust slice to an on-chip flash bank (or even a subregion of
//! it!).
//!
//! Like NOR flash, an erased byte reads as `0xff`, and programming can only
//! clear bits; writing a record therefore always means erasing its whole
//! region first.

use core::convert::TryInto;

use static_assertions::assert_obj_safe;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::io;

/// The value of an erased byte.
pub const ERASED: u8 = 0xff;

/// A [`Flash`] error.
///
/// All of these errors are non-retryable; a [`Flash`] implementation should
/// block until the operation succeeds.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Error {
    /// Indicates that an operation failed because the requested
    /// operation was outside of the device's address space.
    OutOfRange,

    /// Indicates that the device is locked in some manner and cannot
    /// be affected by the operation.
    Locked,

    /// Indicates that an unspecified error occured, such as a power loss
    /// mid-operation.
    Unspecified,
}

/// Provides access to a flash-like storage device.
///
/// This trait provides abstract operations on a device, as if it were a
/// block of random-access memory that must be erased before it is
/// programmed. It is the implementation's responsibility to implement these
/// operations efficiently with respect to the underlying device.
pub trait Flash {
    /// Returns the size, in bytes, of this device.
    fn size(&self) -> Result<u32, Error>;

    /// Attempts to read `out.len()` bytes starting at `offset`.
    fn read(&self, offset: Ptr, out: &mut [u8]) -> Result<(), Error>;

    /// Attempts to write `buf.len()` bytes starting at `offset`.
    ///
    /// Programming may only clear bits. Note that this function is not
    /// guaranteed to succeed (and be reflected in the return value of
    /// `read`) until `flush()` is called.
    fn program(&mut self, offset: Ptr, buf: &[u8]) -> Result<(), Error>;

    /// Erases `region`, resetting every byte in it to [`ERASED`].
    fn erase(&mut self, region: Region) -> Result<(), Error>;

    /// Flushes any pending `program()` and `erase()` operations.
    fn flush(&mut self) -> Result<(), Error> {
        Ok(())
    }
}
assert_obj_safe!(Flash);

impl<F: Flash + ?Sized> Flash for &mut F {
    #[inline]
    fn size(&self) -> Result<u32, Error> {
        F::size(self)
    }

    #[inline]
    fn read(&self, offset: Ptr, out: &mut [u8]) -> Result<(), Error> {
        F::read(self, offset, out)
    }

    #[inline]
    fn program(&mut self, offset: Ptr, buf: &[u8]) -> Result<(), Error> {
        F::program(self, offset, buf)
    }

    #[inline]
    fn erase(&mut self, region: Region) -> Result<(), Error> {
        F::erase(self, region)
    }

    #[inline]
    fn flush(&mut self) -> Result<(), Error> {
        F::flush(self)
    }
}

/// Adapter for working with a sub-region of a [`Flash`] type.
///
/// Reads and writes on the device will be constrained to a given [`Region`].
/// This is especially useful for operating on one slot of a larger flash
/// partition.
///
/// There is no requirement that [`Region`] actually overlap with the address
/// space of `F`; the [`Flash`] implementation is still responsible for doing
/// bounds checks, after offsets are bounds-checked within `Region`.
#[derive(Copy, Clone)]
pub struct SubFlash<F>(pub F, pub Region);

impl<F> SubFlash<F> {
    /// Translates `len` bytes at `offset` within this `SubFlash` into an
    /// offset within the underlying device.
    fn translate(&self, offset: u32, len: usize) -> Result<Ptr, Error> {
        let end = (len as u32)
            .checked_add(offset)
            .ok_or(Error::OutOfRange)?;
        if end > self.1.len {
            return Err(Error::OutOfRange);
        }
        let offset = offset
            .checked_add(self.1.ptr.address)
            .ok_or(Error::OutOfRange)?;
        Ok(Ptr::new(offset))
    }
}

impl<F: Flash> Flash for SubFlash<F> {
    #[inline]
    fn size(&self) -> Result<u32, Error> {
        Ok(self.1.len)
    }

    #[inline]
    fn read(&self, offset: Ptr, out: &mut [u8]) -> Result<(), Error> {
        let offset = self.translate(offset.address, out.len())?;
        self.0.read(offset, out)
    }

    #[inline]
    fn program(&mut self, offset: Ptr, buf: &[u8]) -> Result<(), Error> {
        let offset = self.translate(offset.address, buf.len())?;
        self.0.program(offset, buf)
    }

    #[inline]
    fn erase(&mut self, region: Region) -> Result<(), Error> {
        let ptr = self.translate(region.ptr.address, region.len as usize)?;
        self.0.erase(Region {
            ptr,
            len: region.len,
        })
    }

    #[inline]
    fn flush(&mut self) -> Result<(), Error> {
        self.0.flush()
    }
}

/// Adapter for converting mutable, RAM-backed storage into a [`Flash`].
///
/// For the purposes of this type, "RAM-backed" means that `AsRef<[u8]>`
/// and `AsMut<[u8]>` are implemented. Programming follows flash rules, and
/// can only clear bits.
#[derive(Copy, Clone, Debug)]
pub struct RamMut<Bytes>(pub Bytes);

impl<Bytes: AsRef<[u8]>> RamMut<Bytes> {
    fn range(&self, offset: u32, len: usize) -> Result<(usize, usize), Error> {
        let start = offset as usize;
        let end = start.checked_add(len).ok_or(Error::OutOfRange)?;
        if end > self.0.as_ref().len() {
            return Err(Error::OutOfRange);
        }
        Ok((start, end))
    }
}

impl<Bytes: AsRef<[u8]> + AsMut<[u8]>> Flash for RamMut<Bytes> {
    fn size(&self) -> Result<u32, Error> {
        self.0
            .as_ref()
            .len()
            .try_into()
            .map_err(|_| Error::Unspecified)
    }

    #[inline]
    fn read(&self, offset: Ptr, out: &mut [u8]) -> Result<(), Error> {
        let (start, end) = self.range(offset.address, out.len())?;
        out.copy_from_slice(&self.0.as_ref()[start..end]);
        Ok(())
    }

    fn program(&mut self, offset: Ptr, buf: &[u8]) -> Result<(), Error> {
        let (start, end) = self.range(offset.address, buf.len())?;
        for (cell, byte) in self.0.as_mut()[start..end].iter_mut().zip(buf) {
            *cell &= byte;
        }
        Ok(())
    }

    fn erase(&mut self, region: Region) -> Result<(), Error> {
        let (start, end) = self.range(region.ptr.address, region.len as usize)?;
        for cell in &mut self.0.as_mut()[start..end] {
            *cell = ERASED;
        }
        Ok(())
    }
}

/// A [`Read`]/[`Write`] implementation for operating on a [`Flash`] serially.
///
/// [`Read`]: crate::io::Read
/// [`Write`]: crate::io::Write
#[derive(Copy, Clone)]
pub struct FlashIo<F> {
    flash: F,
    cursor: u32,
    len: u32,
}

impl<F: Flash> FlashIo<F> {
    /// Creates a new `FlashIo`, reading/writing from the beginning of `flash`.
    pub fn new(flash: F) -> Result<Self, Error> {
        let len = flash.size()?;
        Ok(Self {
            flash,
            cursor: 0,
            len,
        })
    }

    /// Returns how many bytes have been read or written so far.
    pub fn position(&self) -> u32 {
        self.cursor
    }
}

impl<F: Flash> io::Read for FlashIo<F> {
    fn read_bytes(&mut self, out: &mut [u8]) -> Result<(), io::Error> {
        self.flash
            .read(Ptr::new(self.cursor), out)
            .map_err(|_| io::Error::Internal)?;
        self.cursor += out.len() as u32;
        Ok(())
    }

    fn remaining_data(&self) -> usize {
        self.len.saturating_sub(self.cursor) as usize
    }
}

impl<F: Flash> io::Write for FlashIo<F> {
    fn write_bytes(&mut self, buf: &[u8]) -> Result<(), io::Error> {
        self.flash
            .program(Ptr::new(self.cursor), buf)
            .map_err(|_| io::Error::Internal)?;
        self.cursor += buf.len() as u32;
        Ok(())
    }
}

/// An abstract pointer into a [`Flash`] type.
///
/// A `Ptr` needs to be used in conjunction with a [`Flash`]
/// implementation to be read from or written to.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Ptr {
    /// The abstract address of this pointer.
    pub address: u32,
}

impl Ptr {
    /// Convenience method for creating a `Ptr` without having to use
    /// a struct literal.
    pub const fn new(address: u32) -> Self {
        Self { address }
    }
}

/// A region within a [`Flash`] type.
///
/// Much like a [`Ptr`], a `Region` needs to be interpreted with
/// respect to a [`Flash`] implementation.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Region {
    /// The base pointer for this slice.
    #[cfg_attr(feature = "serde", serde(flatten))]
    pub ptr: Ptr,
    /// The length of the slice, in bytes.
    pub len: u32,
}

impl Region {
    /// Convenience method for creating a `Region` without having to use
    /// a struct literal.
    pub const fn new(ptr: u32, len: u32) -> Self {
        Self {
            ptr: Ptr::new(ptr),
            len,
        }
    }
}


#[cfg(test)]
mod test {
    use super::*;
    use crate::io::Read as _;
    use crate::io::Write as _;

    #[test]
    fn program_clears_bits() {
        let mut flash = RamMut([ERASED; 8]);
        flash.program(Ptr::new(2), &[0x0f, 0xf0]).unwrap();
        flash.program(Ptr::new(2), &[0xff, 0x3c]).unwrap();
        assert_eq!(flash.0, [0xff, 0xff, 0x0f, 0x30, 0xff, 0xff, 0xff, 0xff]);

        flash.erase(Region::new(0, 4)).unwrap();
        assert_eq!(flash.0, [ERASED; 8]);
        assert_eq!(
            flash.program(Ptr::new(7), &[0, 0]),
            Err(Error::OutOfRange)
        );
    }

    #[test]
    fn sub_flash_bounds() {
        let mut ram = RamMut([ERASED; 16]);
        let mut sub = SubFlash(&mut ram, Region::new(8, 4));
        assert_eq!(sub.size(), Ok(4));
        sub.program(Ptr::new(1), &[1, 2, 3]).unwrap();
        assert_eq!(sub.program(Ptr::new(2), &[1, 2, 3]), Err(Error::OutOfRange));
        assert_eq!(sub.erase(Region::new(0, 5)), Err(Error::OutOfRange));

        let mut out = [0; 4];
        sub.read(Ptr::new(0), &mut out).unwrap();
        assert_eq!(out, [ERASED, 1, 2, 3]);
        assert_eq!(&ram.0[8..12], &[ERASED, 1, 2, 3]);
        assert!(ram.0[..8].iter().all(|&b| b == ERASED));
    }

    #[test]
    fn flash_io() {
        let mut ram = RamMut([ERASED; 8]);
        let mut io = FlashIo::new(&mut ram).unwrap();
        io.write_be(0xdeadbeef_u32).unwrap();
        assert_eq!(io.position(), 4);

        let mut io = FlashIo::new(&mut ram).unwrap();
        assert_eq!(io.read_be::<u32>(), Ok(0xdeadbeef));
        assert_eq!(io.remaining_data(), 4);
    }

    #[test]
    fn faulty_tears_writes() {
        let mut flash = fake::Faulty::new(8);
        flash.fail_at(1);
        flash.program(Ptr::new(0), &[0; 4]).unwrap();
        assert!(flash.program(Ptr::new(4), &[0; 4]).is_err());
        assert!(flash.is_dead());
        assert!(flash.erase(Region::new(0, 8)).is_err());

        flash.power_cycle();
        let mut out = [0; 8];
        flash.read(Ptr::new(0), &mut out).unwrap();
        assert_eq!(out, [0, 0, 0, 0, 0, 0, ERASED, ERASED]);
    }
}
