// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! A write cursor over a mutable byte buffer.
//!
//! A [`Cursor`] hands out consecutive portions of its buffer, and remembers
//! how much it has handed out, so that a message of unknown length can be
//! encoded into a scratch buffer:
//! ```
//! # use boardlock::io::*;
//! # use boardlock::protocol::wire::*;
//! # use boardlock::protocol::Opcode;
//! let mut buf = [0; 16];
//!
//! let mut cursor = Cursor::new(&mut buf);
//! Opcode::Attest.to_wire(&mut cursor).unwrap();
//! assert_eq!(cursor.consumed_bytes(), &[0x04]);
//! ```

use crate::io;
use crate::io::Write;

/// A cursor over a buffer of memory.
///
/// See the [module documentation](index.html) for more information.
pub struct Cursor<'a> {
    buf: &'a mut [u8],
    // Invariant: cursor <= buf.len().
    cursor: usize,
}

impl<'a> Cursor<'a> {
    /// Creates a new `Cursor` for the given buffer.
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, cursor: 0 }
    }

    /// Consumes `n` bytes from the underlying buffer.
    ///
    /// If `n` bytes are unavailable, `BufferExhausted` is returned.
    pub fn consume(&mut self, n: usize) -> Result<&mut [u8], io::Error> {
        let end = self
            .cursor
            .checked_add(n)
            .ok_or(io::Error::BufferExhausted)?;
        if self.buf.len() < end {
            return Err(io::Error::BufferExhausted);
        }
        let output = &mut self.buf[self.cursor..end];
        self.cursor = end;

        Ok(output)
    }

    /// Returns the number of bytes consumed thus far.
    pub fn consumed_len(&self) -> usize {
        self.cursor
    }

    /// Returns the portion of the buffer which has been consumed thus far.
    pub fn consumed_bytes(&self) -> &[u8] {
        &self.buf[..self.cursor]
    }
}

impl Write for Cursor<'_> {
    fn write_bytes(&mut self, buf: &[u8]) -> Result<(), io::Error> {
        let dest = self.consume(buf.len())?;
        dest.copy_from_slice(buf);
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn cursor() {
        let mut buf = [0; 8];
        let mut cursor = Cursor::new(&mut buf);

        cursor.write_be::<u32>(0x11111124).unwrap();
        assert_eq!(cursor.consumed_len(), 4);
        assert_eq!(cursor.consumed_bytes(), &[0x11, 0x11, 0x11, 0x24]);
        assert!(cursor.write_bytes(&[0x55; 5]).is_err());
        cursor.write_bytes(&[0x55; 4]).unwrap();
        assert_eq!(cursor.consumed_len(), 8);
    }
}
