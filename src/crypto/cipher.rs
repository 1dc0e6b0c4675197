// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! Symmetric block ciphers.

use crate::Result;

/// The length of a cipher key, in bytes.
pub const KEY_LEN: usize = 16;

/// The cipher's block size, in bytes.
pub const BLOCK_LEN: usize = 16;

/// A cipher key.
pub type Key = [u8; KEY_LEN];

/// An error returned by a [`Cipher`].
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Error {
    /// Indicates that the buffer was not a whole number of blocks.
    UnalignedLength,
    /// Indicates an unspecified, internal error.
    Unspecified,
}

/// A 128-bit block cipher, applied independently to every block of a buffer.
///
/// Buffers passed to a `Cipher` must be a whole number of [`BLOCK_LEN`]-byte
/// blocks; encryption and decryption happen in place.
pub trait Cipher {
    /// Encrypts `buf` under `key`.
    fn encrypt(&mut self, key: &Key, buf: &mut [u8]) -> Result<(), Error>;

    /// Decrypts `buf` under `key`.
    fn decrypt(&mut self, key: &Key, buf: &mut [u8]) -> Result<(), Error>;
}
impl dyn Cipher {} // Ensure object-safe.
