// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! A [`cipher::Cipher`] based on the [`aes`] crate.

use aes::cipher::generic_array::GenericArray;
use aes::cipher::BlockDecrypt as _;
use aes::cipher::BlockEncrypt as _;
use aes::cipher::KeyInit as _;
use aes::Aes128;

use crate::crypto::cipher;
use crate::Result;

/// A software AES-128 [`cipher::Cipher`].
#[derive(Copy, Clone, Debug, Default)]
pub struct Cipher;

impl Cipher {
    /// Creates a new `Cipher`.
    pub fn new() -> Self {
        Self
    }
}

impl cipher::Cipher for Cipher {
    fn encrypt(
        &mut self,
        key: &cipher::Key,
        buf: &mut [u8],
    ) -> Result<(), cipher::Error> {
        check!(
            buf.len() % cipher::BLOCK_LEN == 0,
            cipher::Error::UnalignedLength
        );
        let aes = Aes128::new(GenericArray::from_slice(key));
        for block in buf.chunks_exact_mut(cipher::BLOCK_LEN) {
            aes.encrypt_block(GenericArray::from_mut_slice(block));
        }
        Ok(())
    }

    fn decrypt(
        &mut self,
        key: &cipher::Key,
        buf: &mut [u8],
    ) -> Result<(), cipher::Error> {
        check!(
            buf.len() % cipher::BLOCK_LEN == 0,
            cipher::Error::UnalignedLength
        );
        let aes = Aes128::new(GenericArray::from_slice(key));
        for block in buf.chunks_exact_mut(cipher::BLOCK_LEN) {
            aes.decrypt_block(GenericArray::from_mut_slice(block));
        }
        Ok(())
    }
}
