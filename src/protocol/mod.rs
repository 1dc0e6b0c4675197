// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! Bus protocol messages.
//!
//! Three kinds of packets travel over the bus, and a receiver tells them
//! apart purely by length:
//! - A *sealed frame* of exactly [`FRAME_LEN`] bytes: a [`frame::Frame`]
//!   encrypted as a unit under the session key. Every authenticated command
//!   and reply is a sealed frame.
//! - A *key-agreement message* of exactly [`key_agreement::MESSAGE_LEN`]
//!   bytes, exchanged once per power cycle, before a session key exists.
//! - A *scan probe* (the fixed [`scan::PROBE`] marker) and its plaintext
//!   reply, used only to count which components are present.
//!
//! Inside a sealed frame, the [`Opcode`] selects the command. Opcodes are
//! decoded exactly once, when the frame is parsed; a byte that does not name
//! an opcode is reported as a distinct error rather than falling through.

use core::fmt;

use subtle::ConstantTimeEq as _;

#[macro_use]
pub mod wire;

pub mod attest;
pub mod frame;
pub mod key_agreement;
pub mod scan;

pub use frame::Frame;

/// The length of a sealed frame, in bytes.
pub const FRAME_LEN: usize = 256;

/// The length of a nonce, in bytes.
pub const NONCE_LEN: usize = 8;

wire_enum! {
    /// A command carried in a [`Frame`].
    pub enum Opcode: u8 {
        /// A presence probe. Only ever sent in plaintext, in a scan reply.
        Scan = 0x01,
        /// A request for a peripheral to prove its identity before boot.
        Validate = 0x02,
        /// A peripheral's reply to [`Opcode::Validate`], carrying its boot
        /// message.
        Boot = 0x03,
        /// A request for attestation metadata, and its reply.
        Attest = 0x04,
        /// The challenge and answer messages of a post-boot exchange.
        SecureValidate = 0x05,
        /// The payload message of a post-boot exchange.
        SecureData = 0x06,
    }
}

/// A single-use random value binding a request to its response.
///
/// A `Nonce` is scoped to exactly one exchange: the challenger's nonce is
/// usually called `Z`, and the responder's `Y`. Comparison through
/// [`Nonce::matches()`] runs in constant time.
#[derive(Copy, Clone, Default, PartialEq, Eq)]
pub struct Nonce(pub [u8; NONCE_LEN]);

impl Nonce {
    /// The all-zero nonce, used in frames that do not carry a `Y` yet.
    pub const ZERO: Self = Self([0; NONCE_LEN]);

    /// Returns whether `self` is the same nonce as `other`, in constant time.
    pub fn matches(&self, other: &Nonce) -> bool {
        self.0.ct_eq(&other.0).into()
    }

    /// Returns the nonce as a big-endian integer, for logging.
    pub fn as_u64(&self) -> u64 {
        u64::from_be_bytes(self.0)
    }
}

impl From<u64> for Nonce {
    fn from(x: u64) -> Self {
        Self(x.to_be_bytes())
    }
}

impl fmt::Debug for Nonce {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Nonce({:016x})", self.as_u64())
    }
}

/// What a received packet is, judging only by its shape.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Packet {
    /// A sealed [`Frame`].
    Sealed,
    /// A [`key_agreement::Message`].
    KeyAgreement,
    /// A discovery [`scan::PROBE`].
    ScanProbe,
    /// Anything else.
    Malformed,
}

impl Packet {
    /// Classifies `packet`.
    pub fn classify(packet: &[u8]) -> Self {
        match packet.len() {
            FRAME_LEN => Self::Sealed,
            key_agreement::MESSAGE_LEN => Self::KeyAgreement,
            _ if packet == scan::PROBE => Self::ScanProbe,
            _ => Self::Malformed,
        }
    }
}
