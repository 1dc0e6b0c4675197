// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! Key-agreement messages.
//!
//! Key agreement runs before a session key exists, so its messages travel
//! unsealed. Every message is exactly [`MESSAGE_LEN`] bytes: a one-byte
//! [`Kind`] followed by a 16-byte value that is always blinded by the
//! agreement's random blinding value.

use crate::io::Cursor;
use crate::io::Read;
use crate::io::Write;
use crate::protocol::wire;
use crate::protocol::wire::FromWire;
use crate::protocol::wire::ToWire;

/// The length of a blinded value.
pub const VALUE_LEN: usize = 16;

/// The length of a key-agreement message.
pub const MESSAGE_LEN: usize = 1 + VALUE_LEN;

wire_enum! {
    /// The step of the agreement a [`Message`] belongs to.
    pub enum Kind: u8 {
        /// Controller to peripheral: the blinding value, masked by the
        /// shared seed.
        Probe = 0xa1,
        /// Peripheral to controller: the peripheral's contribution, masked
        /// by the blinding value.
        Contribution = 0xa2,
        /// Controller to peripheral: the material the peripheral needs to
        /// finish the key, masked by the blinding value.
        Complement = 0xa3,
    }
}

/// A key-agreement message.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct Message {
    /// Which step this message belongs to.
    pub kind: Kind,
    /// The blinded value.
    pub value: [u8; VALUE_LEN],
}

impl Message {
    /// Parses a `Message` out of a whole packet.
    ///
    /// Fails if the packet is not exactly [`MESSAGE_LEN`] bytes long.
    pub fn parse(packet: &[u8]) -> Result<Self, wire::Error> {
        if packet.len() != MESSAGE_LEN {
            return Err(wire::Error::OutOfRange);
        }
        Self::from_wire(packet)
    }

    /// Encodes this message into a packet.
    pub fn encode(&self) -> [u8; MESSAGE_LEN] {
        let mut packet = [0; MESSAGE_LEN];
        // The encoding is exactly `MESSAGE_LEN` bytes long.
        let _ = self.to_wire(Cursor::new(&mut packet[..]));
        packet
    }
}

impl FromWire for Message {
    fn from_wire<R: Read>(mut r: R) -> Result<Self, wire::Error> {
        let kind = Kind::from_wire(&mut r)?;
        let mut value = [0; VALUE_LEN];
        r.read_bytes(&mut value)?;
        Ok(Self { kind, value })
    }
}

impl ToWire for Message {
    fn to_wire<W: Write>(&self, mut w: W) -> Result<(), wire::Error> {
        self.kind.to_wire(&mut w)?;
        w.write_bytes(&self.value)?;
        Ok(())
    }
}
