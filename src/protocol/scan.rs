// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! Discovery probes.
//!
//! Discovery is deliberately unauthenticated: the controller sends the fixed
//! [`PROBE`] marker to every address, and each present peripheral answers in
//! plaintext with its identity. Replies are only ever used to count which
//! components are present, never to grant trust.

use crate::io::Cursor;
use crate::io::Read;
use crate::io::Write;
use crate::net::Identity;
use crate::protocol::wire;
use crate::protocol::wire::FromWire;
use crate::protocol::wire::ToWire;
use crate::protocol::Opcode;

/// The plaintext discovery probe.
pub const PROBE: [u8; 4] = *b"BEEF";

/// The length of a [`Reply`].
pub const REPLY_LEN: usize = 5;

/// A peripheral's answer to a [`PROBE`].
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct Reply {
    /// The identity the peripheral claims.
    pub identity: Identity,
}

impl Reply {
    /// Encodes this reply into a packet.
    pub fn encode(&self) -> [u8; REPLY_LEN] {
        let mut packet = [0; REPLY_LEN];
        // The encoding is exactly `REPLY_LEN` bytes long.
        let _ = self.to_wire(Cursor::new(&mut packet[..]));
        packet
    }
}

impl FromWire for Reply {
    fn from_wire<R: Read>(mut r: R) -> Result<Self, wire::Error> {
        if Opcode::from_wire(&mut r)? != Opcode::Scan {
            return Err(wire::Error::OutOfRange);
        }
        let identity = Identity(r.read_be()?);
        Ok(Self { identity })
    }
}

impl ToWire for Reply {
    fn to_wire<W: Write>(&self, mut w: W) -> Result<(), wire::Error> {
        Opcode::Scan.to_wire(&mut w)?;
        w.write_be(self.identity.0)?;
        Ok(())
    }
}
