// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! The plaintext layout of a sealed frame.
//!
//! A frame is always exactly [`FRAME_LEN`] bytes long:
//! ```text
//! opcode (1) || identity (4) || z (8) || y (8) || len (1) || payload (len)
//!            || zero padding
//! ```
//! `identity` is always the identity of the *peripheral* the exchange is
//! about, whichever side sends the frame. `len` may not exceed
//! [`MAX_PAYLOAD_LEN`].

use arrayvec::ArrayVec;

use crate::io::Read;
use crate::io::Write;
use crate::net::Identity;
use crate::protocol::wire;
use crate::protocol::wire::FromWire;
use crate::protocol::wire::ToWire;
use crate::protocol::Nonce;
use crate::protocol::Opcode;
use crate::protocol::FRAME_LEN;
use crate::protocol::NONCE_LEN;

/// The length of the fixed fields at the start of a frame.
pub const HEADER_LEN: usize = 1 + 4 + NONCE_LEN + NONCE_LEN + 1;

/// The largest payload a frame can carry.
pub const MAX_PAYLOAD_LEN: usize = FRAME_LEN - HEADER_LEN;

/// A decoded frame.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Frame {
    /// The command this frame carries.
    pub opcode: Opcode,
    /// The peripheral this exchange is about.
    pub identity: Identity,
    /// The challenger's nonce.
    pub z: Nonce,
    /// The responder's nonce, or [`Nonce::ZERO`] if there is none yet.
    pub y: Nonce,
    payload: ArrayVec<u8, MAX_PAYLOAD_LEN>,
}

impl Frame {
    /// Creates a new `Frame`.
    ///
    /// Returns `None` if `payload` is longer than [`MAX_PAYLOAD_LEN`].
    pub fn new(
        opcode: Opcode,
        identity: Identity,
        z: Nonce,
        y: Nonce,
        payload: &[u8],
    ) -> Option<Self> {
        let mut buf = ArrayVec::new();
        buf.try_extend_from_slice(payload).ok()?;
        Some(Self {
            opcode,
            identity,
            z,
            y,
            payload: buf,
        })
    }

    /// Returns this frame's payload.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }
}

impl FromWire for Frame {
    fn from_wire<R: Read>(mut r: R) -> Result<Self, wire::Error> {
        let opcode = Opcode::from_wire(&mut r)?;
        let identity = Identity(r.read_be()?);
        let mut z = Nonce::ZERO;
        r.read_bytes(&mut z.0)?;
        let mut y = Nonce::ZERO;
        r.read_bytes(&mut y.0)?;

        let len = r.read_be::<u8>()? as usize;
        if len > MAX_PAYLOAD_LEN {
            return Err(wire::Error::OutOfRange);
        }
        let mut payload = ArrayVec::new();
        for _ in 0..len {
            payload.push(r.read_be::<u8>()?);
        }

        Ok(Self {
            opcode,
            identity,
            z,
            y,
            payload,
        })
    }
}

impl ToWire for Frame {
    fn to_wire<W: Write>(&self, mut w: W) -> Result<(), wire::Error> {
        self.opcode.to_wire(&mut w)?;
        w.write_be(self.identity.0)?;
        w.write_bytes(&self.z.0)?;
        w.write_bytes(&self.y.0)?;
        w.write_be(self.payload.len() as u8)?;
        w.write_bytes(&self.payload)?;

        let padding = [0; MAX_PAYLOAD_LEN];
        w.write_bytes(&padding[self.payload.len()..])?;
        Ok(())
    }
}
