// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! The post-boot mutual challenge.
//!
//! After boot, either side may send the other an arbitrary payload. Each
//! payload travels in a three-message exchange:
//! ```text
//! challenger                               responder
//!     |-- SecureValidate (z) ----------------->|
//!     |<--------------- SecureValidate (z, y) -|
//!     |-- SecureData (z, y, payload) --------->|
//! ```
//! The challenger only sends the payload once it has seen its own `z`
//! echoed, and the responder only accepts it if both `z` and its own fresh
//! `y` are echoed back.

use crate::channel::verify;
use crate::channel::Channel;
use crate::channel::Error;
use crate::channel::Exchange;
use crate::net::Identity;
use crate::net::Link;
use crate::protocol::frame::MAX_PAYLOAD_LEN;
use crate::protocol::Frame;
use crate::protocol::Opcode;
use crate::Result;

impl Channel<'_> {
    /// Delivers `payload` to the peer over `link`, as the challenger.
    ///
    /// `identity` is the peripheral the exchange is about: the peer when
    /// called by the controller, or the caller itself when called by a
    /// peripheral. Returns the number of bytes delivered.
    pub fn post_boot_exchange(
        &mut self,
        link: &mut dyn Link,
        identity: Identity,
        payload: &[u8],
    ) -> Result<usize, Error> {
        check!(payload.len() <= MAX_PAYLOAD_LEN, Error::Oversized);

        let mut exchange = self.begin(identity)?;
        self.send(link, Opcode::SecureValidate, &exchange, &[])?;

        let answer = self.receive(link)?;
        verify(&answer, Opcode::SecureValidate, &exchange)?;
        exchange.y = Some(answer.y);

        self.send(link, Opcode::SecureData, &exchange, payload)?;
        info!("delivered {} byte(s) about {}", payload.len(), identity);
        Ok(payload.len())
    }

    /// Accepts a payload from the peer over `link`, as the responder.
    ///
    /// The payload is written to the front of `out`, and its length is
    /// returned.
    pub fn post_boot_accept(
        &mut self,
        link: &mut dyn Link,
        identity: Identity,
        out: &mut [u8],
    ) -> Result<usize, Error> {
        let challenge = self.receive(link)?;
        self.accept_from(link, identity, &challenge, out)
    }

    /// Like [`Channel::post_boot_accept()`], but starting from a challenge
    /// that has already been received.
    pub fn accept_from(
        &mut self,
        link: &mut dyn Link,
        identity: Identity,
        challenge: &Frame,
        out: &mut [u8],
    ) -> Result<usize, Error> {
        check!(
            challenge.opcode == Opcode::SecureValidate,
            Error::UnexpectedOpcode(challenge.opcode)
        );
        check!(challenge.identity == identity, Error::IdentityMismatch);

        let exchange = Exchange {
            identity,
            z: challenge.z,
            y: Some(self.nonce()?),
        };
        self.send(link, Opcode::SecureValidate, &exchange, &[])?;

        let data = self.receive(link)?;
        verify(&data, Opcode::SecureData, &exchange)?;

        let payload = data.payload();
        let dest = out
            .get_mut(..payload.len())
            .ok_or_else(|| fail!(Error::Oversized))?;
        dest.copy_from_slice(payload);
        info!("accepted {} byte(s) about {}", payload.len(), identity);
        Ok(payload.len())
    }
}
