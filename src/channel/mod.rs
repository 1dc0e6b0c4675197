// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! The secure channel.
//!
//! A [`Channel`] turns a [`SessionKey`] and a plaintext [`Frame`] into a
//! sealed packet, and back. Sealing gives confidentiality only; freshness
//! comes from nonce discipline, which is the sole replay defense:
//! - The challenger of an exchange draws a fresh `Z` and puts it in its
//!   request. It rejects any reply that does not echo that exact `Z`.
//! - Where the responder must also be sure of freshness, it draws a fresh
//!   `Y`, and rejects any follow-up that does not echo both nonces.
//!
//! A nonce is scoped to one exchange. Nothing is remembered between
//! exchanges, so a failed exchange is simply abandoned; the caller decides
//! whether to start another.
//!
//! Simple exchanges are a [`Channel::request()`] answered by a
//! [`Channel::reply()`]. The three-message post-boot handshake is
//! [`Channel::post_boot_exchange()`] answered by
//! [`Channel::post_boot_accept()`].

use zeroize::Zeroize as _;
use zeroize::Zeroizing;

use crate::crypto::cipher::Cipher;
use crate::crypto::csrng;
use crate::crypto::csrng::Csrng;
use crate::io::Cursor;
use crate::net;
use crate::net::Budget;
use crate::net::Identity;
use crate::net::Link;
use crate::protocol::frame::MAX_PAYLOAD_LEN;
use crate::protocol::wire::FromWire as _;
use crate::protocol::wire::ToWire as _;
use crate::protocol::wire::WireEnum as _;
use crate::protocol::Frame;
use crate::protocol::Nonce;
use crate::protocol::Opcode;
use crate::protocol::FRAME_LEN;
use crate::session::SessionKey;
use crate::Result;

mod post_boot;

/// A secure-channel error.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Error {
    /// Indicates that nothing arrived within the polling budget.
    Timeout,
    /// Indicates any other bus failure.
    Transport(net::Error),
    /// Indicates that the cipher failed to process a frame.
    Decrypt,
    /// Indicates that an echoed nonce did not match the verifier's own.
    NonceMismatch,
    /// Indicates a packet that is not a well-formed sealed frame.
    MalformedFrame,
    /// Indicates a frame whose opcode byte names no known opcode.
    UnknownOpcode(u8),
    /// Indicates a well-formed frame carrying the wrong opcode for this
    /// point of the exchange.
    UnexpectedOpcode(Opcode),
    /// Indicates a frame about a different peripheral than expected.
    IdentityMismatch,
    /// Indicates a payload too large for a frame, or for the caller's
    /// buffer.
    Oversized,
    /// Indicates that a nonce could not be generated.
    Entropy,
}

impl From<net::Error> for Error {
    fn from(e: net::Error) -> Self {
        match e {
            net::Error::Timeout => Self::Timeout,
            net::Error::Short => Self::MalformedFrame,
            e => Self::Transport(e),
        }
    }
}

impl From<csrng::Error> for Error {
    fn from(_: csrng::Error) -> Self {
        Self::Entropy
    }
}

debug_from!(Error => csrng::Error);

/// An in-progress exchange: which peripheral it is about, and the nonces
/// issued so far.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct Exchange {
    /// The peripheral this exchange is about.
    pub identity: Identity,
    /// The challenger's nonce.
    pub z: Nonce,
    /// The responder's nonce, once there is one.
    pub y: Option<Nonce>,
}

/// A sealed, nonce-checked view of a [`Link`].
///
/// A `Channel` is cheap to create, and borrows everything it needs; it is
/// typically created once per command.
pub struct Channel<'a> {
    key: &'a SessionKey,
    cipher: &'a mut dyn Cipher,
    rng: &'a mut dyn Csrng,
    budget: Budget,
}

impl<'a> Channel<'a> {
    /// Creates a new `Channel`.
    pub fn new(
        key: &'a SessionKey,
        cipher: &'a mut dyn Cipher,
        rng: &'a mut dyn Csrng,
        budget: Budget,
    ) -> Self {
        Self {
            key,
            cipher,
            rng,
            budget,
        }
    }

    /// Starts a new exchange about `identity`, with a fresh `Z`.
    pub fn begin(&mut self, identity: Identity) -> Result<Exchange, Error> {
        Ok(Exchange {
            identity,
            z: self.nonce()?,
            y: None,
        })
    }

    /// Draws a fresh nonce.
    pub fn nonce(&mut self) -> Result<Nonce, Error> {
        let mut nonce = Nonce::ZERO;
        self.rng.fill(&mut nonce.0)?;
        Ok(nonce)
    }

    /// Seals a frame for `exchange` and sends it over `link`.
    pub fn send(
        &mut self,
        link: &mut dyn Link,
        opcode: Opcode,
        exchange: &Exchange,
        payload: &[u8],
    ) -> Result<(), Error> {
        let frame = Frame::new(
            opcode,
            exchange.identity,
            exchange.z,
            exchange.y.unwrap_or(Nonce::ZERO),
            payload,
        )
        .ok_or_else(|| fail!(Error::Oversized))?;
        trace!(
            "sending {} about {}, z = {:?}",
            opcode,
            exchange.identity,
            exchange.z
        );

        let packet = self.seal(&frame)?;
        link.send(&packet[..]).map_err(|e| fail!(Error::from(e)))
    }

    /// Receives a sealed frame from `link` and opens it.
    ///
    /// No nonce checking happens here; that is up to the caller, who knows
    /// which exchange the frame belongs to.
    pub fn receive(&mut self, link: &mut dyn Link) -> Result<Frame, Error> {
        let mut packet = Zeroizing::new([0; FRAME_LEN]);
        let len = link
            .receive(self.budget, &mut packet[..])
            .map_err(|e| fail!(Error::from(e)))?;
        self.open(&mut packet[..len])
    }

    /// Sends a request with a fresh `Z` and waits for its reply.
    ///
    /// The reply must echo `Z`, carry the `expected` opcode and be about the
    /// same peripheral; otherwise, the exchange fails and the reply is
    /// discarded.
    pub fn request(
        &mut self,
        link: &mut dyn Link,
        opcode: Opcode,
        identity: Identity,
        payload: &[u8],
        expected: Opcode,
    ) -> Result<Frame, Error> {
        let exchange = self.begin(identity)?;
        self.send(link, opcode, &exchange, payload)?;
        let reply = self.receive(link)?;
        verify(&reply, expected, &exchange)?;
        Ok(reply)
    }

    /// Replies to `request`, echoing its `Z`.
    pub fn reply(
        &mut self,
        link: &mut dyn Link,
        request: &Frame,
        opcode: Opcode,
        payload: &[u8],
    ) -> Result<(), Error> {
        let exchange = Exchange {
            identity: request.identity,
            z: request.z,
            y: None,
        };
        self.send(link, opcode, &exchange, payload)
    }

    /// Opens a sealed packet received out-of-band, in place.
    ///
    /// `packet` is wiped once it has been parsed.
    pub fn open(&mut self, packet: &mut [u8]) -> Result<Frame, Error> {
        check!(packet.len() == FRAME_LEN, Error::MalformedFrame);
        self.cipher
            .decrypt(self.key.as_bytes(), packet)
            .map_err(|_| fail!(Error::Decrypt))?;

        let tag = packet[0];
        let parsed = if Opcode::from_wire_value(tag).is_none() {
            Err(fail!(Error::UnknownOpcode(tag)))
        } else {
            Frame::from_wire(&packet[..]).map_err(|_| fail!(Error::MalformedFrame))
        };
        packet.zeroize();
        parsed
    }

    fn seal(
        &mut self,
        frame: &Frame,
    ) -> Result<Zeroizing<[u8; FRAME_LEN]>, Error> {
        let mut packet = Zeroizing::new([0; FRAME_LEN]);
        let mut cursor = Cursor::new(&mut packet[..]);
        frame
            .to_wire(&mut cursor)
            .map_err(|_| fail!(Error::MalformedFrame))?;
        self.cipher
            .encrypt(self.key.as_bytes(), &mut packet[..])
            .map_err(|_| fail!(Error::Decrypt))?;
        Ok(packet)
    }
}

/// Checks that `frame` is a valid next step of `exchange`.
///
/// Nonces are checked first: a frame that fails them is not trusted for
/// anything else.
fn verify(
    frame: &Frame,
    expected: Opcode,
    exchange: &Exchange,
) -> Result<(), Error> {
    if !frame.z.matches(&exchange.z) {
        trace!("expected z = {:?}, got {:?}", exchange.z, frame.z);
        return Err(fail!(Error::NonceMismatch));
    }
    if let Some(y) = &exchange.y {
        if !frame.y.matches(y) {
            trace!("expected y = {:?}, got {:?}", y, frame.y);
            return Err(fail!(Error::NonceMismatch));
        }
    }
    check!(
        frame.opcode == expected,
        Error::UnexpectedOpcode(frame.opcode)
    );
    check!(frame.identity == exchange.identity, Error::IdentityMismatch);
    Ok(())
}
