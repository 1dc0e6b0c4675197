// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! Bus traits.

use crate::net::Address;
use crate::net::Budget;
use crate::net::Error;

/// The controller's view of the bus.
///
/// A `Bus` can transmit a packet to any address, and poll any address for a
/// packet. Transmission does not wait for the peer to read the packet.
///
/// No operation is re-entrant: a caller must not begin a second transaction
/// on an address before the first completes or times out.
pub trait Bus {
    /// Transmits `data` to the component at `addr`.
    fn send(&mut self, addr: Address, data: &[u8]) -> Result<(), Error>;

    /// Polls `addr` for a packet, for at most `budget`.
    ///
    /// On success, the packet is written to the front of `out` and its length
    /// is returned.
    fn receive(
        &mut self,
        addr: Address,
        budget: Budget,
        out: &mut [u8],
    ) -> Result<usize, Error>;
}
impl dyn Bus {} // Ensure object-safe.

/// A point-to-point view of the bus.
///
/// A peripheral's port to the controller is a `Link`; so is the controller's
/// view of one address, through [`Addressed`].
pub trait Link {
    /// Transmits `data` to the peer.
    fn send(&mut self, data: &[u8]) -> Result<(), Error>;

    /// Polls for a packet from the peer, for at most `budget`.
    ///
    /// On success, the packet is written to the front of `out` and its length
    /// is returned.
    fn receive(
        &mut self,
        budget: Budget,
        out: &mut [u8],
    ) -> Result<usize, Error>;
}
impl dyn Link {} // Ensure object-safe.

impl<L: Link + ?Sized> Link for &mut L {
    #[inline]
    fn send(&mut self, data: &[u8]) -> Result<(), Error> {
        L::send(*self, data)
    }

    #[inline]
    fn receive(
        &mut self,
        budget: Budget,
        out: &mut [u8],
    ) -> Result<usize, Error> {
        L::receive(*self, budget, out)
    }
}

/// A [`Link`] to one address on a [`Bus`].
pub struct Addressed<'a> {
    bus: &'a mut dyn Bus,
    addr: Address,
}

impl<'a> Addressed<'a> {
    /// Creates a new `Addressed` for talking to `addr`.
    pub fn new(bus: &'a mut dyn Bus, addr: Address) -> Self {
        Self { bus, addr }
    }

    /// Returns the address this link talks to.
    pub fn address(&self) -> Address {
        self.addr
    }
}

impl Link for Addressed<'_> {
    fn send(&mut self, data: &[u8]) -> Result<(), Error> {
        self.bus.send(self.addr, data)
    }

    fn receive(
        &mut self,
        budget: Budget,
        out: &mut [u8],
    ) -> Result<usize, Error> {
        self.bus.receive(self.addr, budget, out)
    }
}
