// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! Networking interfaces.
//!
//! This module provides generic, abstract interfaces for moving buffers over
//! the shared bus. The controller sees the bus as a [`Bus`], addressed by
//! 7-bit [`Address`]; a peripheral only ever talks to the controller, and
//! sees its side of the bus as a [`Link`].
//!
//! The bus is half-duplex and polled: a receive waits for at most a
//! [`Budget`] of polls and then fails with [`Error::Timeout`]. The budget is
//! the only cancellation mechanism.

use core::convert::TryFrom;
use core::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

mod link;
pub use link::*;

#[cfg(any(test, feature = "std"))]
pub mod sim;

/// A networking error.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Error {
    /// Indicates that no device is present at the requested address.
    NoDevice,
    /// Indicates that the bus could not accept another transmission yet.
    Busy,
    /// Indicates an attempt to use a reserved address.
    Reserved,
    /// Indicates that a packet did not fit in the provided buffer, or was
    /// too large to transmit.
    Short,
    /// Indicates that nothing arrived within the polling budget.
    Timeout,
    /// Indicates that the other end of the bus has gone away for good.
    Disconnected,
}

/// Bus addresses that are never assigned to a component.
pub const RESERVED_ADDRESSES: [u8; 3] = [0x18, 0x28, 0x36];

/// The first address probed during discovery.
pub const MIN_ADDRESS: u8 = 0x08;

/// One past the last address probed during discovery.
pub const MAX_ADDRESS: u8 = 0x78;

/// A usable 7-bit bus address.
///
/// An `Address` is always within the discovery range and never one of the
/// [`RESERVED_ADDRESSES`].
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address(u8);

impl Address {
    /// Creates a new `Address`, if `raw` is usable.
    pub fn new(raw: u8) -> Option<Self> {
        if !(MIN_ADDRESS..MAX_ADDRESS).contains(&raw)
            || RESERVED_ADDRESSES.contains(&raw)
        {
            return None;
        }
        Some(Self(raw))
    }

    /// Returns every usable address, in increasing order.
    pub fn all() -> impl Iterator<Item = Address> {
        (MIN_ADDRESS..MAX_ADDRESS).filter_map(Address::new)
    }

    /// Returns the raw 7-bit address.
    pub fn get(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for Address {
    type Error = Error;

    fn try_from(raw: u8) -> Result<Self, Error> {
        Self::new(raw).ok_or(Error::Reserved)
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Address(0x{:02x})", self.0)
    }
}

/// The identity of a component, unique within a deployment.
///
/// An identity determines the component's bus address: the address is the
/// low byte of the identity. Identities whose low byte is not a usable
/// [`Address`] cannot be provisioned.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct Identity(
    #[cfg_attr(
        feature = "serde",
        serde(
            deserialize_with = "crate::serde::de_radix",
            serialize_with = "crate::serde::se_hex"
        )
    )]
    pub u32,
);

impl Identity {
    /// Returns the bus address this identity maps to, if it is usable.
    pub fn address(self) -> Option<Address> {
        Address::new((self.0 & 0xff) as u8)
    }

    /// Parses an identity from operator input, in hex, with or without a
    /// leading `0x`.
    pub fn parse_hex(s: &str) -> Option<Self> {
        let s = s.trim();
        let digits = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .unwrap_or(s);
        u32::from_str_radix(digits, 16).ok().map(Self)
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Identity(0x{:08x})", self.0)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

/// How long a receive may wait before reporting [`Error::Timeout`].
///
/// The budget is a number of polls rather than a wall-clock duration; how
/// long each poll takes is up to the [`Bus`] or [`Link`] implementation, so
/// callers must treat the bound as approximate.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Budget {
    /// The maximum number of polls.
    pub polls: u32,
}

impl Budget {
    /// Creates a new `Budget` of `polls` polls.
    pub const fn new(polls: u32) -> Self {
        Self { polls }
    }
}

impl Default for Budget {
    fn default() -> Self {
        Self::new(2000)
    }
}
