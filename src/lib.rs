// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! `boardlock` authenticates the components attached to a board and gives
//! them a confidential, replay-resistant command channel.
//!
//! A single *controller* shares a half-duplex, addressable bus with a small
//! number of *peripherals* (at most two take part in key agreement). Before
//! the board is allowed to boot, the controller confirms that every attached
//! peripheral is on its persisted [roster], and every command after that is
//! carried in an encrypted, nonce-stamped [frame].
//!
//! The crate is layered bottom-up:
//! - [`net`] abstracts over the bus, and provides a simulated bus for tests
//!   and tools.
//! - [`crypto`] abstracts over the cipher, hash and entropy primitives, with
//!   software implementations based on `aes` and `ring`.
//! - [`session`] implements the XOR-combiner key agreement that produces the
//!   session key for one power cycle.
//! - [`channel`] frames, encrypts and nonce-checks every message, and
//!   implements the post-boot mutual challenge.
//! - [`orchestrator`] drives the whole protocol, as either the controller
//!   or a peripheral.
//!
//! Like [`net`], platform services such as flash storage and the boot hand-off
//! are pluggable; see the [`hardware`] module.
//!
//! [roster]: roster/index.html
//! [frame]: protocol/frame/index.html

#![cfg_attr(not(any(test, feature = "std")), no_std)]
#![deny(missing_docs)]
#![deny(unsafe_code)]

#[macro_use]
mod debug;
pub use debug::Error;

/// A `boardlock` result, which wraps a [`boardlock::Error`](Error).
pub type Result<T, E> = core::result::Result<T, Error<E>>;

#[macro_use]
pub mod protocol;

pub mod channel;
pub mod crypto;
pub mod hardware;
pub mod io;
pub mod net;
pub mod orchestrator;
pub mod roster;
pub mod session;

#[cfg(feature = "serde")]
mod serde;
