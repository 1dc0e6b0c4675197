// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! Pluggable cryptograpy traits.
//!
//! `boardlock` needs a block cipher to seal frames, a hash to check the
//! integrity of persisted rosters, and a source of randomness for nonces and
//! blinding values. This module provides object-safe traits that abstract
//! over those operations, so that integrations can plug in hardware engines.
//!
//! It is recommended to not import the traits in this module directly, since
//! a lot of them have the same name. Instead, use imports like
//! `use boardlock::crypto::hash;` and partially-qualified names like
//! `hash::Engine`.
//!
//! Software implementations are provided under the [`ring` module] (hashing
//! and randomness, behind the `ring` feature flag) and the [`aes` module]
//! (the cipher, behind the `aes` feature flag).
//!
//! [`ring` module]: ring/index.html
//! [`aes` module]: aes/index.html

pub mod cipher;
pub mod csrng;
pub mod hash;

#[cfg(feature = "aes")]
pub mod aes;

#[cfg(feature = "ring")]
pub mod ring;
