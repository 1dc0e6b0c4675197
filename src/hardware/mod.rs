// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! Pluggable hardware functionality
//!
//! This module provides traits for plugging in platform-specific services:
//! non-volatile storage for the roster, and the hand-off to the application
//! once a board has been allowed to boot.

pub mod flash;

/// The platform's boot hand-off.
pub trait Boot {
    /// Hands control to the application.
    ///
    /// This is called at most once per power cycle, after every component
    /// has been validated. On real hardware it usually does not return; in
    /// a host build it returns and post-boot traffic continues.
    fn boot(&mut self);
}
impl dyn Boot {} // Ensure object-safe.

impl<B: Boot + ?Sized> Boot for &mut B {
    fn boot(&mut self) {
        B::boot(*self)
    }
}

/// A `Boot` hook that does nothing.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoBoot;

impl Boot for NoBoot {
    fn boot(&mut self) {}
}
