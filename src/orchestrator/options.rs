// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! Provisioned configuration for a controller or a peripheral.
//!
//! Everything here is fixed when a device image is built; nothing in it
//! changes at runtime.

use arrayvec::ArrayString;
use subtle::ConstantTimeEq as _;

use crate::net::Budget;
use crate::net::Identity;
use crate::protocol::attest::Attestation;
use crate::roster::Roster;
use crate::session::ControllerSecrets;
use crate::session::PeripheralSecrets;

/// The longest boot message a component may carry.
pub const MAX_MESSAGE_LEN: usize = 64;

/// A boot message, printed when a component boots.
pub type BootMessage = ArrayString<MAX_MESSAGE_LEN>;

/// The longest a PIN or replacement token may be.
pub const MAX_CREDENTIAL_LEN: usize = 64;

/// A pre-shared operator secret, such as a PIN or replacement token.
///
/// Comparison against operator input runs in constant time for inputs of
/// the right length.
#[derive(Clone, Default)]
pub struct Credential(ArrayString<MAX_CREDENTIAL_LEN>);

impl Credential {
    /// Creates a new `Credential`, if `secret` is short enough.
    pub fn new(secret: &str) -> Option<Self> {
        ArrayString::from(secret).ok().map(Self)
    }

    /// Checks whether `input` is exactly this credential.
    pub fn matches(&self, input: &str) -> bool {
        let expected = self.0.as_bytes();
        let input = input.as_bytes();
        expected.len() == input.len() && bool::from(expected.ct_eq(input))
    }
}

impl core::fmt::Debug for Credential {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

/// A controller's provisioned configuration.
#[derive(Clone, Debug)]
pub struct ControllerConfig {
    /// The controller's part of the secret fragment set.
    pub secrets: ControllerSecrets,
    /// The PIN guarding `attest`.
    pub pin: Credential,
    /// The token guarding `replace`.
    pub token: Credential,
    /// The message printed when the board boots.
    pub boot_message: BootMessage,
    /// The roster installed on first boot.
    pub default_roster: Roster,
    /// How long to wait for a reply to an authenticated command.
    pub budget: Budget,
    /// How long to wait for each address to answer a discovery probe.
    pub scan_budget: Budget,
}

/// A peripheral's provisioned configuration.
#[derive(Clone, Debug)]
pub struct PeripheralConfig {
    /// This peripheral's identity.
    pub identity: Identity,
    /// This peripheral's part of the secret fragment set.
    pub secrets: PeripheralSecrets,
    /// The message returned to the controller on boot.
    pub boot_message: BootMessage,
    /// The metadata returned on attestation.
    pub attestation: Attestation,
    /// How long to wait for each packet from the controller.
    pub budget: Budget,
}
