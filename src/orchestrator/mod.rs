// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! Protocol drivers for both ends of the bus.
//!
//! A [`controller::Controller`] owns the roster and the session key, and
//! runs operator commands against the bus one at a time. A
//! [`peripheral::Peripheral`] answers whatever the controller sends it.
//!
//! Every command ends in exactly one terminal status line on the operator's
//! [`console::Console`]. Failures abort the command in progress, never the
//! process: the controller simply waits for the next command.

use core::fmt;

use crate::channel;
use crate::net;
use crate::net::Identity;
use crate::roster;
use crate::session;

pub mod console;
pub mod controller;
pub mod options;
pub mod peripheral;

#[cfg(test)]
mod scenarios;

/// An orchestration error.
///
/// Each variant's [`Display`](fmt::Display) is the message shown to the
/// operator.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Error {
    /// Indicates that the bus failed outside of any secure exchange.
    Transport(net::Error),
    /// Indicates that key agreement failed, so authenticated commands are
    /// unavailable.
    KeyAgreement(session::Error),
    /// Indicates that the attached peripherals do not match the roster.
    PrebootMismatch,
    /// Indicates that discovery found a different number of peripherals
    /// than the roster holds.
    CountMismatch {
        /// How many peripherals answered.
        found: usize,
        /// How many the roster holds.
        expected: usize,
    },
    /// Indicates that an exchange with a specific peripheral failed.
    Component {
        /// The peripheral in question.
        id: Identity,
        /// What went wrong.
        error: channel::Error,
    },
    /// Indicates that a secure exchange failed.
    Channel(channel::Error),
    /// Indicates a reply whose payload could not be parsed.
    MalformedReply(Identity),
    /// Indicates that the roster could not be changed or persisted.
    Roster(roster::Error),
    /// Indicates an identity that is not on the roster.
    NotProvisioned(Identity),
    /// Indicates a wrong PIN.
    BadPin,
    /// Indicates a wrong replacement token.
    BadToken,
    /// Indicates operator input that could not be parsed.
    BadInput,
    /// Indicates a command that the controller does not know.
    UnknownCommand,
    /// Indicates a command that is not available once booted.
    AlreadyBooted,
    /// Indicates a post-boot operation before boot.
    NotBooted,
    /// Indicates an authenticated operation with no session key.
    NoSessionKey,
}

impl From<channel::Error> for Error {
    fn from(e: channel::Error) -> Self {
        Self::Channel(e)
    }
}

impl From<roster::Error> for Error {
    fn from(e: roster::Error) -> Self {
        Self::Roster(e)
    }
}

impl From<session::Error> for Error {
    fn from(e: session::Error) -> Self {
        Self::KeyAgreement(e)
    }
}

impl From<net::Error> for Error {
    fn from(e: net::Error) -> Self {
        Self::Transport(e)
    }
}

debug_from!(Error => channel::Error, roster::Error, session::Error, net::Error);

/// Describes a failed exchange with a component.
fn describe(error: &channel::Error) -> &'static str {
    use channel::Error as E;
    match error {
        E::NonceMismatch => "Random number provided is invalid",
        E::IdentityMismatch => "Component ID invalid",
        E::UnexpectedOpcode(_) | E::UnknownOpcode(_) => {
            "Invalid command message from component"
        }
        E::Timeout => "Component did not respond",
        E::Decrypt | E::MalformedFrame => "Could not decode component reply",
        E::Oversized => "Message too large",
        E::Transport(_) | E::Entropy => "Could not reach component",
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Transport(e) => write!(f, "Bus failure: {:?}", e),
            Self::KeyAgreement(_) | Self::NoSessionKey => {
                f.write_str("Synthesize the keys first")
            }
            Self::PrebootMismatch => f.write_str("Component id doesn't match"),
            Self::CountMismatch { found, expected } => {
                write!(f, "Found {} of {} components", found, expected)
            }
            Self::Component { id, error } => {
                write!(f, "Could not validate component {}: {}", id, describe(error))
            }
            Self::Channel(e) => f.write_str(describe(e)),
            Self::MalformedReply(id) => {
                write!(f, "Malformed reply from component {}", id)
            }
            Self::Roster(roster::Error::Duplicate(id)) => {
                write!(f, "Component {} is already provisioned", id)
            }
            Self::Roster(roster::Error::Unaddressable(id)) => {
                write!(f, "Component {} has no usable bus address", id)
            }
            Self::Roster(roster::Error::NotFound(id)) | Self::NotProvisioned(id) => {
                write!(f, "Component {} is not provisioned for the system", id)
            }
            Self::Roster(_) => f.write_str("Could not persist the roster"),
            Self::BadPin => f.write_str("Invalid PIN!"),
            Self::BadToken => f.write_str("Invalid Token!"),
            Self::BadInput => f.write_str("Invalid component ID"),
            Self::UnknownCommand => f.write_str("Unrecognized command"),
            Self::AlreadyBooted => f.write_str("Already booted"),
            Self::NotBooted => f.write_str("Not booted yet"),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn messages() {
        let id = Identity(0x11111125);
        assert_eq!(
            Error::NotProvisioned(id).to_string(),
            "Component 0x11111125 is not provisioned for the system"
        );
        assert_eq!(
            Error::Component {
                id,
                error: channel::Error::NonceMismatch
            }
            .to_string(),
            "Could not validate component 0x11111125: Random number provided is invalid"
        );
        assert_eq!(
            Error::KeyAgreement(session::Error::ShortReply).to_string(),
            "Synthesize the keys first"
        );
        assert_eq!(Error::BadPin.to_string(), "Invalid PIN!");
    }
}
