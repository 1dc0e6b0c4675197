// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! Session key agreement.
//!
//! Every power cycle, the controller and the peripherals on its roster agree
//! on a single 16-byte [`SessionKey`]. The agreement is a one-time-pad
//! combiner over secrets provisioned ahead of time, not a public-key
//! exchange; it resists passive observation of the bus, but not an active
//! adversary substituting messages.
//!
//! # Secrets
//!
//! Every principal holds the same blinding seed `S`. The controller holds its
//! share `C`; peripheral `i` holds its share `P_i` and its tag `T_i`, and the
//! controller also holds every peripheral's tag. Peripheral `i` contributes
//! `Q_i = P_i ^ T_i`, and the session key is
//! ```text
//! K = C ^ Q_1 ^ ... ^ Q_n
//! ```
//!
//! # Exchange
//!
//! The controller draws a fresh blinding value `R`. Then, for each
//! peripheral in turn:
//! 1. The controller sends a probe `R ^ S`.
//! 2. The peripheral recovers `R`, and replies with its contribution
//!    `Q_i ^ R`.
//! 3. The controller strips `R` to recover `Q_i`.
//!
//! Once every contribution is in, the controller computes `K`, and sends
//! each peripheral its complement `F_i = K ^ Q_i ^ R ^ T_i`, from which the
//! peripheral computes `K = F_i ^ R ^ T_i ^ Q_i`. Every value on the bus is
//! masked by `R`.
//!
//! The key is never confirmed explicitly: a peripheral holding the wrong key
//! cannot produce a frame that passes nonce verification, so the first
//! sealed exchange fails instead.

use core::fmt;

use arrayvec::ArrayVec;
use subtle::ConstantTimeEq as _;
use zeroize::Zeroize;
use zeroize::ZeroizeOnDrop;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::crypto::cipher;
use crate::crypto::csrng;
use crate::net;
use crate::net::Identity;
use crate::protocol::key_agreement::VALUE_LEN;

mod initiator;
mod responder;

pub use initiator::KeyAgreement;
pub use responder::Responder;

/// The largest number of peripherals that can take part in one agreement.
pub const MAX_PEERS: usize = 2;

/// The largest number of peripheral tags a controller can hold.
pub const MAX_TAGS: usize = 32;

/// A key-agreement error.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Error {
    /// Indicates that the bus failed mid-exchange.
    Transport(net::Error),
    /// Indicates that a reply was shorter than a key-agreement message.
    ShortReply,
    /// Indicates that a reply was longer than a key-agreement message.
    LengthMismatch,
    /// Indicates a well-formed message of the wrong kind.
    UnexpectedMessage,
    /// Indicates that a peer has no provisioned tag, or no usable address.
    UnknownPeer(Identity),
    /// Indicates that the agreement was asked to run with no peers, or more
    /// than [`MAX_PEERS`].
    PeerCount,
    /// Indicates that a message arrived in a state that cannot accept it,
    /// such as a complement before any probe.
    BadStateTransition,
    /// Indicates that the blinding value could not be generated.
    Entropy,
}

impl From<net::Error> for Error {
    fn from(e: net::Error) -> Self {
        Self::Transport(e)
    }
}

impl From<csrng::Error> for Error {
    fn from(_: csrng::Error) -> Self {
        Self::Entropy
    }
}

debug_from!(Error => csrng::Error);

/// A provisioned secret fragment.
#[derive(Clone, PartialEq, Eq, Default, Zeroize)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct Share(
    #[cfg_attr(
        feature = "serde",
        serde(
            deserialize_with = "crate::serde::de_hex_array",
            serialize_with = "crate::serde::se_hex_array"
        )
    )]
    pub [u8; VALUE_LEN],
);

impl fmt::Debug for Share {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("Share(<redacted>)")
    }
}

/// The secrets a controller is provisioned with.
#[derive(Clone, Debug, Default)]
pub struct ControllerSecrets {
    /// The blinding seed shared by every principal.
    pub seed: Share,
    /// The controller's own share.
    pub share: Share,
    /// The tag of every peripheral this controller may be paired with,
    /// including spares that are not on the roster yet.
    pub tags: ArrayVec<(Identity, Share), MAX_TAGS>,
}

impl ControllerSecrets {
    /// Looks up the tag provisioned for `id`.
    pub fn tag(&self, id: Identity) -> Option<&Share> {
        self.tags.iter().find(|(i, _)| *i == id).map(|(_, t)| t)
    }
}

/// The secrets a peripheral is provisioned with.
#[derive(Clone, Debug, Default)]
pub struct PeripheralSecrets {
    /// The blinding seed shared by every principal.
    pub seed: Share,
    /// This peripheral's share.
    pub share: Share,
    /// This peripheral's tag.
    pub tag: Share,
}

impl PeripheralSecrets {
    /// Returns this peripheral's contribution to the session key.
    fn contribution(&self) -> [u8; VALUE_LEN] {
        xor(&self.share.0, &self.tag.0)
    }
}

/// A session key, valid for one power cycle.
///
/// A `SessionKey` lives in volatile memory only, and is wiped when dropped.
/// Comparison runs in constant time.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SessionKey([u8; cipher::KEY_LEN]);

impl SessionKey {
    /// Creates a session key out of raw bytes.
    pub(crate) fn from_bytes(bytes: [u8; cipher::KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Returns the raw key, for use with a [`cipher::Cipher`].
    pub fn as_bytes(&self) -> &cipher::Key {
        &self.0
    }
}

impl PartialEq for SessionKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.ct_eq(&other.0).into()
    }
}

impl Eq for SessionKey {}

impl fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("SessionKey(<redacted>)")
    }
}

/// XORs two blinded values together.
fn xor(a: &[u8; VALUE_LEN], b: &[u8; VALUE_LEN]) -> [u8; VALUE_LEN] {
    let mut out = *a;
    for (o, b) in out.iter_mut().zip(b) {
        *o ^= b;
    }
    out
}
