// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! The controller side of key agreement.

use arrayvec::ArrayVec;
use zeroize::Zeroize as _;
use zeroize::Zeroizing;

use crate::crypto::csrng::Csrng;
use crate::net::Address;
use crate::net::Budget;
use crate::net::Bus;
use crate::net::Identity;
use crate::protocol::key_agreement::Kind;
use crate::protocol::key_agreement::Message;
use crate::protocol::key_agreement::MESSAGE_LEN;
use crate::protocol::key_agreement::VALUE_LEN;
use crate::session::xor;
use crate::session::ControllerSecrets;
use crate::session::Error;
use crate::session::Share;
use crate::session::SessionKey;
use crate::session::MAX_PEERS;
use crate::Result;

/// A controller's key-agreement engine.
///
/// A `KeyAgreement` remembers the key it derived, so that asking for a key a
/// second time within the same power cycle does not touch the bus.
#[derive(Default)]
pub struct KeyAgreement {
    key: Option<SessionKey>,
}

impl KeyAgreement {
    /// Creates a new `KeyAgreement`, with no key.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current session key, if one has been derived.
    pub fn key(&self) -> Option<&SessionKey> {
        self.key.as_ref()
    }

    /// Forgets the current session key, so that the next call to
    /// [`KeyAgreement::derive_session_key()`] runs a fresh agreement.
    pub fn clear(&mut self) {
        if self.key.take().is_some() {
            info!("session key cleared");
        }
    }

    /// Derives a session key shared with every peer in `peers`.
    ///
    /// If a key has already been derived, it is returned as-is, and the bus
    /// is not touched. Otherwise, this runs the full agreement with every
    /// peer in order; on failure, no key is kept, and the whole agreement
    /// must be retried.
    pub fn derive_session_key(
        &mut self,
        bus: &mut dyn Bus,
        peers: &[Identity],
        secrets: &ControllerSecrets,
        rng: &mut dyn Csrng,
        budget: Budget,
    ) -> Result<&SessionKey, Error> {
        if self.key.is_none() {
            let key = agree(bus, peers, secrets, rng, budget)?;
            info!("session key established with {} peer(s)", peers.len());
            self.key = Some(key);
        }

        self.key.as_ref().ok_or_else(|| fail!(Error::BadStateTransition))
    }
}

struct Peer<'a> {
    identity: Identity,
    addr: Address,
    tag: &'a Share,
    contribution: Zeroizing<[u8; VALUE_LEN]>,
}

fn agree(
    bus: &mut dyn Bus,
    peers: &[Identity],
    secrets: &ControllerSecrets,
    rng: &mut dyn Csrng,
    budget: Budget,
) -> Result<SessionKey, Error> {
    check!(
        !peers.is_empty() && peers.len() <= MAX_PEERS,
        Error::PeerCount
    );

    // Resolve every peer before putting anything on the bus.
    let mut resolved = ArrayVec::<Peer, MAX_PEERS>::new();
    for &identity in peers {
        let addr = identity
            .address()
            .ok_or_else(|| fail!(Error::UnknownPeer(identity)))?;
        let tag = secrets
            .tag(identity)
            .ok_or_else(|| fail!(Error::UnknownPeer(identity)))?;
        resolved.push(Peer {
            identity,
            addr,
            tag,
            contribution: Zeroizing::new([0; VALUE_LEN]),
        });
    }

    let mut r = Zeroizing::new([0; VALUE_LEN]);
    rng.fill(&mut r[..])?;

    let probe = Message {
        kind: Kind::Probe,
        value: xor(&r, &secrets.seed.0),
    };
    for peer in &mut resolved {
        trace!("probing {}", peer.identity);
        send(bus, peer.addr, &probe)?;
        let mut reply = receive(bus, peer.addr, budget)?;
        check!(reply.kind == Kind::Contribution, Error::UnexpectedMessage);
        *peer.contribution = xor(&reply.value, &r);
        reply.value.zeroize();
    }

    let mut key = Zeroizing::new(secrets.share.0);
    for peer in &resolved {
        *key = xor(&key, &peer.contribution);
    }

    for peer in &resolved {
        // The peer already knows its own contribution, so it is stripped
        // back out of its complement.
        let mut complement = Message {
            kind: Kind::Complement,
            value: xor(&xor(&key, &peer.contribution), &xor(&r, &peer.tag.0)),
        };
        let sent = send(bus, peer.addr, &complement);
        complement.value.zeroize();
        sent?;
    }

    Ok(SessionKey::from_bytes(*key))
}

fn send(bus: &mut dyn Bus, addr: Address, msg: &Message) -> Result<(), Error> {
    let mut packet = msg.encode();
    let sent = bus.send(addr, &packet);
    packet.zeroize();
    sent.map_err(|e| fail!(Error::from(e)))
}

fn receive(
    bus: &mut dyn Bus,
    addr: Address,
    budget: Budget,
) -> Result<Message, Error> {
    use crate::net::Error as NetError;

    let mut packet = Zeroizing::new([0; MESSAGE_LEN]);
    let len = bus.receive(addr, budget, &mut packet[..]).map_err(|e| {
        fail!(match e {
            NetError::Short => Error::LengthMismatch,
            e => Error::from(e),
        })
    })?;
    check!(len == MESSAGE_LEN, Error::ShortReply);
    Message::parse(&packet[..]).map_err(|_| fail!(Error::UnexpectedMessage))
}
