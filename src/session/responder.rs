// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! The peripheral side of key agreement.

use zeroize::Zeroize as _;

use crate::protocol::key_agreement::Kind;
use crate::protocol::key_agreement::Message;
use crate::protocol::key_agreement::VALUE_LEN;
use crate::session::xor;
use crate::session::Error;
use crate::session::PeripheralSecrets;
use crate::session::SessionKey;
use crate::Result;

/// A peripheral's key-agreement state.
enum State {
    /// No agreement is in progress, and there is no key.
    Inactive,
    /// A probe has arrived; this holds the recovered blinding value.
    Probed([u8; VALUE_LEN]),
    /// The agreement has completed.
    Active(SessionKey),
}

impl Drop for State {
    fn drop(&mut self) {
        if let Self::Probed(r) = self {
            r.zeroize();
        }
    }
}

/// A peripheral's key-agreement state machine.
///
/// A probe is accepted in any state, and always restarts the agreement:
/// the controller runs a fresh agreement every power cycle, and a restarted
/// controller has no way to tell its peripherals to forget the old key.
pub struct Responder {
    state: State,
}

impl Default for Responder {
    fn default() -> Self {
        Self::new()
    }
}

impl Responder {
    /// Creates a new `Responder`, with no key.
    pub fn new() -> Self {
        Self {
            state: State::Inactive,
        }
    }

    /// Returns the session key, if the agreement has completed.
    pub fn key(&self) -> Option<&SessionKey> {
        match &self.state {
            State::Active(key) => Some(key),
            _ => None,
        }
    }

    /// Handles one message from the controller, returning the reply to send
    /// back, if any.
    ///
    /// On error, the state is left unchanged.
    pub fn handle(
        &mut self,
        secrets: &PeripheralSecrets,
        msg: &Message,
    ) -> Result<Option<Message>, Error> {
        match msg.kind {
            Kind::Probe => {
                let r = xor(&msg.value, &secrets.seed.0);
                let reply = Message {
                    kind: Kind::Contribution,
                    value: xor(&secrets.contribution(), &r),
                };
                if self.key().is_some() {
                    info!("key agreement restarted; dropping session key");
                }
                self.state = State::Probed(r);
                Ok(Some(reply))
            }
            Kind::Complement => {
                let r = match &self.state {
                    State::Probed(r) => r,
                    _ => return Err(fail!(Error::BadStateTransition)),
                };
                let key = xor(
                    &xor(&msg.value, r),
                    &xor(&secrets.tag.0, &secrets.contribution()),
                );
                self.state = State::Active(SessionKey::from_bytes(key));
                info!("session key established");
                Ok(None)
            }
            Kind::Contribution => Err(fail!(Error::UnexpectedMessage)),
        }
    }
}
