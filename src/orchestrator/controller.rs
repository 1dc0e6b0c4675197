// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! The controller's command loop.
//!
//! A [`Controller`] runs one operator command at a time, start to finish:
//! - `list` probes every bus address in plaintext and compares what
//!   answers against the roster. It needs no session key.
//! - `boot` re-checks the attached peripherals against the roster,
//!   validates every one of them over the secure channel, and hands control
//!   to the platform.
//! - `attest` asks one peripheral for its attestation metadata, behind a
//!   PIN.
//! - `replace` swaps one roster entry for another, behind a token.
//!
//! Authenticated commands need a session key. The first one to run checks
//! the attached peripherals against the roster and runs key agreement; if
//! either fails, the command is refused, and the next authenticated command
//! tries again.

use core::fmt;

use arrayvec::ArrayVec;

use crate::channel::Channel;
use crate::crypto::cipher::Cipher;
use crate::crypto::csrng::Csrng;
use crate::hardware::Boot;
use crate::net;
use crate::net::Address;
use crate::net::Addressed;
use crate::net::Bus;
use crate::net::Identity;
use crate::orchestrator::console::Console;
use crate::orchestrator::console::Level;
use crate::orchestrator::options::ControllerConfig;
use crate::orchestrator::options::Credential;
use crate::orchestrator::Error;
use crate::protocol::attest::Attestation;
use crate::protocol::scan;
use crate::protocol::wire::FromWire as _;
use crate::protocol::Opcode;
use crate::protocol::FRAME_LEN;
use crate::roster;
use crate::roster::Roster;
use crate::roster::Store;
use crate::session::KeyAgreement;
use crate::Result;

/// Options for constructing a [`Controller`].
pub struct Options<'a> {
    /// The provisioned configuration.
    pub config: &'a ControllerConfig,
    /// Persistent storage for the roster.
    pub store: &'a mut dyn Store,
    /// The cipher used to seal frames.
    pub cipher: &'a mut dyn Cipher,
    /// Entropy for nonces and key agreement.
    pub rng: &'a mut dyn Csrng,
    /// The platform's boot hand-off.
    pub boot: &'a mut dyn Boot,
}

/// A [`Controller`]'s lifecycle state.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum State {
    /// Waiting for commands; the board has not booted.
    Idle,
    /// The board has booted; only post-boot traffic and `list` remain.
    Booted,
}

/// An operator command.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Command {
    /// Lists provisioned and attached components.
    List,
    /// Validates every component and boots.
    Boot,
    /// Reads one component's attestation metadata.
    Attest,
    /// Replaces one roster entry.
    Replace,
}

impl Command {
    /// Parses a command from a line of operator input.
    pub fn parse(line: &str) -> Option<Self> {
        match line.trim() {
            "list" => Some(Self::List),
            "boot" => Some(Self::Boot),
            "attest" => Some(Self::Attest),
            "replace" => Some(Self::Replace),
            _ => None,
        }
    }

    /// Returns the name reported in this command's terminal status.
    pub fn name(self) -> &'static str {
        match self {
            Self::List => "List",
            Self::Boot => "Boot",
            Self::Attest => "Attest",
            Self::Replace => "Replace",
        }
    }
}

/// Input buffer size for operator prompts.
const INPUT_LEN: usize = 96;

/// A controller: the single principal that owns the roster and the session
/// key.
pub struct Controller<'a> {
    opts: Options<'a>,
    roster: Roster,
    ka: KeyAgreement,
    state: State,
}

impl<'a> Controller<'a> {
    /// Creates a new `Controller`, loading the roster from storage.
    ///
    /// If storage holds no roster yet, it is initialized with the default
    /// one from the configuration.
    pub fn new(mut opts: Options<'a>) -> Result<Self, Error> {
        let roster = opts.store.load_or_init(&opts.config.default_roster)?;
        info!("loaded roster with {} entries", roster.len());
        Ok(Self {
            opts,
            roster,
            ka: KeyAgreement::new(),
            state: State::Idle,
        })
    }

    /// Returns the current lifecycle state.
    pub fn state(&self) -> State {
        self.state
    }

    /// Returns the identities on the roster.
    pub fn provisioned_ids(&self) -> &[Identity] {
        self.roster.ids()
    }

    /// Returns whether a session key has been agreed.
    pub fn has_session_key(&self) -> bool {
        self.ka.key().is_some()
    }

    /// Runs one line of operator input as a command.
    ///
    /// Exactly one terminal status line is printed to `console`. If the
    /// command was a successful `boot`, the platform boot hook runs after the
    /// status is printed.
    pub fn run_command(
        &mut self,
        line: &str,
        bus: &mut dyn Bus,
        console: &mut dyn Console,
    ) -> Result<(), Error> {
        let command = match Command::parse(line) {
            Some(c) => c,
            None => {
                console.status(
                    Level::Error,
                    format_args!("Unrecognized command '{}'", line.trim()),
                );
                return Err(fail!(Error::UnknownCommand));
            }
        };

        let result = match command {
            Command::List => self.list(bus, console),
            Command::Boot => self.validate_and_boot(bus, console),
            Command::Attest => self.attest(bus, console),
            Command::Replace => self.replace(console),
        };

        match &result {
            Ok(()) => console.status(Level::Success, format_args!("{}", command.name())),
            Err(e) => console.status(
                Level::Error,
                format_args!("{}: {}", command.name(), e.as_ref()),
            ),
        }
        if result.is_ok() && command == Command::Boot {
            info!("handing off to the platform");
            self.opts.boot.boot();
        }
        result
    }

    /// Lists every provisioned component, then every component that answers
    /// a discovery probe.
    ///
    /// Succeeds if as many components answered as are on the roster.
    pub fn list(
        &mut self,
        bus: &mut dyn Bus,
        console: &mut dyn Console,
    ) -> Result<(), Error> {
        for id in self.roster.ids() {
            console.status(Level::Info, format_args!("P>{}", id));
        }
        let found = self.scan(bus);
        for id in &found {
            console.status(Level::Info, format_args!("F>{}", id));
        }

        check!(
            found.len() == self.roster.len(),
            Error::CountMismatch {
                found: found.len(),
                expected: self.roster.len(),
            }
        );
        Ok(())
    }

    /// Checks that the attached components are exactly the ones on the
    /// roster.
    pub fn preboot_validate(&mut self, bus: &mut dyn Bus) -> Result<(), Error> {
        let found = self.scan(bus);
        for &id in self.roster.ids() {
            if !found.contains(&id) {
                warn!("provisioned component {} did not answer", id);
                return Err(fail!(Error::PrebootMismatch));
            }
        }
        for &id in &found {
            if !self.roster.contains(id) {
                warn!("unprovisioned component {} is attached", id);
                return Err(fail!(Error::PrebootMismatch));
            }
        }
        Ok(())
    }

    /// Runs key agreement with every component on the roster, unless a
    /// session key already exists.
    ///
    /// The attached components are checked against the roster first.
    pub fn unlock(
        &mut self,
        bus: &mut dyn Bus,
        console: &mut dyn Console,
    ) -> Result<(), Error> {
        if self.ka.key().is_some() {
            return Ok(());
        }
        self.preboot_validate(bus)?;
        self.agree(bus, console)
    }

    fn agree(
        &mut self,
        bus: &mut dyn Bus,
        console: &mut dyn Console,
    ) -> Result<(), Error> {
        let result = self.ka.derive_session_key(
            bus,
            self.roster.ids(),
            &self.opts.config.secrets,
            &mut *self.opts.rng,
            self.opts.config.budget,
        );
        if let Err(e) = result {
            console.status(Level::Info, format_args!("Synthesize the keys failed"));
            return Err(e.into());
        }
        Ok(())
    }

    /// Validates every component on the roster, and moves to
    /// [`State::Booted`] if all of them check out.
    ///
    /// This does not call the boot hook; [`Controller::run_command()`] does
    /// that once the result has been reported.
    pub fn validate_and_boot(
        &mut self,
        bus: &mut dyn Bus,
        console: &mut dyn Console,
    ) -> Result<(), Error> {
        check!(self.state == State::Idle, Error::AlreadyBooted);
        self.preboot_validate(bus)?;
        if self.ka.key().is_none() {
            self.agree(bus, console)?;
        }

        let key = self
            .ka
            .key()
            .ok_or_else(|| fail!(Error::NoSessionKey))?;
        let mut channel = Channel::new(
            key,
            &mut *self.opts.cipher,
            &mut *self.opts.rng,
            self.opts.config.budget,
        );
        for &id in self.roster.ids() {
            let addr = address_of(id)?;
            let reply = channel
                .request(
                    &mut Addressed::new(&mut *bus, addr),
                    Opcode::Validate,
                    id,
                    &[],
                    Opcode::Boot,
                )
                .map_err(|e| {
                    fail!(Error::Component {
                        id,
                        error: e.into_inner()
                    })
                })?;
            console.status(Level::Info, format_args!("{}>{}", id, Text(reply.payload())));
        }

        console.status(
            Level::Info,
            format_args!("AP>{}", self.opts.config.boot_message),
        );
        self.state = State::Booted;
        Ok(())
    }

    /// Prompts for a PIN and a component, and prints the component's
    /// attestation metadata.
    pub fn attest(
        &mut self,
        bus: &mut dyn Bus,
        console: &mut dyn Console,
    ) -> Result<(), Error> {
        check_credential(console, "Enter pin: ", &self.opts.config.pin, Error::BadPin)?;
        console.status(Level::Debug, format_args!("Pin Accepted!"));

        let id = prompt_identity(console, "Component ID: ")?;
        check!(self.roster.contains(id), Error::NotProvisioned(id));
        let addr = address_of(id)?;
        self.unlock(bus, console)?;

        let key = self
            .ka
            .key()
            .ok_or_else(|| fail!(Error::NoSessionKey))?;
        let reply = Channel::new(
            key,
            &mut *self.opts.cipher,
            &mut *self.opts.rng,
            self.opts.config.budget,
        )
        .request(
            &mut Addressed::new(bus, addr),
            Opcode::Attest,
            id,
            &[],
            Opcode::Attest,
        )
        .map_err(|e| {
            fail!(Error::Component {
                id,
                error: e.into_inner()
            })
        })?;

        let att = Attestation::from_wire(reply.payload())
            .map_err(|_| fail!(Error::MalformedReply(id)))?;
        console.status(Level::Info, format_args!("C>{}", id));
        console.status(Level::Info, format_args!("LOC>{}", att.location));
        console.status(Level::Info, format_args!("DATE>{}", att.date));
        console.status(Level::Info, format_args!("CUST>{}", att.customer));
        Ok(())
    }

    /// Prompts for a token and a pair of identities, and replaces one with
    /// the other on the roster.
    ///
    /// The new roster is persisted before it takes effect. Since the roster
    /// changes, any session key is dropped.
    pub fn replace(&mut self, console: &mut dyn Console) -> Result<(), Error> {
        check!(self.state == State::Idle, Error::AlreadyBooted);
        check_credential(
            console,
            "Enter token: ",
            &self.opts.config.token,
            Error::BadToken,
        )?;
        console.status(Level::Debug, format_args!("Token Accepted!"));

        let new = prompt_identity(console, "Component ID In: ")?;
        let out = prompt_identity(console, "Component ID Out: ")?;

        let mut roster = self.roster.clone();
        roster.replace(out, new).map_err(|e| match e.into_inner() {
            roster::Error::NotFound(id) => fail!(Error::NotProvisioned(id)),
            e => fail!(Error::Roster(e)),
        })?;
        self.opts.store.save(&roster)?;

        self.roster = roster;
        self.ka.clear();
        console.status(
            Level::Debug,
            format_args!("Replaced {} with {}", out, new),
        );
        Ok(())
    }

    /// Delivers `payload` to the component `id`, after boot.
    ///
    /// Returns the number of bytes delivered.
    pub fn secure_send(
        &mut self,
        bus: &mut dyn Bus,
        id: Identity,
        payload: &[u8],
    ) -> Result<usize, Error> {
        let addr = self.post_boot_peer(id)?;
        let key = self
            .ka
            .key()
            .ok_or_else(|| fail!(Error::NoSessionKey))?;
        Channel::new(
            key,
            &mut *self.opts.cipher,
            &mut *self.opts.rng,
            self.opts.config.budget,
        )
        .post_boot_exchange(&mut Addressed::new(bus, addr), id, payload)
        .map_err(|e| {
            fail!(Error::Component {
                id,
                error: e.into_inner()
            })
        })
    }

    /// Accepts a payload from the component `id`, after boot.
    ///
    /// The payload is written to the front of `out`, and its length is
    /// returned.
    pub fn secure_receive(
        &mut self,
        bus: &mut dyn Bus,
        id: Identity,
        out: &mut [u8],
    ) -> Result<usize, Error> {
        let addr = self.post_boot_peer(id)?;
        let key = self
            .ka
            .key()
            .ok_or_else(|| fail!(Error::NoSessionKey))?;
        Channel::new(
            key,
            &mut *self.opts.cipher,
            &mut *self.opts.rng,
            self.opts.config.budget,
        )
        .post_boot_accept(&mut Addressed::new(bus, addr), id, out)
        .map_err(|e| {
            fail!(Error::Component {
                id,
                error: e.into_inner()
            })
        })
    }

    fn post_boot_peer(&self, id: Identity) -> Result<Address, Error> {
        check!(self.state == State::Booted, Error::NotBooted);
        check!(self.roster.contains(id), Error::NotProvisioned(id));
        address_of(id)
    }

    /// Probes every usable address, returning the identities that answered.
    fn scan(&self, bus: &mut dyn Bus) -> ArrayVec<Identity, { roster::MAX_ENTRIES }> {
        let mut found = ArrayVec::new();
        for addr in Address::all() {
            match bus.send(addr, &scan::PROBE) {
                Ok(()) => {}
                Err(net::Error::NoDevice) => continue,
                Err(e) => {
                    warn!("could not probe {:?}: {:?}", addr, e);
                    continue;
                }
            }

            let mut buf = [0; FRAME_LEN];
            let reply = bus
                .receive(addr, self.opts.config.scan_budget, &mut buf)
                .ok()
                .filter(|&len| len == scan::REPLY_LEN)
                .and_then(|len| scan::Reply::from_wire(&buf[..len]).ok());
            match reply {
                Some(reply) => {
                    trace!("{:?} answered as {}", addr, reply.identity);
                    if found.try_push(reply.identity).is_err() {
                        warn!("too many components answered; ignoring the rest");
                        break;
                    }
                }
                None => {
                    warn!("{:?} did not answer the probe", addr);
                }
            }
        }
        found
    }
}

fn address_of(id: Identity) -> Result<Address, Error> {
    id.address()
        .ok_or_else(|| fail!(Error::Roster(roster::Error::Unaddressable(id))))
}

fn check_credential(
    console: &mut dyn Console,
    prompt: &str,
    credential: &Credential,
    error: Error,
) -> Result<(), Error> {
    let mut buf = [0; INPUT_LEN];
    let accepted = console
        .prompt(prompt, &mut buf)
        .map_or(false, |input| credential.matches(input));
    check!(accepted, error);
    Ok(())
}

fn prompt_identity(
    console: &mut dyn Console,
    prompt: &str,
) -> Result<Identity, Error> {
    let mut buf = [0; INPUT_LEN];
    console
        .prompt(prompt, &mut buf)
        .and_then(Identity::parse_hex)
        .ok_or_else(|| fail!(Error::BadInput))
}

/// Displays a peripheral-supplied message, which may not be UTF-8.
struct Text<'a>(&'a [u8]);

impl fmt::Display for Text<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut bytes = self.0;
        loop {
            match core::str::from_utf8(bytes) {
                Ok(s) => return f.write_str(s),
                Err(e) => {
                    let (valid, rest) = bytes.split_at(e.valid_up_to());
                    f.write_str(core::str::from_utf8(valid).unwrap_or(""))?;
                    f.write_str("\u{fffd}")?;
                    bytes = &rest[e.error_len().unwrap_or(rest.len())..];
                }
            }
        }
    }
}
