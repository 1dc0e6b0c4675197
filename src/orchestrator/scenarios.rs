// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! End-to-end tests: a controller and a set of peripherals, each on its own
//! thread, sharing a simulated bus.

use std::thread;
use std::thread::JoinHandle;

use pretty_assertions::assert_eq;

use crate::channel;
use crate::channel::Channel;
use crate::crypto::aes;
use crate::crypto::csrng::fake;
use crate::crypto::ring;
use crate::hardware;
use crate::hardware::flash::RamMut;
use crate::hardware::flash::ERASED;
use crate::net;
use crate::net::sim::SimBus;
use crate::net::Budget;
use crate::net::Identity;
use crate::net::Link as _;
use crate::orchestrator::console::fake::Transcript;
use crate::orchestrator::console::Level;
use crate::orchestrator::controller;
use crate::orchestrator::controller::Controller;
use crate::orchestrator::controller::State;
use crate::orchestrator::options::BootMessage;
use crate::orchestrator::options::ControllerConfig;
use crate::orchestrator::options::Credential;
use crate::orchestrator::options::PeripheralConfig;
use crate::orchestrator::peripheral;
use crate::orchestrator::peripheral::Event;
use crate::orchestrator::peripheral::Peripheral;
use crate::orchestrator::Error;
use crate::protocol::attest::Attestation;
use crate::protocol::key_agreement::Message;
use crate::protocol::scan;
use crate::protocol::Nonce;
use crate::protocol::Opcode;
use crate::protocol::Packet;
use crate::protocol::FRAME_LEN;
use crate::roster::FlashStore;
use crate::roster::Roster;
use crate::roster::SLOTS;
use crate::roster::SLOT_LEN;
use crate::session::test_util::Deployment;
use crate::session::Responder;

const BUDGET: Budget = Budget::new(20_000);

/// Two provisioned components, plus a spare for `replace`.
const IDS: [u32; 3] = [0x11111124, 0x11111125, 0x22222222];

const PIN: &str = "123456";
const TOKEN: &str = "0123456789abcdef";

/// A bus, and the peripherals attached to it.
struct Rig {
    deployment: Deployment,
    bus: SimBus,
    threads: Vec<JoinHandle<Vec<Vec<u8>>>>,
    boots: Vec<hardware::fake::Boot>,
}

impl Rig {
    fn new() -> Self {
        Self {
            deployment: Deployment::new(&IDS),
            bus: SimBus::new(),
            threads: Vec::new(),
            boots: Vec::new(),
        }
    }

    fn controller_config(&self) -> ControllerConfig {
        ControllerConfig {
            secrets: self.deployment.controller.clone(),
            pin: Credential::new(PIN).unwrap(),
            token: Credential::new(TOKEN).unwrap(),
            boot_message: BootMessage::from("controller online").unwrap(),
            default_roster: Roster::from_ids(&self.deployment.ids[..2]).unwrap(),
            budget: BUDGET,
            scan_budget: Budget::new(2_000),
        }
    }

    fn peripheral_config(&self, i: usize) -> PeripheralConfig {
        PeripheralConfig {
            identity: self.deployment.ids[i],
            secrets: self.deployment.peripheral(i),
            boot_message: BootMessage::from(&format!("component {} online", i))
                .unwrap(),
            attestation: Attestation::new("McLean", "08/08/08", "Fritz").unwrap(),
            budget: BUDGET,
        }
    }

    /// Attaches an honest peripheral for `IDS[i]`.
    fn attach(&mut self, i: usize) {
        self.attach_with_greeting(i, None)
    }

    /// Like `attach()`, but the peripheral sends `greeting` to the
    /// controller as soon as it boots.
    fn attach_with_greeting(
        &mut self,
        i: usize,
        greeting: Option<&'static [u8]>,
    ) {
        let mut greeting = greeting;
        let config = self.peripheral_config(i);
        let mut port = self.bus.attach(config.identity.address().unwrap());
        let mut boot = hardware::fake::Boot::new();
        self.boots.push(boot.clone());

        self.threads.push(thread::spawn(move || {
            let mut cipher = aes::Cipher::new();
            let mut rng = fake::Csrng::new(u64::from(config.identity.0));
            let mut p = Peripheral::new(peripheral::Options {
                config: &config,
                cipher: &mut cipher,
                rng: &mut rng,
                boot: &mut boot,
            });

            let mut received = Vec::new();
            loop {
                match p.poll(&mut port) {
                    Ok(Event::Received(_)) => received.push(p.message().to_vec()),
                    Ok(Event::Booted) => {
                        if let Some(msg) = greeting.take() {
                            let sent = p.secure_send(&mut port, msg);
                            assert_eq!(sent, Ok(msg.len()));
                        }
                    }
                    Err(e)
                        if *e.as_ref()
                            == Error::Transport(net::Error::Disconnected) =>
                    {
                        return received
                    }
                    _ => {}
                }
            }
        }));
    }

    /// Attaches a peripheral for `IDS[i]` that answers discovery and nothing
    /// else.
    fn attach_mute(&mut self, i: usize) {
        let id = self.deployment.ids[i];
        let mut port = self.bus.attach(id.address().unwrap());
        self.threads.push(thread::spawn(move || {
            let mut buf = [0; FRAME_LEN];
            loop {
                match port.receive(BUDGET, &mut buf) {
                    Ok(len) if Packet::classify(&buf[..len]) == Packet::ScanProbe => {
                        let _ = port.send(&scan::Reply { identity: id }.encode());
                    }
                    Err(net::Error::Disconnected) => return Vec::new(),
                    _ => {}
                }
            }
        }));
    }

    /// Attaches a peripheral for `IDS[i]` that answers `Validate` with the
    /// wrong `Z`, returning the `Z` it was sent.
    fn attach_rogue(&mut self, i: usize) -> JoinHandle<Option<Nonce>> {
        let config = self.peripheral_config(i);
        let mut port = self.bus.attach(config.identity.address().unwrap());
        thread::spawn(move || {
            let mut responder = Responder::new();
            let mut cipher = aes::Cipher::new();
            let mut rng = fake::Csrng::new(7);
            let mut buf = [0; FRAME_LEN];
            loop {
                let len = match port.receive(BUDGET, &mut buf) {
                    Ok(len) => len,
                    Err(net::Error::Timeout) => continue,
                    Err(_) => return None,
                };
                match Packet::classify(&buf[..len]) {
                    Packet::ScanProbe => {
                        let reply = scan::Reply {
                            identity: config.identity,
                        };
                        port.send(&reply.encode()).unwrap();
                    }
                    Packet::KeyAgreement => {
                        let msg = Message::parse(&buf[..len]).unwrap();
                        let reply = responder.handle(&config.secrets, &msg).unwrap();
                        if let Some(reply) = reply {
                            port.send(&reply.encode()).unwrap();
                        }
                    }
                    Packet::Sealed => {
                        let key = responder.key().unwrap().clone();
                        let mut ch =
                            Channel::new(&key, &mut cipher, &mut rng, BUDGET);
                        let mut frame = ch.open(&mut buf[..len]).unwrap();
                        let z = frame.z;
                        frame.z = Nonce::from(z.as_u64().wrapping_add(1));
                        ch.reply(&mut port, &frame, Opcode::Boot, b"rogue")
                            .unwrap();
                        return Some(z);
                    }
                    Packet::Malformed => {}
                }
            }
        })
    }

    fn detach(&mut self, i: usize) {
        let addr = self.deployment.ids[i].address().unwrap();
        assert!(self.bus.detach(addr));
    }

    /// Tears down the bus, returning every post-boot payload each honest
    /// peripheral received.
    fn finish(self) -> Vec<Vec<Vec<u8>>> {
        drop(self.bus);
        self.threads
            .into_iter()
            .map(|t| t.join().unwrap())
            .collect()
    }
}

/// The services a controller runs on.
struct Services {
    store: FlashStore<RamMut<Vec<u8>>, ring::hash::Engine>,
    cipher: aes::Cipher,
    rng: fake::Csrng,
    boot: hardware::fake::Boot,
}

impl Services {
    fn new() -> Self {
        Self::with_flash(RamMut(vec![ERASED; (SLOTS * SLOT_LEN) as usize]))
    }

    fn with_flash(flash: RamMut<Vec<u8>>) -> Self {
        Self {
            store: FlashStore::new(flash, ring::hash::Engine::new()).unwrap(),
            cipher: aes::Cipher::new(),
            rng: fake::Csrng::new(0xc0ffee),
            boot: hardware::fake::Boot::new(),
        }
    }

    fn controller<'a>(&'a mut self, config: &'a ControllerConfig) -> Controller<'a> {
        Controller::new(controller::Options {
            config,
            store: &mut self.store,
            cipher: &mut self.cipher,
            rng: &mut self.rng,
            boot: &mut self.boot,
        })
        .unwrap()
    }

    /// Simulates a power cycle, keeping only the contents of flash.
    fn restart(self) -> Self {
        Self::with_flash(self.store.into_inner())
    }
}

fn ids(raw: &[u32]) -> Vec<Identity> {
    raw.iter().copied().map(Identity).collect()
}

#[test]
fn list_finds_every_component() {
    let mut rig = Rig::new();
    rig.attach(0);
    rig.attach(1);
    let config = rig.controller_config();
    let mut services = Services::new();
    let mut controller = services.controller(&config);
    let mut console = Transcript::new(&[]);

    controller
        .run_command("list", &mut rig.bus, &mut console)
        .unwrap();
    assert_eq!(
        console.at(Level::Info),
        vec!["P>0x11111124", "P>0x11111125", "F>0x11111124", "F>0x11111125"]
    );
    assert_eq!(console.last(), Some((Level::Success, "List")));

    // Discovery is plaintext, and needs no session key.
    assert!(!controller.has_session_key());
    assert!(rig
        .bus
        .transmissions()
        .iter()
        .all(|t| t.len == scan::PROBE.len()));

    drop(controller);
    rig.finish();
}

#[test]
fn list_reports_missing_component() {
    let mut rig = Rig::new();
    rig.attach(0);
    let config = rig.controller_config();
    let mut services = Services::new();
    let mut controller = services.controller(&config);
    let mut console = Transcript::new(&[]);

    let e = controller
        .run_command("list", &mut rig.bus, &mut console)
        .unwrap_err();
    assert_eq!(
        e.into_inner(),
        Error::CountMismatch {
            found: 1,
            expected: 2
        }
    );
    assert_eq!(
        console.at(Level::Info),
        vec!["P>0x11111124", "P>0x11111125", "F>0x11111124"]
    );
    assert_eq!(
        console.last(),
        Some((Level::Error, "List: Found 1 of 2 components"))
    );

    drop(controller);
    rig.finish();
}

#[test]
fn boot_validates_every_component() {
    let mut rig = Rig::new();
    rig.attach(0);
    rig.attach(1);
    let config = rig.controller_config();
    let mut services = Services::new();
    let boot = services.boot.clone();
    let mut controller = services.controller(&config);
    let mut console = Transcript::new(&[]);

    controller
        .run_command("boot", &mut rig.bus, &mut console)
        .unwrap();
    assert_eq!(
        console.at(Level::Info),
        vec![
            "0x11111124>component 0 online",
            "0x11111125>component 1 online",
            "AP>controller online",
        ]
    );
    assert_eq!(console.last(), Some((Level::Success, "Boot")));
    assert_eq!(controller.state(), State::Booted);
    assert_eq!(boot.count(), 1);

    // Booting is one-way.
    let e = controller
        .run_command("boot", &mut rig.bus, &mut console)
        .unwrap_err();
    assert_eq!(e.into_inner(), Error::AlreadyBooted);
    assert_eq!(boot.count(), 1);

    // Post-boot traffic rides the same session key.
    assert_eq!(
        controller.secure_send(&mut rig.bus, Identity(0x11111124), b"hello"),
        Ok(5)
    );
    let e = controller
        .secure_send(&mut rig.bus, Identity(0x22222222), b"hello")
        .unwrap_err();
    assert_eq!(e.into_inner(), Error::NotProvisioned(Identity(0x22222222)));

    drop(controller);
    let boots = rig.boots.clone();
    let received = rig.finish();
    assert_eq!(received, vec![vec![b"hello".to_vec()], vec![]]);
    assert!(boots.iter().all(|b| b.count() == 1));
}

#[test]
fn peripheral_initiated_exchange() {
    let mut rig = Rig::new();
    rig.attach_with_greeting(0, Some(&b"temperature nominal"[..]));
    rig.attach(1);
    let config = rig.controller_config();
    let mut services = Services::new();
    let mut controller = services.controller(&config);
    let mut console = Transcript::new(&[]);

    let mut buf = [0; 64];
    let e = controller
        .secure_receive(&mut rig.bus, Identity(0x11111124), &mut buf)
        .unwrap_err();
    assert_eq!(e.into_inner(), Error::NotBooted);

    controller
        .run_command("boot", &mut rig.bus, &mut console)
        .unwrap();
    let n = controller
        .secure_receive(&mut rig.bus, Identity(0x11111124), &mut buf)
        .unwrap();
    assert_eq!(&buf[..n], b"temperature nominal");

    // The other direction still works afterwards.
    assert_eq!(
        controller.secure_send(&mut rig.bus, Identity(0x11111125), b"ack"),
        Ok(3)
    );

    drop(controller);
    let received = rig.finish();
    assert_eq!(received, vec![vec![], vec![b"ack".to_vec()]]);
}

#[test]
fn boot_with_missing_component() {
    let mut rig = Rig::new();
    rig.attach(0);
    let config = rig.controller_config();
    let mut services = Services::new();
    let boot = services.boot.clone();
    let mut controller = services.controller(&config);
    let mut console = Transcript::new(&[]);

    let e = controller
        .run_command("boot", &mut rig.bus, &mut console)
        .unwrap_err();
    assert_eq!(e.into_inner(), Error::PrebootMismatch);
    assert_eq!(
        console.last(),
        Some((Level::Error, "Boot: Component id doesn't match"))
    );

    // Nothing but discovery probes went out: no key agreement, and no
    // `Validate`.
    assert!(rig
        .bus
        .transmissions()
        .iter()
        .all(|t| t.len == scan::PROBE.len()));
    assert!(!controller.has_session_key());
    assert_eq!(controller.state(), State::Idle);
    assert_eq!(boot.count(), 0);

    drop(controller);
    rig.finish();
}

#[test]
fn boot_rejects_wrong_nonce() {
    let mut rig = Rig::new();
    let rogue = rig.attach_rogue(0);
    rig.attach(1);
    let mut services = Services::new();
    let boot = services.boot.clone();
    services
        .rng
        .script(&[0x42; 16])
        .script(&0xdeadbeef_cafebabe_u64.to_be_bytes());
    let config = rig.controller_config();
    let mut controller = services.controller(&config);
    let mut console = Transcript::new(&[]);

    let e = controller
        .run_command("boot", &mut rig.bus, &mut console)
        .unwrap_err();
    assert_eq!(
        e.into_inner(),
        Error::Component {
            id: Identity(0x11111124),
            error: channel::Error::NonceMismatch,
        }
    );
    assert_eq!(
        console.last(),
        Some((
            Level::Error,
            "Boot: Could not validate component 0x11111124: \
             Random number provided is invalid"
        ))
    );
    assert_eq!(rogue.join().unwrap(), Some(Nonce::from(0xdeadbeef_cafebabe)));

    assert_eq!(controller.state(), State::Idle);
    assert!(controller.has_session_key());
    assert_eq!(controller.provisioned_ids(), &ids(&IDS[..2])[..]);
    assert_eq!(boot.count(), 0);

    drop(controller);
    rig.finish();
}

#[test]
fn attest_with_pin() {
    let mut rig = Rig::new();
    rig.attach(0);
    rig.attach(1);
    let config = rig.controller_config();
    let mut services = Services::new();
    let mut controller = services.controller(&config);
    let mut console = Transcript::new(&[PIN, "0x11111124"]);

    controller
        .run_command("attest", &mut rig.bus, &mut console)
        .unwrap();
    assert_eq!(console.prompts(), &["Enter pin: ", "Component ID: "]);
    assert_eq!(console.at(Level::Debug), vec!["Pin Accepted!"]);
    assert_eq!(
        console.at(Level::Info),
        vec!["C>0x11111124", "LOC>McLean", "DATE>08/08/08", "CUST>Fritz"]
    );
    assert_eq!(console.last(), Some((Level::Success, "Attest")));
    assert!(controller.has_session_key());
    assert_eq!(controller.state(), State::Idle);

    drop(controller);
    rig.finish();
}

#[test]
fn attest_with_wrong_pin() {
    let mut rig = Rig::new();
    rig.attach(0);
    rig.attach(1);
    let config = rig.controller_config();
    let mut services = Services::new();
    let mut controller = services.controller(&config);
    let mut console = Transcript::new(&["654321"]);

    let e = controller
        .run_command("attest", &mut rig.bus, &mut console)
        .unwrap_err();
    assert_eq!(e.into_inner(), Error::BadPin);
    assert_eq!(console.prompts(), &["Enter pin: "]);
    assert_eq!(console.last(), Some((Level::Error, "Attest: Invalid PIN!")));
    assert!(rig.bus.transmissions().is_empty());

    // Unprovisioned components are refused before any traffic, too.
    console.feed(&[PIN, "0x22222222"]);
    let e = controller
        .run_command("attest", &mut rig.bus, &mut console)
        .unwrap_err();
    assert_eq!(e.into_inner(), Error::NotProvisioned(Identity(0x22222222)));
    assert!(rig.bus.transmissions().is_empty());

    drop(controller);
    rig.finish();
}

#[test]
fn failed_key_agreement_locks_out() {
    let mut rig = Rig::new();
    rig.attach(0);
    rig.attach_mute(1);
    let mut services = Services::new();
    let mut config = rig.controller_config();
    config.budget = Budget::new(2_000);
    let mut controller = services.controller(&config);
    let mut console = Transcript::new(&[PIN, "0x11111124"]);

    let e = controller
        .run_command("attest", &mut rig.bus, &mut console)
        .unwrap_err();
    assert!(matches!(e.into_inner(), Error::KeyAgreement(_)));
    assert_eq!(console.at(Level::Info), vec!["Synthesize the keys failed"]);
    assert_eq!(
        console.last(),
        Some((Level::Error, "Attest: Synthesize the keys first"))
    );
    assert!(!controller.has_session_key());

    // Once the component behaves, the next authenticated command retries.
    rig.detach(1);
    rig.attach(1);
    console.clear();
    console.feed(&[PIN, "0x11111124"]);
    controller
        .run_command("attest", &mut rig.bus, &mut console)
        .unwrap();
    assert_eq!(console.last(), Some((Level::Success, "Attest")));
    assert!(controller.has_session_key());

    drop(controller);
    rig.finish();
}

#[test]
fn replace_survives_restart() {
    let mut rig = Rig::new();
    rig.attach(0);
    rig.attach(1);
    let config = rig.controller_config();
    let mut services = Services::new();
    let mut controller = services.controller(&config);
    let mut console = Transcript::new(&[TOKEN, "0x22222222", "0x11111125"]);

    controller
        .run_command("replace", &mut rig.bus, &mut console)
        .unwrap();
    assert_eq!(
        console.prompts(),
        &["Enter token: ", "Component ID In: ", "Component ID Out: "]
    );
    assert_eq!(
        console.at(Level::Debug),
        vec!["Token Accepted!", "Replaced 0x11111125 with 0x22222222"]
    );
    assert_eq!(console.last(), Some((Level::Success, "Replace")));
    assert_eq!(
        controller.provisioned_ids(),
        &ids(&[0x11111124, 0x22222222])[..]
    );

    // Swap the hardware to match; discovery agrees with the new roster.
    rig.detach(1);
    rig.attach(2);
    console.clear();
    controller
        .run_command("list", &mut rig.bus, &mut console)
        .unwrap();
    assert_eq!(
        console.at(Level::Info),
        vec!["P>0x11111124", "P>0x22222222", "F>0x22222222", "F>0x11111124"]
    );

    // The new roster is what comes back after a power cycle, and the board
    // boots with it.
    drop(controller);
    let mut services = services.restart();
    let mut controller = services.controller(&config);
    assert_eq!(
        controller.provisioned_ids(),
        &ids(&[0x11111124, 0x22222222])[..]
    );
    console.clear();
    controller
        .run_command("boot", &mut rig.bus, &mut console)
        .unwrap();
    assert_eq!(console.last(), Some((Level::Success, "Boot")));

    drop(controller);
    rig.finish();
}

#[test]
fn replace_rejections() {
    let mut rig = Rig::new();
    let config = rig.controller_config();
    let mut services = Services::new();
    let mut controller = services.controller(&config);
    let mut console = Transcript::new(&["not the token"]);

    let e = controller
        .run_command("replace", &mut rig.bus, &mut console)
        .unwrap_err();
    assert_eq!(e.into_inner(), Error::BadToken);
    assert_eq!(console.last(), Some((Level::Error, "Replace: Invalid Token!")));

    console.feed(&[TOKEN, "0x22222222", "0x33333333"]);
    let e = controller
        .run_command("replace", &mut rig.bus, &mut console)
        .unwrap_err();
    assert_eq!(e.into_inner(), Error::NotProvisioned(Identity(0x33333333)));
    assert_eq!(
        console.last(),
        Some((
            Level::Error,
            "Replace: Component 0x33333333 is not provisioned for the system"
        ))
    );

    console.feed(&[TOKEN, "0x11111124", "0x11111125"]);
    let e = controller
        .run_command("replace", &mut rig.bus, &mut console)
        .unwrap_err();
    assert_eq!(
        e.into_inner(),
        Error::Roster(crate::roster::Error::Duplicate(Identity(0x11111124)))
    );

    console.feed(&[TOKEN, "0x22222228", "0x11111125"]);
    let e = controller
        .run_command("replace", &mut rig.bus, &mut console)
        .unwrap_err();
    assert_eq!(
        e.into_inner(),
        Error::Roster(crate::roster::Error::Unaddressable(Identity(0x22222228)))
    );

    console.feed(&[TOKEN, "zz", "0x11111125"]);
    let e = controller
        .run_command("replace", &mut rig.bus, &mut console)
        .unwrap_err();
    assert_eq!(e.into_inner(), Error::BadInput);

    assert_eq!(controller.provisioned_ids(), &ids(&IDS[..2])[..]);
    assert!(rig.bus.transmissions().is_empty());

    drop(controller);
    rig.finish();
}

#[test]
fn unknown_command() {
    let mut rig = Rig::new();
    let config = rig.controller_config();
    let mut services = Services::new();
    let mut controller = services.controller(&config);
    let mut console = Transcript::new(&[]);

    let e = controller
        .run_command("reboot", &mut rig.bus, &mut console)
        .unwrap_err();
    assert_eq!(e.into_inner(), Error::UnknownCommand);
    assert_eq!(console.lines().len(), 1);
    assert_eq!(
        console.last(),
        Some((Level::Error, "Unrecognized command 'reboot'"))
    );

    drop(controller);
    rig.finish();
}
