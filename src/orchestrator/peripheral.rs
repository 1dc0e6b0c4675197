// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! The peripheral's dispatcher.
//!
//! A [`Peripheral`] waits for one packet at a time from the controller, and
//! answers it according to its shape:
//! - A discovery probe gets a plaintext reply naming this peripheral.
//! - A key-agreement message goes to the [`Responder`].
//! - A sealed frame is opened under the session key and dispatched on its
//!   opcode. Frames about another peripheral, and frames with an opcode
//!   that makes no sense here, are logged and dropped without a reply.

use zeroize::Zeroizing;

use crate::channel;
use crate::channel::Channel;
use crate::crypto::cipher::Cipher;
use crate::crypto::csrng::Csrng;
use crate::hardware::Boot;
use crate::io::Cursor;
use crate::net;
use crate::net::Identity;
use crate::net::Link;
use crate::orchestrator::options::PeripheralConfig;
use crate::orchestrator::Error;
use crate::protocol::frame::MAX_PAYLOAD_LEN;
use crate::protocol::key_agreement::Message;
use crate::protocol::scan;
use crate::protocol::wire::ToWire as _;
use crate::protocol::Opcode;
use crate::protocol::Packet;
use crate::protocol::FRAME_LEN;
use crate::session::Responder;
use crate::Result;

/// Options for constructing a [`Peripheral`].
pub struct Options<'a> {
    /// The provisioned configuration.
    pub config: &'a PeripheralConfig,
    /// The cipher used to seal frames.
    pub cipher: &'a mut dyn Cipher,
    /// Entropy for nonces.
    pub rng: &'a mut dyn Csrng,
    /// The platform's boot hand-off.
    pub boot: &'a mut dyn Boot,
}

/// What happened during one call to [`Peripheral::poll()`].
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Event {
    /// Nothing arrived.
    Idle,
    /// A discovery probe was answered.
    Scanned,
    /// A key-agreement probe was answered.
    KeyExchange,
    /// Key agreement completed.
    KeyAgreed,
    /// This peripheral was validated, and booted.
    Booted,
    /// Attestation metadata was sent.
    Attested,
    /// A post-boot payload of the given length was accepted; see
    /// [`Peripheral::message()`].
    Received(usize),
    /// A packet arrived, but was dropped.
    Ignored,
}

/// A peripheral: one component on the controller's bus.
pub struct Peripheral<'a> {
    opts: Options<'a>,
    responder: Responder,
    booted: bool,
    inbox: Zeroizing<[u8; MAX_PAYLOAD_LEN]>,
    inbox_len: usize,
}

impl<'a> Peripheral<'a> {
    /// Creates a new `Peripheral`.
    pub fn new(opts: Options<'a>) -> Self {
        Self {
            opts,
            responder: Responder::new(),
            booted: false,
            inbox: Zeroizing::new([0; MAX_PAYLOAD_LEN]),
            inbox_len: 0,
        }
    }

    /// Returns this peripheral's identity.
    pub fn identity(&self) -> Identity {
        self.opts.config.identity
    }

    /// Returns whether this peripheral has been validated and booted.
    pub fn is_booted(&self) -> bool {
        self.booted
    }

    /// Returns whether a session key has been agreed.
    pub fn has_session_key(&self) -> bool {
        self.responder.key().is_some()
    }

    /// Returns the last post-boot payload accepted from the controller.
    pub fn message(&self) -> &[u8] {
        &self.inbox[..self.inbox_len]
    }

    /// Waits for one packet from the controller, and handles it.
    ///
    /// Packets that cannot be handled are dropped; only a failure of the
    /// link itself, or of a post-boot exchange in progress, is an error.
    pub fn poll(&mut self, link: &mut dyn Link) -> Result<Event, Error> {
        let mut buf = Zeroizing::new([0; FRAME_LEN]);
        let len = match link.receive(self.opts.config.budget, &mut buf[..]) {
            Ok(len) => len,
            Err(net::Error::Timeout) => return Ok(Event::Idle),
            Err(net::Error::Short) => {
                warn!("dropping oversized packet");
                return Ok(Event::Ignored);
            }
            Err(e) => return Err(fail!(Error::Transport(e))),
        };
        let packet = &mut buf[..len];

        match Packet::classify(packet) {
            Packet::ScanProbe => {
                let reply = scan::Reply {
                    identity: self.identity(),
                };
                link
                    .send(&reply.encode())
                    .map_err(|e| fail!(Error::Transport(e)))?;
                Ok(Event::Scanned)
            }
            Packet::KeyAgreement => self.on_key_agreement(link, packet),
            Packet::Sealed => self.on_frame(link, packet),
            Packet::Malformed => {
                warn!("dropping malformed {}-byte packet", len);
                Ok(Event::Ignored)
            }
        }
    }

    fn on_key_agreement(
        &mut self,
        link: &mut dyn Link,
        packet: &[u8],
    ) -> Result<Event, Error> {
        let msg = match Message::parse(packet) {
            Ok(msg) => msg,
            Err(_) => {
                warn!("dropping malformed key-agreement message");
                return Ok(Event::Ignored);
            }
        };

        match self.responder.handle(&self.opts.config.secrets, &msg) {
            Ok(Some(reply)) => {
                link
                    .send(&reply.encode())
                    .map_err(|e| fail!(Error::Transport(e)))?;
                Ok(Event::KeyExchange)
            }
            Ok(None) => Ok(Event::KeyAgreed),
            Err(_) => Ok(Event::Ignored),
        }
    }

    fn on_frame(
        &mut self,
        link: &mut dyn Link,
        packet: &mut [u8],
    ) -> Result<Event, Error> {
        let key = match self.responder.key() {
            Some(key) => key,
            None => {
                warn!("dropping sealed frame: no session key");
                return Ok(Event::Ignored);
            }
        };
        let mut channel = Channel::new(
            key,
            &mut *self.opts.cipher,
            &mut *self.opts.rng,
            self.opts.config.budget,
        );
        let frame = match channel.open(packet) {
            Ok(frame) => frame,
            Err(_) => return Ok(Event::Ignored),
        };

        let me = self.opts.config.identity;
        if frame.identity != me {
            warn!("dropping {:?} frame about {}", frame.opcode, frame.identity);
            return Ok(Event::Ignored);
        }

        match frame.opcode {
            Opcode::Validate => {
                channel.reply(
                    link,
                    &frame,
                    Opcode::Boot,
                    self.opts.config.boot_message.as_bytes(),
                )?;
                if !self.booted {
                    info!("validated; booting");
                    self.booted = true;
                    self.opts.boot.boot();
                }
                Ok(Event::Booted)
            }
            Opcode::Attest => {
                let mut payload = [0; MAX_PAYLOAD_LEN];
                let mut cursor = Cursor::new(&mut payload[..]);
                self.opts
                    .config
                    .attestation
                    .to_wire(&mut cursor)
                    .map_err(|_| fail!(Error::Channel(channel::Error::Oversized)))?;
                let len = cursor.consumed_len();
                channel.reply(link, &frame, Opcode::Attest, &payload[..len])?;
                Ok(Event::Attested)
            }
            Opcode::SecureValidate if self.booted => {
                let len =
                    channel.accept_from(link, me, &frame, &mut self.inbox[..])?;
                self.inbox_len = len;
                Ok(Event::Received(len))
            }
            op => {
                warn!("dropping unexpected {:?} frame", op);
                Ok(Event::Ignored)
            }
        }
    }

    /// Delivers `payload` to the controller, after boot.
    ///
    /// Returns the number of bytes delivered.
    pub fn secure_send(
        &mut self,
        link: &mut dyn Link,
        payload: &[u8],
    ) -> Result<usize, Error> {
        check!(self.booted, Error::NotBooted);
        let me = self.opts.config.identity;
        let key = self
            .responder
            .key()
            .ok_or_else(|| fail!(Error::NoSessionKey))?;
        let sent = Channel::new(
            key,
            &mut *self.opts.cipher,
            &mut *self.opts.rng,
            self.opts.config.budget,
        )
        .post_boot_exchange(link, me, payload)?;
        Ok(sent)
    }

    /// Waits for a payload from the controller, after boot.
    ///
    /// Unlike [`Peripheral::poll()`], this expects the very next packet to
    /// start a post-boot exchange.
    pub fn secure_receive(
        &mut self,
        link: &mut dyn Link,
        out: &mut [u8],
    ) -> Result<usize, Error> {
        check!(self.booted, Error::NotBooted);
        let me = self.opts.config.identity;
        let key = self
            .responder
            .key()
            .ok_or_else(|| fail!(Error::NoSessionKey))?;
        let len = Channel::new(
            key,
            &mut *self.opts.cipher,
            &mut *self.opts.rng,
            self.opts.config.budget,
        )
        .post_boot_accept(link, me, out)?;
        Ok(len)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    use crate::channel::test_util::Side;
    use crate::channel::test_util::KEY;
    use crate::crypto::aes;
    use crate::crypto::csrng::fake;
    use crate::hardware;
    use crate::net::sim::SimBus;
    use crate::net::sim::SimPort;
    use crate::net::Address;
    use crate::net::Addressed;
    use crate::net::Budget;
    use crate::net::Bus as _;
    use crate::orchestrator::options::BootMessage;
    use crate::protocol::attest::Attestation;
    use crate::protocol::key_agreement::Kind;
    use crate::protocol::key_agreement::VALUE_LEN;
    use crate::session::test_util::Deployment;
    use crate::session::PeripheralSecrets;

    const BUDGET: Budget = Budget::new(10);
    const ME: Identity = Identity(0x11111124);

    fn addr() -> Address {
        ME.address().unwrap()
    }

    fn config() -> PeripheralConfig {
        PeripheralConfig {
            identity: ME,
            secrets: Deployment::new(&[ME.0]).peripheral(0),
            boot_message: BootMessage::from("online").unwrap(),
            attestation: Attestation::new("McLean", "08/08/08", "Fritz").unwrap(),
            budget: BUDGET,
        }
    }

    fn xor(a: &[u8; VALUE_LEN], b: &[u8; VALUE_LEN]) -> [u8; VALUE_LEN] {
        let mut out = *a;
        for (o, b) in out.iter_mut().zip(b) {
            *o ^= b;
        }
        out
    }

    /// Services for one peripheral.
    struct Services {
        cipher: aes::Cipher,
        rng: fake::Csrng,
        boot: hardware::fake::Boot,
    }

    impl Services {
        fn new() -> Self {
            Self {
                cipher: aes::Cipher::new(),
                rng: fake::Csrng::new(0x5eed),
                boot: hardware::fake::Boot::new(),
            }
        }

        fn peripheral<'a>(
            &'a mut self,
            config: &'a PeripheralConfig,
        ) -> Peripheral<'a> {
            Peripheral::new(Options {
                config,
                cipher: &mut self.cipher,
                rng: &mut self.rng,
                boot: &mut self.boot,
            })
        }
    }

    /// Runs key agreement by hand, steering the peripheral to `KEY`.
    fn agree(
        p: &mut Peripheral,
        bus: &mut SimBus,
        port: &mut SimPort,
        secrets: &PeripheralSecrets,
    ) {
        let r = [0x33; VALUE_LEN];
        let probe = Message {
            kind: Kind::Probe,
            value: xor(&r, &secrets.seed.0),
        };
        bus.send(addr(), &probe.encode()).unwrap();
        assert_eq!(p.poll(port).unwrap(), Event::KeyExchange);

        let mut buf = [0; FRAME_LEN];
        let n = bus.receive(addr(), BUDGET, &mut buf).unwrap();
        let reply = Message::parse(&buf[..n]).unwrap();
        assert_eq!(reply.kind, Kind::Contribution);
        let q = xor(&reply.value, &r);
        assert_eq!(q, xor(&secrets.share.0, &secrets.tag.0));

        let complement = Message {
            kind: Kind::Complement,
            value: xor(&xor(&KEY, &q), &xor(&r, &secrets.tag.0)),
        };
        bus.send(addr(), &complement.encode()).unwrap();
        assert_eq!(p.poll(port).unwrap(), Event::KeyAgreed);
        assert!(p.has_session_key());
    }

    /// Sends a sealed frame about `identity` to the peripheral.
    fn send_frame(bus: &mut SimBus, opcode: Opcode, identity: Identity) {
        let mut side = Side::new(1);
        let mut ch =
            Channel::new(&side.key, &mut side.cipher, &mut side.rng, BUDGET);
        let exchange = ch.begin(identity).unwrap();
        ch.send(&mut Addressed::new(bus, addr()), opcode, &exchange, &[])
            .unwrap();
    }

    fn assert_silent(bus: &mut SimBus) {
        let mut buf = [0; FRAME_LEN];
        assert_eq!(
            bus.receive(addr(), Budget::new(1), &mut buf),
            Err(net::Error::Timeout)
        );
    }

    #[test]
    fn scan_and_idle() {
        let config = config();
        let mut services = Services::new();
        let mut p = services.peripheral(&config);
        let mut bus = SimBus::new();
        let mut port = bus.attach(addr());

        assert_eq!(p.poll(&mut port).unwrap(), Event::Idle);

        bus.send(addr(), &scan::PROBE).unwrap();
        assert_eq!(p.poll(&mut port).unwrap(), Event::Scanned);
        let mut buf = [0; FRAME_LEN];
        let n = bus.receive(addr(), BUDGET, &mut buf).unwrap();
        assert_eq!(&buf[..n], &scan::Reply { identity: ME }.encode()[..]);

        bus.send(addr(), b"junk").unwrap();
        assert_eq!(p.poll(&mut port).unwrap(), Event::Ignored);
        assert_silent(&mut bus);
    }

    #[test]
    fn sealed_frame_without_key() {
        let config = config();
        let mut services = Services::new();
        let mut p = services.peripheral(&config);
        let mut bus = SimBus::new();
        let mut port = bus.attach(addr());

        send_frame(&mut bus, Opcode::Validate, ME);
        assert_eq!(p.poll(&mut port).unwrap(), Event::Ignored);
        assert_silent(&mut bus);
        assert!(!p.is_booted());
    }

    #[test]
    fn frames_about_someone_else() {
        let config = config();
        let mut services = Services::new();
        let mut p = services.peripheral(&config);
        let mut bus = SimBus::new();
        let mut port = bus.attach(addr());
        agree(&mut p, &mut bus, &mut port, &config.secrets);

        send_frame(&mut bus, Opcode::Validate, Identity(0x11111125));
        assert_eq!(p.poll(&mut port).unwrap(), Event::Ignored);
        assert_silent(&mut bus);
        assert!(!p.is_booted());
    }

    #[test]
    fn unexpected_opcodes() {
        let config = config();
        let mut services = Services::new();
        let mut p = services.peripheral(&config);
        let mut bus = SimBus::new();
        let mut port = bus.attach(addr());
        agree(&mut p, &mut bus, &mut port, &config.secrets);

        for &op in &[Opcode::Boot, Opcode::SecureValidate, Opcode::SecureData] {
            send_frame(&mut bus, op, ME);
            assert_eq!(p.poll(&mut port).unwrap(), Event::Ignored, "{:?}", op);
            assert_silent(&mut bus);
        }
        assert!(!p.is_booted());
        assert_eq!(
            p.secure_send(&mut port, b"hi").unwrap_err().into_inner(),
            Error::NotBooted
        );
    }

    #[test]
    fn unknown_opcode() {
        let config = config();
        let mut services = Services::new();
        let mut p = services.peripheral(&config);
        let mut bus = SimBus::new();
        let mut port = bus.attach(addr());
        agree(&mut p, &mut bus, &mut port, &config.secrets);

        let mut packet = [0; FRAME_LEN];
        packet[0] = 0x7f;
        packet[1..5].copy_from_slice(&ME.0.to_be_bytes());
        aes::Cipher::new().encrypt(&KEY, &mut packet).unwrap();
        bus.send(addr(), &packet).unwrap();

        assert_eq!(p.poll(&mut port).unwrap(), Event::Ignored);
        assert_silent(&mut bus);
    }

    #[test]
    fn validate_boots_once() {
        let config = config();
        let mut services = Services::new();
        let boot = services.boot.clone();
        let mut p = services.peripheral(&config);
        let mut bus = SimBus::new();
        let mut port = bus.attach(addr());
        agree(&mut p, &mut bus, &mut port, &config.secrets);

        let mut side = Side::new(2);
        for _ in 0..2 {
            let mut ch =
                Channel::new(&side.key, &mut side.cipher, &mut side.rng, BUDGET);
            let exchange = ch.begin(ME).unwrap();
            let mut link = Addressed::new(&mut bus, addr());
            ch.send(&mut link, Opcode::Validate, &exchange, &[]).unwrap();
            drop(link);

            assert_eq!(p.poll(&mut port).unwrap(), Event::Booted);
            let reply = ch.receive(&mut Addressed::new(&mut bus, addr())).unwrap();
            assert_eq!(reply.opcode, Opcode::Boot);
            assert!(reply.z.matches(&exchange.z));
            assert_eq!(reply.payload(), b"online");
        }
        assert!(p.is_booted());
        assert_eq!(boot.count(), 1);
    }
}
