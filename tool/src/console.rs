// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! An operator console for a simulated board.
//!
//! Every peripheral in the deployment runs on its own thread, attached to a
//! simulated bus; the controller reads commands from stdin.

use std::io;
use std::path::PathBuf;
use std::thread;

use boardlock::crypto::aes;
use boardlock::crypto::ring;
use boardlock::hardware::NoBoot;
use boardlock::net;
use boardlock::net::sim::SimBus;
use boardlock::net::sim::SimPort;
use boardlock::net::Identity;
use boardlock::orchestrator;
use boardlock::orchestrator::console::Console as _;
use boardlock::orchestrator::console::Level;
use boardlock::orchestrator::console::Terminal;
use boardlock::orchestrator::controller;
use boardlock::orchestrator::controller::Controller;
use boardlock::orchestrator::controller::State;
use boardlock::orchestrator::options::PeripheralConfig;
use boardlock::orchestrator::peripheral;
use boardlock::orchestrator::peripheral::Event;
use boardlock::orchestrator::peripheral::Peripheral;
use boardlock::roster::FlashStore;

use crate::deployment::Deployment;
use crate::flash::FileFlash;

/// Runs an interactive console against a simulated board.
#[derive(structopt::StructOpt)]
pub struct Console {
    /// The deployment file, as generated by `provision`.
    #[structopt(short = "d", long, parse(from_os_str))]
    deployment: PathBuf,

    /// A file holding the controller's flash; the roster persists there
    /// between runs. Defaults to a fresh, in-memory flash.
    #[structopt(long, parse(from_os_str))]
    flash: Option<PathBuf>,

    /// Identities of components that are not plugged in. Spares that are
    /// not on the roster are plugged in unless listed here.
    #[structopt(long = "absent", parse(try_from_str = parse_hex))]
    absent: Vec<Identity>,
}

fn parse_hex(s: &str) -> Result<Identity, String> {
    Identity::parse_hex(s).ok_or_else(|| format!("bad identity: {}", s))
}

impl Console {
    pub fn run(self) {
        let d: Deployment = crate::util::read_json(Some(&self.deployment));
        let config = check!(d.controller_config(), "invalid deployment");

        let mut bus = SimBus::new();
        let mut threads = Vec::new();
        for p in &d.peripherals {
            if self.absent.contains(&p.id) {
                continue;
            }
            let pc = check!(d.peripheral_config(p), "invalid peripheral {}", p.id);
            let addr = check!(
                p.id.address().ok_or("reserved address"),
                "cannot attach {}",
                p.id
            );
            let port = bus.attach(addr);
            threads.push(thread::spawn(move || run_peripheral(pc, port)));
        }

        let flash = check!(FileFlash::open(self.flash), "failed to open flash");
        let mut store = check!(
            FlashStore::new(flash, ring::hash::Engine::new()),
            "failed to set up roster storage"
        );
        let mut cipher = aes::Cipher::new();
        let mut rng = ring::csrng::Csrng::new();
        let mut boot = NoBoot;
        let mut controller = check!(
            Controller::new(controller::Options {
                config: &config,
                store: &mut store,
                cipher: &mut cipher,
                rng: &mut rng,
                boot: &mut boot,
            }),
            "failed to start controller"
        );

        let stdin = io::stdin();
        let mut term = Terminal::new(stdin.lock(), io::stdout());
        term.status(Level::Info, format_args!("Application Processor Started"));
        loop {
            let mut buf = [0; 256];
            let line = match term.prompt("Enter Command: ", &mut buf) {
                Some(line) => line.to_string(),
                None => break,
            };

            if controller.state() == State::Booted {
                if let Some(rest) = line.strip_prefix("send ") {
                    secure_send(&mut controller, &mut bus, &mut term, rest);
                    continue;
                }
            }
            // Failures have already been reported on the console.
            let _ = controller.run_command(&line, &mut bus, &mut term);
        }

        drop(controller);
        drop(bus);
        for t in threads {
            let _ = t.join();
        }
    }
}

/// Handles `send <id> <message>`, once booted.
fn secure_send(
    controller: &mut Controller,
    bus: &mut SimBus,
    term: &mut dyn boardlock::orchestrator::console::Console,
    args: &str,
) {
    let mut parts = args.trim().splitn(2, ' ');
    let id = parts.next().and_then(Identity::parse_hex);
    let msg = parts.next().unwrap_or("");
    let id = match id {
        Some(id) => id,
        None => {
            term.status(Level::Error, format_args!("Secure Send: bad identity"));
            return;
        }
    };

    match controller.secure_send(bus, id, msg.as_bytes()) {
        Ok(_) => term.status(Level::Success, format_args!("Secure Send Success")),
        Err(e) => term.status(
            Level::Error,
            format_args!("Secure Send: {}", e.as_ref()),
        ),
    }
}

/// Runs a peripheral until the bus goes away.
fn run_peripheral(config: PeripheralConfig, mut port: SimPort) {
    let id = config.identity;
    let mut cipher = aes::Cipher::new();
    let mut rng = ring::csrng::Csrng::new();
    let mut boot = NoBoot;
    let mut p = Peripheral::new(peripheral::Options {
        config: &config,
        cipher: &mut cipher,
        rng: &mut rng,
        boot: &mut boot,
    });

    loop {
        match p.poll(&mut port) {
            Ok(Event::Booted) => log::info!("{}: booted", id),
            Ok(Event::Received(_)) => log::info!(
                "{}: received {:?}",
                id,
                String::from_utf8_lossy(p.message())
            ),
            Ok(_) => {}
            Err(e) => {
                let e = e.into_inner();
                if e == orchestrator::Error::Transport(net::Error::Disconnected) {
                    return;
                }
                log::warn!("{}: {}", id, e);
            }
        }
    }
}
