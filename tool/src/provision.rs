// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! Generation of fresh deployments.

use std::path::PathBuf;

use boardlock::crypto::csrng::Csrng as _;
use boardlock::crypto::ring;
use boardlock::net::Budget;
use boardlock::net::Identity;
use boardlock::session::Share;

use crate::deployment;
use crate::deployment::Deployment;

fn parse_identity(s: &str) -> Result<Identity, String> {
    let id = Identity::parse_hex(s).ok_or_else(|| format!("bad identity: {}", s))?;
    id.address()
        .ok_or_else(|| format!("{} maps to a reserved bus address", id))?;
    Ok(id)
}

/// Generates a deployment with fresh random secrets.
#[derive(structopt::StructOpt)]
pub struct Provision {
    /// Identities on the initial roster, in hex.
    #[structopt(long = "id", required = true, parse(try_from_str = parse_identity))]
    ids: Vec<Identity>,

    /// Identities of spare components, which may be swapped in later.
    #[structopt(long = "spare", parse(try_from_str = parse_identity))]
    spares: Vec<Identity>,

    /// The PIN guarding `attest`.
    #[structopt(long)]
    pin: String,

    /// The token guarding `replace`.
    #[structopt(long)]
    token: String,

    /// Attestation: place of manufacture.
    #[structopt(long, default_value = "Unknown")]
    location: String,

    /// Attestation: date of manufacture.
    #[structopt(long, default_value = "01/01/70")]
    date: String,

    /// Attestation: customer.
    #[structopt(long, default_value = "Unknown")]
    customer: String,

    /// Whether to pretty-print JSON output.
    #[structopt(long)]
    pretty: bool,

    /// Output file; defaults to stdout.
    #[structopt(short = "o", long, parse(from_os_str))]
    output: Option<PathBuf>,
}

impl Provision {
    pub fn run(self) {
        let mut rng = ring::csrng::Csrng::new();
        let mut share = || {
            let mut bytes = [0; 16];
            check!(rng.fill(&mut bytes), "failed to generate a secret");
            Share(bytes)
        };

        let peripherals = self
            .ids
            .iter()
            .chain(&self.spares)
            .map(|&id| deployment::Peripheral {
                id,
                share: share(),
                tag: share(),
                boot_message: format!("Component boot {}", id),
                location: self.location.clone(),
                date: self.date.clone(),
                customer: self.customer.clone(),
                budget: Budget::default().polls,
            })
            .collect::<Vec<_>>();

        let d = Deployment {
            seed: share(),
            controller: deployment::Controller {
                share: share(),
                pin: self.pin.clone(),
                token: self.token.clone(),
                boot_message: "Application Processor boot".to_string(),
                roster: self.ids.clone(),
                budget: Budget::default().polls,
                scan_budget: Budget::default().polls,
            },
            peripherals,
        };

        // Catch anything the controller would refuse at startup.
        check!(d.controller_config(), "invalid deployment");
        for p in &d.peripherals {
            check!(d.peripheral_config(p), "invalid peripheral {}", p.id);
        }

        crate::util::write_json(self.output, &d, self.pretty);
    }
}
