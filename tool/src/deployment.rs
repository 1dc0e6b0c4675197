// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! The JSON description of a deployment: one controller, and every
//! peripheral it may ever be paired with.

use arrayvec::ArrayVec;
use serde::Deserialize;
use serde::Serialize;

use boardlock::net::Budget;
use boardlock::net::Identity;
use boardlock::orchestrator::options::BootMessage;
use boardlock::orchestrator::options::ControllerConfig;
use boardlock::orchestrator::options::Credential;
use boardlock::orchestrator::options::PeripheralConfig;
use boardlock::protocol::attest::Attestation;
use boardlock::roster::Roster;
use boardlock::session::ControllerSecrets;
use boardlock::session::PeripheralSecrets;
use boardlock::session::Share;

/// A complete deployment.
#[derive(Clone, Serialize, Deserialize)]
pub struct Deployment {
    /// The blinding seed shared by every principal.
    pub seed: Share,
    /// The controller.
    pub controller: Controller,
    /// Every peripheral, provisioned or spare.
    pub peripherals: Vec<Peripheral>,
}

/// A controller's provisioning data.
#[derive(Clone, Serialize, Deserialize)]
pub struct Controller {
    /// The controller's share.
    pub share: Share,
    /// The PIN guarding `attest`.
    pub pin: String,
    /// The token guarding `replace`.
    pub token: String,
    /// Printed as `AP>...` on boot.
    pub boot_message: String,
    /// The roster installed on first boot.
    pub roster: Vec<Identity>,
    /// Polls to wait for a reply to an authenticated command.
    #[serde(default = "default_polls")]
    pub budget: u32,
    /// Polls to wait for each discovery reply.
    #[serde(default = "default_polls")]
    pub scan_budget: u32,
}

/// A peripheral's provisioning data.
#[derive(Clone, Serialize, Deserialize)]
pub struct Peripheral {
    /// The peripheral's identity; its low byte is its bus address.
    pub id: Identity,
    /// The peripheral's share.
    pub share: Share,
    /// The peripheral's tag, also held by the controller.
    pub tag: Share,
    /// Returned to the controller on boot.
    pub boot_message: String,
    /// Attestation: place of manufacture.
    pub location: String,
    /// Attestation: date of manufacture.
    pub date: String,
    /// Attestation: customer.
    pub customer: String,
    /// Polls to wait for each packet from the controller.
    #[serde(default = "default_polls")]
    pub budget: u32,
}

fn default_polls() -> u32 {
    Budget::default().polls
}

fn boot_message(s: &str) -> Result<BootMessage, String> {
    BootMessage::from(s).map_err(|_| format!("boot message too long: {:?}", s))
}

impl Deployment {
    /// Builds the controller's configuration.
    ///
    /// The controller holds a tag for every peripheral in the deployment,
    /// so that spares can be swapped in with `replace`.
    pub fn controller_config(&self) -> Result<ControllerConfig, String> {
        let c = &self.controller;
        let mut tags = ArrayVec::new();
        for p in &self.peripherals {
            tags.try_push((p.id, p.tag.clone()))
                .map_err(|_| "too many peripherals".to_string())?;
        }

        let default_roster = Roster::from_ids(&c.roster)
            .map_err(|e| format!("invalid roster: {:?}", e.into_inner()))?;

        Ok(ControllerConfig {
            secrets: ControllerSecrets {
                seed: self.seed.clone(),
                share: c.share.clone(),
                tags,
            },
            pin: Credential::new(&c.pin).ok_or("PIN too long")?,
            token: Credential::new(&c.token).ok_or("token too long")?,
            boot_message: boot_message(&c.boot_message)?,
            default_roster,
            budget: Budget::new(c.budget),
            scan_budget: Budget::new(c.scan_budget),
        })
    }

    /// Builds a peripheral's configuration.
    pub fn peripheral_config(
        &self,
        p: &Peripheral,
    ) -> Result<PeripheralConfig, String> {
        Ok(PeripheralConfig {
            identity: p.id,
            secrets: PeripheralSecrets {
                seed: self.seed.clone(),
                share: p.share.clone(),
                tag: p.tag.clone(),
            },
            boot_message: boot_message(&p.boot_message)?,
            attestation: Attestation::new(&p.location, &p.date, &p.customer)
                .ok_or("attestation field too long")?,
            budget: Budget::new(p.budget),
        })
    }
}
