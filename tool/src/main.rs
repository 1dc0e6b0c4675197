// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! `boardlock-tool` is a simple command-line tool for provisioning
//! `boardlock` deployments, and for driving one on a simulated bus.

#![deny(missing_docs)]
#![deny(unsafe_code)]

use structopt::StructOpt as _;

#[macro_use]
mod util;

mod console;
mod deployment;
mod flash;
mod provision;

/// A command-line tool for working with boardlock deployments.
#[allow(missing_docs)]
#[derive(structopt::StructOpt)]
#[structopt(author)]
enum CliCommand {
    /// Generates a deployment with fresh secrets.
    Provision(provision::Provision),
    /// Runs an operator console against a simulated board.
    Console(console::Console),
}

fn main() {
    env_logger::init();
    match CliCommand::from_args() {
        CliCommand::Provision(p) => p.run(),
        CliCommand::Console(c) => c.run(),
    }
}
