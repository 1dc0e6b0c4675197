// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! I/O utilities.

use std::fs::File;
use std::io;
use std::io::BufReader;
use std::io::Read;
use std::io::Write;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Like `?`, but crashes the binary with a nice error message.
macro_rules! check {
    ($result:expr, $fmt:literal $(, $args:expr)* $(,)?) => {
        match $result {
            Ok(x) => x,
            Err(e) => {
                eprintln!("error: {}: {:?}", format_args!($fmt, $($args,)*), e);
                std::process::exit(2)
            }
        }
    }
}

/// Opens the given input file, or stdin if there is none.
pub fn input(path: Option<impl AsRef<Path>>) -> Box<dyn Read> {
    match path {
        Some(path) => {
            let file = check!(File::open(path), "failed to open input file");
            Box::new(BufReader::new(file))
        }
        None => Box::new(io::stdin()),
    }
}

/// Opens the given output file, or stdout if there is none.
pub fn output(path: Option<impl AsRef<Path>>) -> Box<dyn Write> {
    match path {
        Some(path) => {
            let file = check!(File::create(path), "failed to open output file");
            Box::new(file)
        }
        None => Box::new(io::stdout()),
    }
}

/// Reads a JSON value from the given file, or stdin.
pub fn read_json<T: DeserializeOwned>(path: Option<impl AsRef<Path>>) -> T {
    check!(serde_json::from_reader(input(path)), "failed to parse JSON")
}

/// Writes a JSON value to the given file, or stdout.
pub fn write_json<T: Serialize>(
    path: Option<impl AsRef<Path>>,
    value: &T,
    pretty: bool,
) {
    let mut w = output(path);
    let r = match pretty {
        true => serde_json::to_writer_pretty(&mut w, value),
        false => serde_json::to_writer(&mut w, value),
    };
    check!(r, "failed to serialize JSON");
    check!(writeln!(w), "failed to write output");
}
