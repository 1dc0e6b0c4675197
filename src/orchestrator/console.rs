// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! The operator console.
//!
//! Status lines use the host-messaging framing: the level, a colon, and the
//! message, between a pair of `%`s, e.g. `%success: List%`. A prompt for
//! input is followed by a bare `%ack%` line, which tells the host side it may
//! send the next line.

use core::fmt;

/// The severity of a status line.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Level {
    /// The terminal status of a successful command.
    Success,
    /// The terminal status of a failed command.
    Error,
    /// An informational line, such as a discovered component.
    Info,
    /// A diagnostic line.
    Debug,
}

impl Level {
    /// Returns the tag this level is framed with.
    pub fn tag(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
            Self::Info => "info",
            Self::Debug => "debug",
        }
    }
}

/// An operator console.
pub trait Console {
    /// Prints a status line.
    fn status(&mut self, level: Level, msg: fmt::Arguments);

    /// Prints `prompt` and reads one line of input into `buf`.
    ///
    /// The line is returned without its terminator. Returns `None` if no
    /// line could be read, or if it did not fit in `buf`.
    fn prompt<'b>(&mut self, prompt: &str, buf: &'b mut [u8])
        -> Option<&'b str>;
}
impl dyn Console {} // Ensure object-safe.

impl<C: Console + ?Sized> Console for &mut C {
    fn status(&mut self, level: Level, msg: fmt::Arguments) {
        C::status(*self, level, msg)
    }

    fn prompt<'b>(
        &mut self,
        prompt: &str,
        buf: &'b mut [u8],
    ) -> Option<&'b str> {
        C::prompt(*self, prompt, buf)
    }
}

/// A [`Console`] over a pair of standard streams.
///
/// Requires the `std` feature flag to be enabled.
#[cfg(feature = "std")]
pub struct Terminal<R, W> {
    input: R,
    output: W,
}

#[cfg(feature = "std")]
impl<R: std::io::BufRead, W: std::io::Write> Terminal<R, W> {
    /// Creates a new `Terminal`.
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }
}

#[cfg(feature = "std")]
impl<R: std::io::BufRead, W: std::io::Write> Console for Terminal<R, W> {
    fn status(&mut self, level: Level, msg: fmt::Arguments) {
        // There is nowhere to report a broken console to.
        let _ = writeln!(self.output, "%{}: {}%", level.tag(), msg);
        let _ = self.output.flush();
    }

    fn prompt<'b>(
        &mut self,
        prompt: &str,
        buf: &'b mut [u8],
    ) -> Option<&'b str> {
        let _ = writeln!(self.output, "%debug: {}%", prompt);
        let _ = writeln!(self.output, "%ack%");
        let _ = self.output.flush();

        let mut line = String::new();
        if self.input.read_line(&mut line).ok()? == 0 {
            return None;
        }
        let line = line.trim_end_matches(&['\r', '\n'][..]).as_bytes();
        let dest = buf.get_mut(..line.len())?;
        dest.copy_from_slice(line);
        core::str::from_utf8(dest).ok()
    }
}
