// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! Attestation metadata, carried in the payload of an
//! [`Opcode::Attest`](super::Opcode::Attest) reply.
//!
//! Each field is a length-prefixed UTF-8 string of at most [`MAX_FIELD_LEN`]
//! bytes.

use arrayvec::ArrayString;

use crate::io::Read;
use crate::io::Write;
use crate::protocol::wire;
use crate::protocol::wire::FromWire;
use crate::protocol::wire::ToWire;

/// The longest a single attestation field may be.
pub const MAX_FIELD_LEN: usize = 64;

/// A single attestation field.
pub type Field = ArrayString<MAX_FIELD_LEN>;

/// A peripheral's attestation metadata.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
pub struct Attestation {
    /// Where the component was manufactured.
    pub location: Field,
    /// When the component was manufactured.
    pub date: Field,
    /// Who the component was manufactured for.
    pub customer: Field,
}

impl Attestation {
    /// Creates a new `Attestation`.
    ///
    /// Returns `None` if any field is too long.
    pub fn new(location: &str, date: &str, customer: &str) -> Option<Self> {
        Some(Self {
            location: Field::from(location).ok()?,
            date: Field::from(date).ok()?,
            customer: Field::from(customer).ok()?,
        })
    }
}

fn read_field<R: Read>(r: &mut R) -> Result<Field, wire::Error> {
    let len = r.read_be::<u8>()? as usize;
    if len > MAX_FIELD_LEN {
        return Err(wire::Error::OutOfRange);
    }
    let mut buf = [0; MAX_FIELD_LEN];
    r.read_bytes(&mut buf[..len])?;
    let s = core::str::from_utf8(&buf[..len])
        .map_err(|_| wire::Error::OutOfRange)?;
    Field::from(s).map_err(|_| wire::Error::OutOfRange)
}

fn write_field<W: Write>(w: &mut W, field: &Field) -> Result<(), wire::Error> {
    w.write_be(field.len() as u8)?;
    w.write_bytes(field.as_bytes())?;
    Ok(())
}

impl FromWire for Attestation {
    fn from_wire<R: Read>(mut r: R) -> Result<Self, wire::Error> {
        Ok(Self {
            location: read_field(&mut r)?,
            date: read_field(&mut r)?,
            customer: read_field(&mut r)?,
        })
    }
}

impl ToWire for Attestation {
    fn to_wire<W: Write>(&self, mut w: W) -> Result<(), wire::Error> {
        write_field(&mut w, &self.location)?;
        write_field(&mut w, &self.date)?;
        write_field(&mut w, &self.customer)?;
        Ok(())
    }
}
