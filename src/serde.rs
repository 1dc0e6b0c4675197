// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! Internal `serde` helpers.

use core::fmt;
use core::fmt::LowerHex;
use core::fmt::Write as _;
use core::marker::PhantomData;

use serde::de;
use serde::Deserializer;
use serde::Serializer;

/// No-std helper for using as a `write!()` target.
struct ArrayBuf<const N: usize>([u8; N], usize);

impl<const N: usize> AsRef<str> for ArrayBuf<N> {
    fn as_ref(&self) -> &str {
        // Only whole `str`s are ever written in.
        core::str::from_utf8(&self.0[..self.1]).unwrap_or("")
    }
}

impl<const N: usize> Default for ArrayBuf<N> {
    fn default() -> Self {
        Self([0; N], 0)
    }
}

impl<const N: usize> fmt::Write for ArrayBuf<N> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let bytes = s.as_bytes();
        let space_left = N - self.1;
        if space_left < bytes.len() {
            return Err(fmt::Error);
        }

        self.0[self.1..self.1 + bytes.len()].copy_from_slice(bytes);
        self.1 += bytes.len();
        Ok(())
    }
}

/// Helper for `de_radix`.
pub struct Radix<T>(PhantomData<T>);

macro_rules! impl_radix {
    ($($ty:ident)*) => {$(
        impl<'de> de::Visitor<'de> for Radix<$ty> {
            type Value = $ty;

            fn expecting(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
                write!(f, "integer between 0 and {}", $ty::MAX)
            }

            fn visit_str<E>(self, s: &str) -> Result<$ty, E>
                where E: de::Error,
            {
                let int = if s.starts_with("0b") || s.starts_with("0B") {
                    $ty::from_str_radix(&s[2..], 2)
                }
                else if s.starts_with("0o") || s.starts_with("0O") {
                    $ty::from_str_radix(&s[2..], 8)
                }
                else if s.starts_with("0x") || s.starts_with("0X") {
                    $ty::from_str_radix(&s[2..], 16)
                } else {
                    $ty::from_str_radix(s, 10)
                };

                int.map_err(E::custom)
            }

            fn visit_u64<E>(self, n: u64) -> Result<$ty, E>
                where E: de::Error,
            {
                if n <= $ty::MAX as u64 {
                    Ok(n as $ty)
                } else {
                    let msg = concat!("integer between 0 and ", stringify!($ty), "::MAX");
                    Err(E::invalid_value(de::Unexpected::Unsigned(n), &msg))
                }
            }
        }
    )*}
}
impl_radix! {
    u32
}

/// Deserializes an integer from either a string (which supports hex encoding)
/// or a normal integer.
///
/// Unfortunately, the way this is implemented breaks non-self-describing
/// formats, but Serde support isn't really intended for that anways.
pub fn de_radix<'de, D, T>(d: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    Radix<T>: de::Visitor<'de, Value = T>,
{
    d.deserialize_any(Radix::<T>(PhantomData))
}

/// Serializes an integer as zero-padded, eight-digit hex.
pub fn se_hex<S, X>(x: X, s: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
    X: LowerHex,
{
    let mut buf = ArrayBuf::<18>::default();
    let _ = write!(buf, "0x{:08x}", x);
    s.serialize_str(buf.as_ref())
}

/// Helper for `de_hex_array`.
struct HexArray<const N: usize>;

impl<'de, const N: usize> de::Visitor<'de> for HexArray<N> {
    type Value = [u8; N];

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "a string of {} hex digits", 2 * N)
    }

    fn visit_str<E>(self, s: &str) -> Result<[u8; N], E>
    where
        E: de::Error,
    {
        let digits = s.strip_prefix("0x").unwrap_or(s).as_bytes();
        if digits.len() != 2 * N {
            return Err(E::invalid_length(digits.len(), &self));
        }

        let mut out = [0; N];
        for (byte, pair) in out.iter_mut().zip(digits.chunks_exact(2)) {
            let pair = core::str::from_utf8(pair)
                .map_err(|_| E::invalid_value(de::Unexpected::Str(s), &self))?;
            *byte = u8::from_str_radix(pair, 16)
                .map_err(|_| E::invalid_value(de::Unexpected::Str(s), &self))?;
        }
        Ok(out)
    }
}

/// Deserializes a byte array from a hex string, with an optional `0x`.
pub fn de_hex_array<'de, D, const N: usize>(d: D) -> Result<[u8; N], D::Error>
where
    D: Deserializer<'de>,
{
    d.deserialize_str(HexArray::<N>)
}

/// Serializes a byte array as a hex string.
///
/// Arrays longer than 64 bytes are not supported.
pub fn se_hex_array<S, const N: usize>(
    bytes: &[u8; N],
    s: S,
) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let mut buf = ArrayBuf::<128>::default();
    for byte in bytes {
        let _ = write!(buf, "{:02x}", byte);
    }
    s.serialize_str(buf.as_ref())
}
