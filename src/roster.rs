// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! The roster of authorized peripherals, and its persistence.
//!
//! A [`Roster`] is an ordered list of unique, addressable [`Identity`]s. It
//! is only ever changed by [`Roster::replace()`], and every change must be
//! persisted through a [`Store`] before it is committed in memory.
//!
//! [`FlashStore`] persists a roster in two fixed-size slots of a [`Flash`]
//! device. Each save erases and rewrites the slot that does *not* hold the
//! current record, so the current record survives a power loss at any point
//! in the save:
//! ```text
//! magic (4) || seq (4) || count (4) || ids (4 * MAX_ENTRIES) || sha256 (32)
//! ```
//! All integers are big-endian. A slot is valid if its magic and digest
//! check out; on load, the valid slot with the highest sequence number wins.

use arrayvec::ArrayVec;
use static_assertions::const_assert;

use crate::crypto::hash;
use crate::hardware::flash;
use crate::hardware::flash::Flash;
use crate::hardware::flash::FlashIo;
use crate::hardware::flash::Ptr;
use crate::hardware::flash::Region;
use crate::hardware::flash::SubFlash;
use crate::io::Cursor;
use crate::io::Read as _;
use crate::io::Write as _;
use crate::net::Identity;
use crate::Result;

/// The largest number of entries a roster may hold.
pub const MAX_ENTRIES: usize = 32;

/// The marker at the start of every valid record.
pub const MAGIC: u32 = 0xdeadbeef;

/// The size of one record slot, in bytes.
pub const SLOT_LEN: u32 = 256;

/// The number of record slots.
pub const SLOTS: u32 = 2;

const BODY_LEN: usize = 4 + 4 + 4 + 4 * MAX_ENTRIES;
const DIGEST_LEN: usize = hash::Algo::Sha256.bytes();
const RECORD_LEN: usize = BODY_LEN + DIGEST_LEN;
const_assert!(RECORD_LEN <= SLOT_LEN as usize);

/// A roster error.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Error {
    /// Indicates that the roster already holds [`MAX_ENTRIES`] entries.
    Full,
    /// Indicates an identity that is already on the roster.
    Duplicate(Identity),
    /// Indicates an identity that is not on the roster.
    NotFound(Identity),
    /// Indicates an identity that does not map to a usable bus address.
    Unaddressable(Identity),
    /// Indicates that the backing flash failed.
    Flash(flash::Error),
    /// Indicates that the backing flash is too small for the record slots.
    TooSmall,
    /// Indicates that the record digest could not be computed.
    Hash(hash::Error),
}

impl From<hash::Error> for Error {
    fn from(e: hash::Error) -> Self {
        Self::Hash(e)
    }
}

debug_from!(Error => hash::Error);

/// The list of peripherals a controller is authorized to boot with.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct Roster {
    ids: ArrayVec<Identity, MAX_ENTRIES>,
}

impl Roster {
    /// Creates an empty `Roster`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a `Roster` out of a list of identities.
    pub fn from_ids(ids: &[Identity]) -> Result<Self, Error> {
        let mut roster = Self::new();
        for &id in ids {
            roster.push(id)?;
        }
        Ok(roster)
    }

    /// Returns the identities on this roster, in order.
    pub fn ids(&self) -> &[Identity] {
        &self.ids
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Returns whether there are no entries.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Returns whether `id` is on this roster.
    pub fn contains(&self, id: Identity) -> bool {
        self.ids.contains(&id)
    }

    /// Replaces `out` with `new`, in the same position.
    ///
    /// On error, the roster is left unchanged.
    pub fn replace(&mut self, out: Identity, new: Identity) -> Result<(), Error> {
        let idx = self
            .ids
            .iter()
            .position(|&id| id == out)
            .ok_or_else(|| fail!(Error::NotFound(out)))?;
        check!(!self.contains(new), Error::Duplicate(new));
        check!(new.address().is_some(), Error::Unaddressable(new));

        self.ids[idx] = new;
        Ok(())
    }

    fn push(&mut self, id: Identity) -> Result<(), Error> {
        check!(!self.contains(id), Error::Duplicate(id));
        check!(id.address().is_some(), Error::Unaddressable(id));
        self.ids
            .try_push(id)
            .map_err(|_| fail!(Error::Full))
    }
}

/// Persistent storage for a [`Roster`].
pub trait Store {
    /// Loads the last roster saved, or `None` if storage is uninitialized.
    fn load(&mut self) -> Result<Option<Roster>, Error>;

    /// Saves `roster`.
    ///
    /// If this fails (or is interrupted), a later `load()` returns either the
    /// previous roster or `roster`, and never anything else.
    fn save(&mut self, roster: &Roster) -> Result<(), Error>;

    /// Loads the last roster saved; if there is none, saves `default` and
    /// returns it.
    fn load_or_init(&mut self, default: &Roster) -> Result<Roster, Error> {
        if let Some(roster) = self.load()? {
            return Ok(roster);
        }
        info!("roster storage uninitialized; installing default roster");
        self.save(default)?;
        Ok(default.clone())
    }
}
impl dyn Store {} // Ensure object-safe.

impl<S: Store + ?Sized> Store for &mut S {
    fn load(&mut self) -> Result<Option<Roster>, Error> {
        S::load(*self)
    }

    fn save(&mut self, roster: &Roster) -> Result<(), Error> {
        S::save(*self, roster)
    }
}

/// A [`Store`] that keeps two record slots at the start of a [`Flash`].
pub struct FlashStore<F, H> {
    flash: F,
    hasher: H,
    current: Option<(u32, u32)>,
}

impl<F: Flash, H: hash::Engine> FlashStore<F, H> {
    /// Creates a new `FlashStore` over `flash`, using `hasher` to check
    /// record integrity.
    pub fn new(flash: F, hasher: H) -> Result<Self, Error> {
        let size = flash.size().map_err(|e| fail!(Error::Flash(e)))?;
        check!(size >= SLOTS * SLOT_LEN, Error::TooSmall);
        Ok(Self {
            flash,
            hasher,
            current: None,
        })
    }

    /// Consumes this store, returning the underlying flash.
    pub fn into_inner(self) -> F {
        self.flash
    }

    fn slot(&mut self, index: u32) -> SubFlash<&mut F> {
        SubFlash(&mut self.flash, Region::new(index * SLOT_LEN, SLOT_LEN))
    }

    fn digest(&mut self, body: &[u8]) -> Result<[u8; DIGEST_LEN], Error> {
        let mut digest = [0; DIGEST_LEN];
        self.hasher
            .contiguous_hash(hash::Algo::Sha256, body, &mut digest)?;
        Ok(digest)
    }

    /// Reads the record in slot `index`, returning its sequence number and
    /// roster if it is valid.
    fn read_slot(&mut self, index: u32) -> Result<Option<(u32, Roster)>, Error> {
        let mut record = [0; RECORD_LEN];
        self.slot(index)
            .read(Ptr::new(0), &mut record)
            .map_err(|e| fail!(Error::Flash(e)))?;
        let (body, digest) = record.split_at(BODY_LEN);

        let mut r = body;
        let magic = r.read_be::<u32>().ok();
        if magic != Some(MAGIC) {
            trace!("roster slot {} holds no record", index);
            return Ok(None);
        }
        if self.digest(body)?[..] != *digest {
            warn!("roster slot {} is corrupt", index);
            return Ok(None);
        }

        Ok(decode_body(r).map(|(seq, roster)| {
            trace!("roster slot {}: seq {}, {} entries", index, seq, roster.len());
            (seq, roster)
        }))
    }
}

/// Decodes everything in a record body after the magic.
fn decode_body(mut r: &[u8]) -> Option<(u32, Roster)> {
    let seq = r.read_be::<u32>().ok()?;
    let count = r.read_be::<u32>().ok()? as usize;
    if count > MAX_ENTRIES {
        return None;
    }
    let mut roster = Roster::new();
    for _ in 0..count {
        let id = Identity(r.read_be::<u32>().ok()?);
        roster.push(id).ok()?;
    }
    Some((seq, roster))
}

impl<F: Flash, H: hash::Engine> Store for FlashStore<F, H> {
    fn load(&mut self) -> Result<Option<Roster>, Error> {
        let mut best: Option<(u32, u32, Roster)> = None;
        for index in 0..SLOTS {
            if let Some((seq, roster)) = self.read_slot(index)? {
                if best.as_ref().map_or(true, |(_, s, _)| seq > *s) {
                    best = Some((index, seq, roster));
                }
            }
        }

        Ok(best.map(|(index, seq, roster)| {
            self.current = Some((index, seq));
            roster
        }))
    }

    fn save(&mut self, roster: &Roster) -> Result<(), Error> {
        // Never overwrite a record this instance has not seen.
        if self.current.is_none() {
            self.load()?;
        }
        let (index, seq) = match self.current {
            Some((index, seq)) => ((index + 1) % SLOTS, seq.wrapping_add(1)),
            None => (0, 1),
        };

        let mut record = [0; RECORD_LEN];
        let mut cursor = Cursor::new(&mut record[..BODY_LEN]);
        let body_err = |_| fail!(Error::Flash(flash::Error::OutOfRange));
        cursor.write_be(MAGIC).map_err(body_err)?;
        cursor.write_be(seq).map_err(body_err)?;
        cursor.write_be(roster.len() as u32).map_err(body_err)?;
        for id in roster.ids() {
            cursor.write_be(id.0).map_err(body_err)?;
        }
        let digest = self.digest(&record[..BODY_LEN])?;
        record[BODY_LEN..].copy_from_slice(&digest);

        let mut slot = self.slot(index);
        slot.erase(Region::new(0, SLOT_LEN))
            .map_err(|e| fail!(Error::Flash(e)))?;
        // The digest goes in last; until it lands, the slot is invalid.
        let mut io = FlashIo::new(&mut slot).map_err(|e| fail!(Error::Flash(e)))?;
        let io_err = |_| fail!(Error::Flash(flash::Error::Unspecified));
        io.write_bytes(&record[..BODY_LEN]).map_err(io_err)?;
        io.write_bytes(&record[BODY_LEN..]).map_err(io_err)?;
        slot.flush().map_err(|e| fail!(Error::Flash(e)))?;

        info!("roster saved to slot {} (seq {})", index, seq);
        self.current = Some((index, seq));
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    use crate::crypto::ring;
    use crate::hardware::flash::fake::Faulty;
    use crate::hardware::flash::RamMut;

    fn roster(ids: &[u32]) -> Roster {
        let ids = ids.iter().copied().map(Identity).collect::<Vec<_>>();
        Roster::from_ids(&ids).unwrap()
    }

    #[test]
    fn uniqueness() {
        assert_eq!(
            Roster::from_ids(&[Identity(0x11111124), Identity(0x11111124)])
                .unwrap_err()
                .into_inner(),
            Error::Duplicate(Identity(0x11111124))
        );
        assert_eq!(
            Roster::from_ids(&[Identity(0x11111118)])
                .unwrap_err()
                .into_inner(),
            Error::Unaddressable(Identity(0x11111118))
        );
    }

    #[test]
    fn replace_in_place() {
        let mut r = roster(&[0x11111124, 0x11111125]);
        r.replace(Identity(0x11111125), Identity(0x22222222)).unwrap();
        assert_eq!(r, roster(&[0x11111124, 0x22222222]));

        let unchanged = r.clone();
        assert_eq!(
            r.replace(Identity(0x33333333), Identity(0x44444444))
                .unwrap_err()
                .into_inner(),
            Error::NotFound(Identity(0x33333333))
        );
        assert_eq!(
            r.replace(Identity(0x22222222), Identity(0x11111124))
                .unwrap_err()
                .into_inner(),
            Error::Duplicate(Identity(0x11111124))
        );
        assert_eq!(
            r.replace(Identity(0x22222222), Identity(0x12345636))
                .unwrap_err()
                .into_inner(),
            Error::Unaddressable(Identity(0x12345636))
        );
        assert_eq!(r, unchanged);
    }

    #[test]
    fn first_boot_and_reload() {
        let mut ram = RamMut(vec![flash::ERASED; 512]);
        let default = roster(&[0x11111124, 0x11111125]);

        let mut store = FlashStore::new(&mut ram, ring::hash::Engine::new()).unwrap();
        assert_eq!(store.load().unwrap(), None);
        assert_eq!(store.load_or_init(&default).unwrap(), default);

        let updated = roster(&[0x11111124, 0x22222222]);
        store.save(&updated).unwrap();
        store.save(&updated).unwrap();
        drop(store);

        let mut store = FlashStore::new(&mut ram, ring::hash::Engine::new()).unwrap();
        assert_eq!(store.load_or_init(&default).unwrap(), updated);
        assert_eq!(store.current, Some((0, 3)));
    }

    #[test]
    fn corrupt_slot_is_ignored() {
        let mut ram = RamMut(vec![flash::ERASED; 512]);
        let old = roster(&[0x11111124]);
        let new = roster(&[0x22222222]);

        let mut store = FlashStore::new(&mut ram, ring::hash::Engine::new()).unwrap();
        store.save(&old).unwrap();
        store.save(&new).unwrap();
        drop(store);

        // Flip a bit in one of the ids of the newer record.
        ram.0[SLOT_LEN as usize + 12] ^= 0x01;
        let mut store = FlashStore::new(&mut ram, ring::hash::Engine::new()).unwrap();
        assert_eq!(store.load().unwrap(), Some(old));
    }

    #[test]
    fn too_small() {
        let mut ram = RamMut(vec![flash::ERASED; 300]);
        assert_eq!(
            FlashStore::new(&mut ram, ring::hash::Engine::new())
                .err()
                .map(|e| e.into_inner()),
            Some(Error::TooSmall)
        );
    }

    #[test]
    fn save_is_crash_atomic() {
        let old = roster(&[0x11111124, 0x11111125]);
        let new = roster(&[0x11111124, 0x22222222]);

        // Exercise a power loss at every mutating operation of the second
        // save, over several generations so that both slots get overwritten.
        for generation in 0..3 {
            for k in 0.. {
                let mut flash = Faulty::new(512);
                let mut store =
                    FlashStore::new(&mut flash, ring::hash::Engine::new()).unwrap();
                for _ in 0..generation {
                    store.save(&new).unwrap();
                }
                store.save(&old).unwrap();

                store.flash.fail_at(k);
                let result = store.save(&new);
                let crashed = store.flash.is_dead();
                drop(store);
                flash.power_cycle();

                let mut store =
                    FlashStore::new(&mut flash, ring::hash::Engine::new()).unwrap();
                let loaded = store.load().unwrap();
                if crashed {
                    assert!(result.is_err());
                    assert!(
                        loaded == Some(old.clone()) || loaded == Some(new.clone()),
                        "generation {}, crash at op {}: {:?}",
                        generation,
                        k,
                        loaded
                    );
                } else {
                    result.unwrap();
                    assert_eq!(loaded, Some(new.clone()));
                    break;
                }
            }
        }
    }

    #[test]
    fn fresh_store_saves_past_existing_records() {
        let a = roster(&[0x11111124]);
        let b = roster(&[0x11111125]);
        let c = roster(&[0x22222222]);

        for k in 0.. {
            // Slot 0 holds `a` at seq 3; slot 1 holds the stale `b`.
            let mut flash = Faulty::new(512);
            let mut store =
                FlashStore::new(&mut flash, ring::hash::Engine::new()).unwrap();
            store.save(&a).unwrap();
            store.save(&b).unwrap();
            store.save(&a).unwrap();
            drop(store);

            let mut store =
                FlashStore::new(&mut flash, ring::hash::Engine::new()).unwrap();
            store.flash.fail_at(k);
            let result = store.save(&c);
            let crashed = store.flash.is_dead();
            drop(store);
            flash.power_cycle();

            let mut store =
                FlashStore::new(&mut flash, ring::hash::Engine::new()).unwrap();
            let loaded = store.load().unwrap();
            if crashed {
                assert!(result.is_err());
                assert_eq!(loaded, Some(a.clone()), "crash at op {}", k);
            } else {
                result.unwrap();
                assert_eq!(loaded, Some(c.clone()));
                assert_eq!(store.current, Some((1, 4)));
                break;
            }
        }
    }

    #[test]
    fn crash_on_first_save() {
        let default = roster(&[0x11111124]);
        let mut flash = Faulty::new(512);
        flash.fail_at(1);

        let mut store = FlashStore::new(&mut flash, ring::hash::Engine::new()).unwrap();
        assert!(store.load_or_init(&default).is_err());
        drop(store);
        flash.power_cycle();

        let mut store = FlashStore::new(&mut flash, ring::hash::Engine::new()).unwrap();
        assert_eq!(store.load().unwrap(), None);
        assert_eq!(store.load_or_init(&default).unwrap(), default);
    }
}
