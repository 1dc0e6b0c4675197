// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! A file-backed flash device, so that the roster survives between runs.

use std::fs;
use std::io;
use std::path::PathBuf;

use boardlock::hardware::flash;
use boardlock::hardware::flash::Flash;
use boardlock::hardware::flash::Ptr;
use boardlock::hardware::flash::RamMut;
use boardlock::hardware::flash::Region;
use boardlock::hardware::flash::ERASED;
use boardlock::roster::SLOTS;
use boardlock::roster::SLOT_LEN;

/// A [`Flash`] held in memory, and written back to a file on every flush.
pub struct FileFlash {
    ram: RamMut<Vec<u8>>,
    path: Option<PathBuf>,
}

impl FileFlash {
    /// Opens the flash image at `path`, creating an erased one if it does
    /// not exist yet. With no path, the image only lives in memory.
    pub fn open(path: Option<PathBuf>) -> io::Result<Self> {
        let len = (SLOTS * SLOT_LEN) as usize;
        let mut bytes = match &path {
            Some(path) if path.exists() => fs::read(path)?,
            _ => Vec::new(),
        };
        bytes.resize(len, ERASED);
        Ok(Self {
            ram: RamMut(bytes),
            path,
        })
    }
}

impl Flash for FileFlash {
    fn size(&self) -> Result<u32, flash::Error> {
        self.ram.size()
    }

    fn read(&self, offset: Ptr, out: &mut [u8]) -> Result<(), flash::Error> {
        self.ram.read(offset, out)
    }

    fn program(&mut self, offset: Ptr, buf: &[u8]) -> Result<(), flash::Error> {
        self.ram.program(offset, buf)
    }

    fn erase(&mut self, region: Region) -> Result<(), flash::Error> {
        self.ram.erase(region)
    }

    fn flush(&mut self) -> Result<(), flash::Error> {
        if let Some(path) = &self.path {
            fs::write(path, &self.ram.0).map_err(|e| {
                log::error!("could not write {}: {}", path.display(), e);
                flash::Error::Unspecified
            })?;
        }
        Ok(())
    }
}
