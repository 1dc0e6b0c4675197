// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! A simulated bus, for tests and host-side tools.
//!
//! Each attached component gets a pair of bounded queues, one per direction,
//! standing in for the interrupt-fed transmit and receive buffers of a real
//! bus controller. Both ends poll their receive queue, sleeping for a fixed
//! interval between polls, until their [`Budget`] runs out.
//!
//! Requires the `std` feature flag to be enabled.

use std::collections::BTreeMap;
use std::sync::mpsc;
use std::sync::mpsc::Receiver;
use std::sync::mpsc::SyncSender;
use std::sync::mpsc::TryRecvError;
use std::sync::mpsc::TrySendError;
use std::thread;
use std::time::Duration;

use crate::net::Address;
use crate::net::Budget;
use crate::net::Bus;
use crate::net::Error;
use crate::net::Link;

/// How many packets may be queued in each direction.
pub const QUEUE_DEPTH: usize = 2;

/// The default delay between two polls.
pub const DEFAULT_INTERVAL: Duration = Duration::from_micros(50);

/// A record of one packet the controller put on the bus.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Transmission {
    /// The destination address.
    pub addr: Address,
    /// The length of the packet, in bytes.
    pub len: usize,
}

struct Wire {
    to_device: SyncSender<Vec<u8>>,
    from_device: Receiver<Vec<u8>>,
}

/// The controller side of a simulated bus.
pub struct SimBus {
    wires: BTreeMap<Address, Wire>,
    interval: Duration,
    log: Vec<Transmission>,
}

impl Default for SimBus {
    fn default() -> Self {
        Self::new()
    }
}

impl SimBus {
    /// Creates an empty bus, polling every [`DEFAULT_INTERVAL`].
    pub fn new() -> Self {
        Self::with_interval(DEFAULT_INTERVAL)
    }

    /// Creates an empty bus, polling every `interval`.
    pub fn with_interval(interval: Duration) -> Self {
        Self {
            wires: BTreeMap::new(),
            interval,
            log: Vec::new(),
        }
    }

    /// Attaches a new component at `addr`, returning its end of the bus.
    ///
    /// Any component previously attached at `addr` is disconnected.
    pub fn attach(&mut self, addr: Address) -> SimPort {
        let (to_device, inbox) = mpsc::sync_channel(QUEUE_DEPTH);
        let (outbox, from_device) = mpsc::sync_channel(QUEUE_DEPTH);
        self.wires.insert(
            addr,
            Wire {
                to_device,
                from_device,
            },
        );
        SimPort {
            addr,
            inbox,
            outbox,
            interval: self.interval,
        }
    }

    /// Detaches the component at `addr`, returning whether one was present.
    ///
    /// The component's [`SimPort`] observes [`Error::Disconnected`] once it
    /// has drained its queue.
    pub fn detach(&mut self, addr: Address) -> bool {
        self.wires.remove(&addr).is_some()
    }

    /// Returns every packet sent by the controller so far, in order.
    pub fn transmissions(&self) -> &[Transmission] {
        &self.log
    }

    /// Forgets every recorded transmission.
    pub fn clear_transmissions(&mut self) {
        self.log.clear();
    }
}

impl Bus for SimBus {
    fn send(&mut self, addr: Address, data: &[u8]) -> Result<(), Error> {
        let wire = self.wires.get(&addr).ok_or(Error::NoDevice)?;
        // A new request supersedes any reply that arrived too late.
        while wire.from_device.try_recv().is_ok() {
            trace!("dropping stale reply from {:?}", addr);
        }
        self.log.push(Transmission {
            addr,
            len: data.len(),
        });
        match wire.to_device.try_send(data.to_vec()) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(Error::Busy),
            Err(TrySendError::Disconnected(_)) => Err(Error::NoDevice),
        }
    }

    fn receive(
        &mut self,
        addr: Address,
        budget: Budget,
        out: &mut [u8],
    ) -> Result<usize, Error> {
        let wire = self.wires.get(&addr).ok_or(Error::NoDevice)?;
        poll(&wire.from_device, budget, self.interval, out)
            .map_err(|e| match e {
                Error::Disconnected => Error::NoDevice,
                e => e,
            })
    }
}

/// A component's end of a [`SimBus`].
pub struct SimPort {
    addr: Address,
    inbox: Receiver<Vec<u8>>,
    outbox: SyncSender<Vec<u8>>,
    interval: Duration,
}

impl SimPort {
    /// Returns the address this port is attached at.
    pub fn address(&self) -> Address {
        self.addr
    }
}

impl Link for SimPort {
    fn send(&mut self, data: &[u8]) -> Result<(), Error> {
        match self.outbox.try_send(data.to_vec()) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(Error::Busy),
            Err(TrySendError::Disconnected(_)) => Err(Error::Disconnected),
        }
    }

    fn receive(
        &mut self,
        budget: Budget,
        out: &mut [u8],
    ) -> Result<usize, Error> {
        poll(&self.inbox, budget, self.interval, out)
    }
}

fn poll(
    rx: &Receiver<Vec<u8>>,
    budget: Budget,
    interval: Duration,
    out: &mut [u8],
) -> Result<usize, Error> {
    for _ in 0..budget.polls.max(1) {
        match rx.try_recv() {
            Ok(packet) => {
                let dest = out.get_mut(..packet.len()).ok_or(Error::Short)?;
                dest.copy_from_slice(&packet);
                return Ok(packet.len());
            }
            Err(TryRecvError::Empty) => thread::sleep(interval),
            Err(TryRecvError::Disconnected) => return Err(Error::Disconnected),
        }
    }
    Err(Error::Timeout)
}
