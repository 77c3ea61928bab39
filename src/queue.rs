// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Streaming-queue endpoints of a transfer.
//!
//! A queue-mode transfer moves at most one packet per hardware-ready event.
//! The engine only ever asks for a whole packet's worth of bytes (or room), so
//! implementations never see partial reads that would split a packet. A queue
//! too small to ever hold one packet is refused when the transfer starts.

use heapless::spsc::{Consumer, Producer};

/// Source of bytes for an IN transfer.
pub trait TxQueue {
    /// Number of bytes that can be read right now.
    fn available(&self) -> usize;

    /// Most bytes the queue can ever hold.
    fn capacity(&self) -> usize;

    /// Moves up to `buf.len()` bytes out of the queue, returning how many were
    /// moved.
    fn read(&mut self, buf: &mut [u8]) -> usize;
}

/// Sink for bytes of an OUT transfer.
pub trait RxQueue {
    /// Number of bytes that can be written right now.
    fn space(&self) -> usize;

    /// Most bytes the queue can ever hold.
    fn capacity(&self) -> usize;

    /// Pushes up to `data.len()` bytes, returning how many were accepted.
    fn write(&mut self, data: &[u8]) -> usize;
}

impl<const N: usize> TxQueue for Consumer<'_, u8, N> {
    fn available(&self) -> usize {
        self.len()
    }

    fn capacity(&self) -> usize {
        Consumer::capacity(self)
    }

    fn read(&mut self, buf: &mut [u8]) -> usize {
        let mut n = 0;
        for slot in buf.iter_mut() {
            match self.dequeue() {
                Some(b) => *slot = b,
                None => break,
            }
            n += 1;
        }
        n
    }
}

impl<const N: usize> RxQueue for Producer<'_, u8, N> {
    fn space(&self) -> usize {
        Producer::capacity(self) - self.len()
    }

    fn capacity(&self) -> usize {
        Producer::capacity(self)
    }

    fn write(&mut self, data: &[u8]) -> usize {
        let mut n = 0;
        for &b in data {
            if self.enqueue(b).is_err() {
                break;
            }
            n += 1;
        }
        n
    }
}
