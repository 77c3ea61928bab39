// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The contract between the transfer engine and a USB peripheral.
//!
//! Implementations are register-level glue: they move one packet at a time
//! between endpoint buffers and memory, and flip the handful of control bits
//! the protocol needs. They keep no transfer state of their own; progress,
//! completion and callbacks are tracked by [`UsbDriver`](crate::UsbDriver).
//!
//! Going the other way, the implementation's interrupt handler translates
//! hardware events into calls on the driver: `on_setup`, `on_in_complete`,
//! `on_out_complete`, `on_reset`, `on_sof`, `on_suspend` and `on_wakeup`.

use crate::usb::{Direction, EndpointType};

pub trait UsbHardware {
    /// One-time peripheral initialization.
    fn init(&mut self);

    /// Powers up the transceiver and device controller.
    fn enable(&mut self);

    /// Powers the transceiver back down.
    fn disable(&mut self);

    /// Returns the controller to its post-bus-reset condition: address 0 and
    /// EP0's buffers released. The driver follows up with
    /// [`disable_endpoints`](Self::disable_endpoints) for the rest.
    fn reset(&mut self);

    /// Presents the device on the bus (enables the D+ pull-up).
    fn connect(&mut self);

    fn disconnect(&mut self);

    /// Writes the address latch.
    fn set_address(&mut self, address: u8);

    /// Activates endpoint `ep`. A max packet size of zero means that direction
    /// is unused.
    fn init_endpoint(&mut self, ep: u8, ep_type: EndpointType, in_max: u16, out_max: u16);

    /// Deactivates every endpoint other than EP0.
    fn disable_endpoints(&mut self);

    /// Copies the most recently latched SETUP packet for `ep`.
    fn read_setup(&mut self, ep: u8, buf: &mut [u8; 8]);

    /// Loads one IN packet into the endpoint buffer and hands it to the host
    /// side. `data` may be empty, for a zero-length packet.
    fn write_packet(&mut self, ep: u8, data: &[u8]);

    /// Arms the endpoint to receive one OUT packet of at most `max_len` bytes.
    fn prepare_out(&mut self, ep: u8, max_len: usize);

    /// Copies the packet just received on `ep` into `buf` and returns the
    /// length the host actually sent. That length can exceed `buf.len()` if
    /// the host overran the armed size; only `buf.len()` bytes are copied in
    /// that case.
    fn read_packet(&mut self, ep: u8, buf: &mut [u8]) -> usize;

    fn stall(&mut self, ep: u8, dir: Direction);

    fn clear_stall(&mut self, ep: u8, dir: Direction);
}
