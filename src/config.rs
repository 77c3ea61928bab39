// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Build-time limits and the runtime driver configuration.

use crate::control::RequestOutcome;
use crate::driver::UsbDriver;
use crate::usb::SetupPacket;

// The highest endpoint number the peripheral implements. This is a property of
// the hardware, so it follows the selected backend.
cfg_if::cfg_if! {
    if #[cfg(feature = "rp2040")] {
        pub const MAX_ENDPOINTS: usize = 15;
    } else {
        pub const MAX_ENDPOINTS: usize = 3;
    }
}

/// Number of endpoint slots, EP0 included.
pub const ENDPOINT_SLOTS: usize = MAX_ENDPOINTS + 1;

/// Largest packet any endpoint may be configured for. This is the full-speed
/// limit for control, bulk and interrupt endpoints.
pub const MAX_PACKET_SIZE: usize = 64;

/// Packet size of the default control endpoint.
pub const EP0_MAX_PACKET_SIZE: u16 = 64;

/// Capacity of the driver-internal buffer used for small control replies
/// (GET_STATUS and friends) and for short control OUT data stages.
pub const CONTROL_SCRATCH_SIZE: usize = 64;

/// Device-level events delivered to the upper layer.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum UsbEvent {
    /// The host reset the bus. All endpoints other than EP0 are gone.
    Reset,
    /// SET_ADDRESS was received; the new address is already latched.
    Address(u8),
    /// SET_CONFIGURATION was received. Zero means "deconfigured".
    Configured(u8),
    Suspend,
    Wakeup,
    StartOfFrame,
    /// A control request was rejected with a STALL.
    Stalled,
}

pub type EventCallback<'a, H> = fn(&mut UsbDriver<'a, H>, UsbEvent);

/// Looks up a descriptor for GET_DESCRIPTOR: `(descriptor type, index,
/// language id)`. Returning `None` stalls the request.
pub type DescriptorCallback<'a, H> = fn(&UsbDriver<'a, H>, u8, u8, u16) -> Option<&'a [u8]>;

/// Gets first look at every SETUP packet, before the standard-request
/// handling.
pub type RequestHook<'a, H> = fn(&mut UsbDriver<'a, H>, &SetupPacket) -> RequestOutcome<'a, H>;

/// What `UsbDriver::start` needs from the upper layer.
pub struct UsbConfig<'a, H> {
    pub event: Option<EventCallback<'a, H>>,
    pub get_descriptor: DescriptorCallback<'a, H>,
    pub requests_hook: Option<RequestHook<'a, H>>,
}

impl<'a, H> UsbConfig<'a, H> {
    /// A configuration with only the mandatory descriptor callback.
    pub fn new(get_descriptor: DescriptorCallback<'a, H>) -> Self {
        Self {
            event: None,
            get_descriptor,
            requests_hook: None,
        }
    }
}

impl<H> Clone for UsbConfig<'_, H> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<H> Copy for UsbConfig<'_, H> {}
