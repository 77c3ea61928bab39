// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! USB structure and constant definitions.
//!
//! These are the bits of the USB 2.0 specification (chapter 9, mostly) that
//! the control-transfer engine has to understand in order to sequence a
//! transaction and answer the handful of standard requests it handles by
//! itself. Everything class-specific lives above this crate.

use byteorder::LittleEndian;
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use zerocopy::{AsBytes, FromBytes, LayoutVerified, Unaligned, U16};

/// USB deals in two different transfer directions, called OUT (host-to-device)
/// and IN (device-to-host). In the vast majority of cases, OUT is represented
/// by a 0 bit in position 7, and IN by an `0x80` bit.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Direction {
    Out = 0,
    In = 0x80,
}

impl Direction {
    pub const fn of_endpoint_addr(addr: u8) -> Self {
        if addr & Self::In as u8 != 0 {
            Self::In
        } else {
            Self::Out
        }
    }
}

/// Layout of an 8-byte USB SETUP packet.
#[repr(C)]
#[derive(Copy, Clone, Debug, AsBytes, FromBytes, Unaligned)]
pub struct SetupPacket {
    /// Request type bitmap: bit 7 is the data-stage direction, bits 6..5 the
    /// request kind (standard/class/vendor), bits 4..0 the recipient.
    pub request_type: u8,
    /// Request code. Standard ones are in [`StandardRequest`].
    pub request: u8,
    /// A simple argument of up to 16 bits, specific to the request.
    pub value: U16<LittleEndian>,
    /// Second argument; an interface or endpoint number for requests directed
    /// at those recipients.
    pub index: U16<LittleEndian>,
    /// If data will be transferred after this request (in the direction given
    /// by `request_type`), this gives the number of bytes (OUT) or maximum
    /// number of bytes (IN).
    pub length: U16<LittleEndian>,
}

impl SetupPacket {
    pub const SIZE: usize = 8;

    pub fn new(request_type: u8, request: u8, value: u16, index: u16, length: u16) -> Self {
        Self {
            request_type,
            request,
            value: U16::new(value),
            index: U16::new(index),
            length: U16::new(length),
        }
    }

    /// Reinterprets a latched setup buffer.
    pub fn parse(raw: &[u8; Self::SIZE]) -> Self {
        // An 8-byte, alignment-1 struct always fits an 8-byte array, so this
        // can't fail.
        match LayoutVerified::<_, SetupPacket>::new_unaligned(&raw[..]) {
            Some(lv) => *lv.into_ref(),
            None => unreachable!(),
        }
    }

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut raw = [0; Self::SIZE];
        raw.copy_from_slice(self.as_bytes());
        raw
    }

    pub fn direction(&self) -> Direction {
        Direction::of_endpoint_addr(self.request_type)
    }

    pub fn kind(&self) -> Option<RequestKind> {
        RequestKind::from_u8((self.request_type >> 5) & 0b11)
    }

    pub fn recipient(&self) -> Option<Recipient> {
        Recipient::from_u8(self.request_type & 0x1F)
    }

    /// The request code, if this is a standard request we know about.
    pub fn standard_request(&self) -> Option<StandardRequest> {
        match self.kind() {
            Some(RequestKind::Standard) => StandardRequest::from_u8(self.request),
            _ => None,
        }
    }

    pub fn value(&self) -> u16 {
        self.value.get()
    }

    pub fn index(&self) -> u16 {
        self.index.get()
    }

    pub fn length(&self) -> u16 {
        self.length.get()
    }
}

/// Bits 6..5 of `request_type`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, FromPrimitive)]
pub enum RequestKind {
    Standard = 0,
    Class = 1,
    Vendor = 2,
}

/// Bits 4..0 of `request_type`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, FromPrimitive)]
pub enum Recipient {
    Device = 0,
    Interface = 1,
    Endpoint = 2,
    Other = 3,
}

/// The standard USB SETUP requests.
#[derive(Copy, Clone, Debug, PartialEq, Eq, FromPrimitive)]
pub enum StandardRequest {
    GetStatus = 0x00,
    ClearFeature = 0x01,
    SetFeature = 0x03,
    /// Notifies the device that it's being moved to a different address on the
    /// bus. Always an OUT with no data stage.
    SetAddress = 0x05,
    /// Asks the device to send a certain descriptor back to the host. Always
    /// used on an IN request.
    GetDescriptor = 0x06,
    SetDescriptor = 0x07,
    GetConfiguration = 0x08,
    /// Configures a device by choosing one of the options listed in its
    /// descriptors. Always an OUT.
    SetConfiguration = 0x09,
    GetInterface = 0x0A,
    SetInterface = 0x0B,
    SynchFrame = 0x0C,
}

/// Feature selector for CLEAR_FEATURE/SET_FEATURE on an endpoint.
pub const FEATURE_ENDPOINT_HALT: u16 = 0;
/// Feature selector for CLEAR_FEATURE/SET_FEATURE on the device.
pub const FEATURE_DEVICE_REMOTE_WAKEUP: u16 = 1;

/// Device GET_STATUS bit: the device is currently self-powered.
pub const STATUS_SELF_POWERED: u16 = 1 << 0;
/// Device GET_STATUS bit: the host has enabled remote wakeup.
pub const STATUS_REMOTE_WAKEUP: u16 = 1 << 1;

/// Types of transfer an endpoint can carry; the bottom 2 bits of an endpoint
/// descriptor's `attributes`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum EndpointType {
    Control = 0,
    Isochronous = 1,
    Bulk = 2,
    Interrupt = 3,
}
