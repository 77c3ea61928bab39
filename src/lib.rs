// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Low-level USB device driver core.
//!
//! This crate sits between a USB device peripheral and whatever class driver
//! (CDC, HID, ...) runs on top of it. It owns:
//!
//! - the device lifecycle (`Uninit` → `Stopped` → `Ready` → `Active`),
//! - a per-endpoint transfer engine that splits transfers into packets, from
//!   linear buffers or from streaming queues, and reports each completion
//!   exactly once,
//! - the EP0 control-transfer state machine and the standard requests every
//!   device has to answer.
//!
//! The peripheral itself is reached through the [`UsbHardware`] trait. An
//! implementation for the RP2040 controller lives in `rp2040` behind the
//! feature of the same name.
//!
//! Everything is polled from interrupt context through the `on_*` entry
//! points of [`UsbDriver`]; nothing blocks and nothing allocates.

#![cfg_attr(not(test), no_std)]

pub mod config;
pub mod control;
pub mod driver;
pub mod endpoint;
pub mod error;
pub mod hw;
pub mod queue;
#[cfg(feature = "rp2040")]
pub mod rp2040;
pub mod shared;
pub mod usb;

pub use config::{UsbConfig, UsbEvent, MAX_ENDPOINTS, MAX_PACKET_SIZE};
pub use control::{ControlData, ControlResponse, Ep0State, RequestOutcome};
pub use driver::{DeviceState, EndpointStatus, UsbDriver};
pub use endpoint::{DirectionConfig, EndpointCallback, EndpointConfig, RxBuffer, TxBuffer};
pub use error::Error;
pub use hw::UsbHardware;
pub use queue::{RxQueue, TxQueue};
pub use shared::SharedUsbDriver;
pub use usb::{Direction, EndpointType, SetupPacket};
