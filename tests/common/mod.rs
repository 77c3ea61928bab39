// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! A recording stand-in for the USB peripheral, plus helpers that play the
//! host's side of the bus.

#![allow(dead_code)]

use usbd_lld::{
    Direction, EndpointType, RequestOutcome, SetupPacket, UsbConfig, UsbDriver, UsbEvent,
    UsbHardware,
};

/// Everything the driver asked the peripheral to do.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Call {
    Init,
    Enable,
    Disable,
    Reset,
    Connect,
    Disconnect,
    SetAddress(u8),
    InitEndpoint(u8, EndpointType, u16, u16),
    DisableEndpoints,
    Write(u8, Vec<u8>),
    PrepareOut(u8, usize),
    Stall(u8, Direction),
    ClearStall(u8, Direction),
}

/// Everything the driver told the upper layer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Log {
    Event(UsbEvent),
    InDone(u8),
    OutDone(u8),
    SetupLatched(u8),
    ControlDone(Vec<u8>),
}

#[derive(Default)]
pub struct MockHardware {
    pub calls: Vec<Call>,
    pub log: Vec<Log>,
    /// What the SETUP latch holds.
    pub setup: [u8; 8],
    /// The packet the host sent last, handed out by `read_packet`.
    pub out_packet: Vec<u8>,
}

impl MockHardware {
    pub fn writes(&self) -> Vec<(u8, Vec<u8>)> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                Call::Write(ep, data) => Some((*ep, data.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn last_write(&self) -> Option<(u8, Vec<u8>)> {
        self.writes().pop()
    }

    /// Size of the most recent OUT packet armed on `ep`.
    pub fn armed_out(&self, ep: u8) -> Option<usize> {
        self.calls.iter().rev().find_map(|c| match c {
            Call::PrepareOut(e, n) if *e == ep => Some(*n),
            _ => None,
        })
    }
}

impl UsbHardware for MockHardware {
    fn init(&mut self) {
        self.calls.push(Call::Init);
    }

    fn enable(&mut self) {
        self.calls.push(Call::Enable);
    }

    fn disable(&mut self) {
        self.calls.push(Call::Disable);
    }

    fn reset(&mut self) {
        self.calls.push(Call::Reset);
    }

    fn connect(&mut self) {
        self.calls.push(Call::Connect);
    }

    fn disconnect(&mut self) {
        self.calls.push(Call::Disconnect);
    }

    fn set_address(&mut self, address: u8) {
        self.calls.push(Call::SetAddress(address));
    }

    fn init_endpoint(&mut self, ep: u8, ep_type: EndpointType, in_max: u16, out_max: u16) {
        self.calls.push(Call::InitEndpoint(ep, ep_type, in_max, out_max));
    }

    fn disable_endpoints(&mut self) {
        self.calls.push(Call::DisableEndpoints);
    }

    fn read_setup(&mut self, _ep: u8, buf: &mut [u8; 8]) {
        *buf = self.setup;
    }

    fn write_packet(&mut self, ep: u8, data: &[u8]) {
        self.calls.push(Call::Write(ep, data.to_vec()));
    }

    fn prepare_out(&mut self, ep: u8, max_len: usize) {
        self.calls.push(Call::PrepareOut(ep, max_len));
    }

    fn read_packet(&mut self, _ep: u8, buf: &mut [u8]) -> usize {
        let n = self.out_packet.len().min(buf.len());
        buf[..n].copy_from_slice(&self.out_packet[..n]);
        self.out_packet.len()
    }

    fn stall(&mut self, ep: u8, dir: Direction) {
        self.calls.push(Call::Stall(ep, dir));
    }

    fn clear_stall(&mut self, ep: u8, dir: Direction) {
        self.calls.push(Call::ClearStall(ep, dir));
    }
}

pub type Driver<'a> = UsbDriver<'a, MockHardware>;

pub static DEVICE_DESCRIPTOR: [u8; 18] = [
    18, 0x01, 0x10, 0x01, 0, 0, 0, 64, 0x09, 0x12, 0x01, 0x00, 0x00, 0x01, 1, 2, 0, 1,
];

/// Exactly one EP0 packet long.
pub static CONFIG_DESCRIPTOR: [u8; 64] = [0x5A; 64];

pub static LANGUAGES: [u8; 4] = [4, 0x03, 0x09, 0x04];

/// Longer than a single EP0 packet.
pub static LONG_STRING: [u8; 100] = [0x33; 100];

pub fn descriptors<'a>(_usbp: &Driver<'a>, dtype: u8, index: u8, _lang: u16) -> Option<&'a [u8]> {
    match (dtype, index) {
        (0x01, 0) => Some(&DEVICE_DESCRIPTOR),
        (0x02, 0) => Some(&CONFIG_DESCRIPTOR),
        (0x03, 0) => Some(&LANGUAGES),
        (0x03, 1) => Some(&LONG_STRING),
        _ => None,
    }
}

pub fn record_event(usbp: &mut Driver<'_>, event: UsbEvent) {
    usbp.hardware_mut().log.push(Log::Event(event));
}

pub fn in_done(usbp: &mut Driver<'_>, ep: u8) {
    usbp.hardware_mut().log.push(Log::InDone(ep));
}

pub fn out_done(usbp: &mut Driver<'_>, ep: u8) {
    usbp.hardware_mut().log.push(Log::OutDone(ep));
}

pub fn setup_latched(usbp: &mut Driver<'_>, ep: u8) {
    usbp.hardware_mut().log.push(Log::SetupLatched(ep));
}

/// End-of-transaction callback; records what the OUT data stage delivered.
pub fn control_done(usbp: &mut Driver<'_>) {
    let data = usbp.control_data().to_vec();
    usbp.hardware_mut().log.push(Log::ControlDone(data));
}

pub fn config<'a>() -> UsbConfig<'a, MockHardware> {
    let mut config = UsbConfig::new(descriptors);
    config.event = Some(record_event);
    config
}

pub fn config_with_hook<'a>(
    hook: fn(&mut Driver<'a>, &SetupPacket) -> RequestOutcome<'a, MockHardware>,
) -> UsbConfig<'a, MockHardware> {
    let mut config = config();
    config.requests_hook = Some(hook);
    config
}

/// A driver that has been initialized and started, with the record of the
/// bring-up cleared.
pub fn started_with<'a>(config: UsbConfig<'a, MockHardware>) -> Driver<'a> {
    let mut usbp = UsbDriver::new(MockHardware::default());
    usbp.init().unwrap();
    usbp.start(config).unwrap();
    usbp.hardware_mut().calls.clear();
    usbp
}

pub fn started<'a>() -> Driver<'a> {
    started_with(config())
}

/// The host sends a SETUP packet to EP0.
pub fn host_setup(
    usbp: &mut Driver<'_>,
    request_type: u8,
    request: u8,
    value: u16,
    index: u16,
    length: u16,
) {
    let setup = SetupPacket::new(request_type, request, value, index, length);
    usbp.hardware_mut().setup = setup.to_bytes();
    usbp.on_setup(0);
}

/// The host collects the IN packet armed on `ep`.
pub fn host_in(usbp: &mut Driver<'_>, ep: u8) {
    usbp.on_in_complete(ep);
}

/// The host sends `data` as one OUT packet to `ep`.
pub fn host_out(usbp: &mut Driver<'_>, ep: u8, data: &[u8]) {
    usbp.hardware_mut().out_packet = data.to_vec();
    usbp.on_out_complete(ep);
}
