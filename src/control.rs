// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The EP0 control-transfer state machine.
//!
//! A control transfer is three stages: SETUP, an optional DATA stage in the
//! direction given by the setup packet, and a zero-length STATUS stage in the
//! opposite direction. The functions here are installed as the callbacks of
//! the default control endpoint (see [`ep0_config`]) and drive those stages
//! on top of the ordinary transfer engine:
//!
//! ```text
//!              setup (IN, n > 0)         IN data sent          ZLP received
//! WaitSetup ───────────────────► InData ─────────────► OutStatus ──────────► WaitSetup
//!     │        setup (IN, n = 0)                          ▲
//!     ├──────────────────────────────────────────────────┘
//!     │        setup (OUT, n > 0)        OUT data in           ZLP sent
//!     ├────────────────────────► OutData ────────────► InStatus ───────────► WaitSetup
//!     │        setup (OUT, n = 0)                         ▲
//!     ├──────────────────────────────────────────────────┘
//!     │        rejected
//!     └────────────────────────► Stalled ── next setup ──► (as above)
//! ```
//!
//! A new SETUP packet always wins: whatever stage was in progress is
//! abandoned and its end-of-transaction callback is dropped.

use log::{debug, trace, warn};

use crate::config::{UsbEvent, CONTROL_SCRATCH_SIZE, EP0_MAX_PACKET_SIZE};
use crate::driver::{EndpointStatus, UsbDriver};
use crate::endpoint::{EndpointConfig, Sink, Source};
use crate::hw::UsbHardware;
use crate::usb::{
    Direction, EndpointType, Recipient, RequestKind, SetupPacket, StandardRequest,
    FEATURE_DEVICE_REMOTE_WAKEUP, FEATURE_ENDPOINT_HALT,
};

/// Stage of the control transaction on EP0.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Ep0State {
    WaitSetup,
    /// Sending the reply to an IN request.
    InData,
    /// Sending the zero-length status packet of an OUT request.
    InStatus,
    /// Receiving the data of an OUT request.
    OutData,
    /// Waiting for the host's zero-length status packet after an IN request.
    OutStatus,
    /// The last request was rejected; only a new SETUP gets us out.
    Stalled,
}

/// Invoked once the status stage of a control transaction has completed.
pub type ControlCallback<'a, H> = fn(&mut UsbDriver<'a, H>);

/// Data stage of a control transaction, as chosen by a request handler.
pub enum ControlData<'a> {
    /// No data stage.
    Empty,
    /// Reply to an IN request.
    Send(&'a [u8]),
    /// Destination for the data of an OUT request.
    Receive(&'a mut [u8]),
    /// The first `n` bytes of the driver's control scratch buffer: the reply
    /// for an IN request, or the destination for an OUT one.
    Scratch(usize),
}

/// A request handler's answer to a SETUP packet.
pub struct ControlResponse<'a, H> {
    pub data: ControlData<'a>,
    pub on_complete: Option<ControlCallback<'a, H>>,
}

impl<'a, H> ControlResponse<'a, H> {
    pub fn empty() -> Self {
        Self {
            data: ControlData::Empty,
            on_complete: None,
        }
    }

    pub fn send(data: &'a [u8]) -> Self {
        Self {
            data: ControlData::Send(data),
            on_complete: None,
        }
    }

    pub fn receive(buf: &'a mut [u8]) -> Self {
        Self {
            data: ControlData::Receive(buf),
            on_complete: None,
        }
    }

    pub fn scratch(len: usize) -> Self {
        Self {
            data: ControlData::Scratch(len),
            on_complete: None,
        }
    }

    pub fn with_callback(mut self, cb: ControlCallback<'a, H>) -> Self {
        self.on_complete = Some(cb);
        self
    }
}

/// What the request hook decided.
pub enum RequestOutcome<'a, H> {
    /// Fall through to the standard-request handling.
    NotHandled,
    /// Reject the request.
    Stall,
    Respond(ControlResponse<'a, H>),
}

/// Orchestrator state, one per device.
pub(crate) struct ControlState<'a, H> {
    pub state: Ep0State,
    pub setup: SetupPacket,
    pub end_cb: Option<ControlCallback<'a, H>>,
    /// The IN reply ended on a packet boundary short of what the host asked
    /// for, so a zero-length packet must close the data stage.
    pub zlp: bool,
    pub scratch: [u8; CONTROL_SCRATCH_SIZE],
}

impl<H> ControlState<'_, H> {
    pub fn new() -> Self {
        Self {
            state: Ep0State::WaitSetup,
            setup: SetupPacket::new(0, 0, 0, 0, 0),
            end_cb: None,
            zlp: false,
            scratch: [0; CONTROL_SCRATCH_SIZE],
        }
    }

    pub fn reset(&mut self) {
        self.state = Ep0State::WaitSetup;
        self.end_cb = None;
        self.zlp = false;
    }
}

/// Configuration of the default control endpoint, wired to this module.
pub fn ep0_config<'a, H: UsbHardware>() -> EndpointConfig<'a, H> {
    EndpointConfig::new(EndpointType::Control)
        .with_setup(ep0_setup)
        .with_in(EP0_MAX_PACKET_SIZE, Some(ep0_in))
        .with_out(EP0_MAX_PACKET_SIZE, Some(ep0_out))
}

/// SETUP received on EP0.
pub fn ep0_setup<'a, H: UsbHardware>(usbp: &mut UsbDriver<'a, H>, ep: u8) {
    // Whatever was going on is over.
    usbp.abort_in(ep);
    usbp.abort_out(ep);
    usbp.unstall_ep0();
    usbp.control.reset();

    let mut raw = [0; SetupPacket::SIZE];
    if usbp.read_setup(ep, &mut raw).is_err() {
        return;
    }
    let setup = SetupPacket::parse(&raw);
    usbp.control.setup = setup;
    debug!(
        "usb: setup rt={:#04x} req={:#04x} value={:#06x} index={:#06x} len={}",
        setup.request_type,
        setup.request,
        setup.value(),
        setup.index(),
        setup.length(),
    );

    // First verify if the application has a handler installed for this
    // request.
    let hook = usbp.usb_config().and_then(|c| c.requests_hook);
    let mut outcome = match hook {
        Some(hook) => hook(usbp, &setup),
        None => RequestOutcome::NotHandled,
    };
    if let RequestOutcome::NotHandled = outcome {
        outcome = match setup.kind() {
            Some(RequestKind::Standard) => default_handler(usbp, &setup),
            _ => RequestOutcome::Stall,
        };
    }
    let response = match outcome {
        RequestOutcome::Respond(response) => response,
        RequestOutcome::Stall | RequestOutcome::NotHandled => {
            protocol_stall(usbp);
            return;
        }
    };

    // The reply can't be longer than the host asked for.
    let max = usize::from(setup.length());
    usbp.control.end_cb = response.on_complete;
    match (setup.direction(), response.data) {
        (Direction::In, ControlData::Send(data)) => {
            let n = data.len().min(max);
            start_in_data(usbp, ep, Source::Linear(&data[..n]), n, max);
        }
        (Direction::In, ControlData::Scratch(len)) => {
            let n = len.min(CONTROL_SCRATCH_SIZE).min(max);
            start_in_data(usbp, ep, Source::Scratch, n, max);
        }
        (Direction::In, ControlData::Empty) => start_in_data(usbp, ep, Source::Scratch, 0, max),
        (Direction::Out, ControlData::Receive(buf)) => {
            let n = buf.len().min(max);
            start_out_data(usbp, ep, Sink::Linear(&mut buf[..n]), n);
        }
        (Direction::Out, ControlData::Scratch(len)) => {
            let n = len.min(CONTROL_SCRATCH_SIZE).min(max);
            start_out_data(usbp, ep, Sink::Scratch, n);
        }
        (Direction::Out, ControlData::Empty) => start_out_data(usbp, ep, Sink::Scratch, 0),
        (dir, _) => {
            warn!("usb: control response does not match {:?} request", dir);
            usbp.control.end_cb = None;
            protocol_stall(usbp);
        }
    }
}

/// EP0 IN transfer finished: either the data stage of an IN request or the
/// status stage of an OUT request.
pub fn ep0_in<'a, H: UsbHardware>(usbp: &mut UsbDriver<'a, H>, ep: u8) {
    match usbp.control.state {
        Ep0State::InData => {
            if usbp.control.zlp {
                // The reply was a whole number of packets, less than the host
                // asked for; end the data stage with an empty packet.
                usbp.control.zlp = false;
                usbp.begin_in(ep, Source::Scratch, 0);
                return;
            }
            trace!("usb: control IN data done, awaiting status");
            usbp.control.state = Ep0State::OutStatus;
            usbp.begin_out(ep, Sink::Scratch, 0);
        }
        Ep0State::InStatus => finish(usbp),
        state => {
            warn!("usb: EP0 IN complete in {:?}", state);
            protocol_stall(usbp);
        }
    }
}

/// EP0 OUT transfer finished: either the data stage of an OUT request or the
/// status stage of an IN request.
pub fn ep0_out<'a, H: UsbHardware>(usbp: &mut UsbDriver<'a, H>, ep: u8) {
    match usbp.control.state {
        Ep0State::OutData => {
            trace!("usb: control OUT data done, sending status");
            usbp.control.state = Ep0State::InStatus;
            usbp.begin_in(ep, Source::Scratch, 0);
        }
        Ep0State::OutStatus => {
            // The status packet must be zero sized.
            let rx = &usbp.endpoints[usize::from(ep)].rx;
            if rx.overrun || rx.count != 0 {
                warn!("usb: non-empty control status packet");
                protocol_stall(usbp);
                return;
            }
            finish(usbp);
        }
        state => {
            warn!("usb: EP0 OUT complete in {:?}", state);
            protocol_stall(usbp);
        }
    }
}

fn start_in_data<'a, H: UsbHardware>(
    usbp: &mut UsbDriver<'a, H>,
    ep: u8,
    source: Source<'a>,
    n: usize,
    max: usize,
) {
    if n > 0 {
        usbp.control.state = Ep0State::InData;
        usbp.control.zlp = n < max && n % usize::from(EP0_MAX_PACKET_SIZE) == 0;
        usbp.begin_in(ep, source, n);
    } else {
        // No data stage, go straight to receiving the zero sized status
        // packet.
        usbp.control.state = Ep0State::OutStatus;
        usbp.begin_out(ep, Sink::Scratch, 0);
    }
}

fn start_out_data<'a, H: UsbHardware>(
    usbp: &mut UsbDriver<'a, H>,
    ep: u8,
    sink: Sink<'a>,
    n: usize,
) {
    if n > 0 {
        usbp.control.state = Ep0State::OutData;
        usbp.begin_out(ep, sink, n);
    } else {
        // No data stage, send the zero sized status packet right away.
        usbp.control.state = Ep0State::InStatus;
        usbp.begin_in(ep, Source::Scratch, 0);
    }
}

/// Status stage done; the transaction is over.
fn finish<H: UsbHardware>(usbp: &mut UsbDriver<'_, H>) {
    let cb = usbp.control.end_cb.take();
    usbp.control.state = Ep0State::WaitSetup;
    trace!("usb: control transaction complete");
    if let Some(cb) = cb {
        cb(usbp);
    }
}

/// Rejects the current request. The state machine stays in `Stalled` until
/// the next SETUP packet arrives.
fn protocol_stall<H: UsbHardware>(usbp: &mut UsbDriver<'_, H>) {
    let setup = usbp.control.setup;
    warn!("usb: stalling request rt={:#04x} req={:#04x}", setup.request_type, setup.request);
    usbp.control.end_cb = None;
    usbp.control.zlp = false;
    usbp.stall_ep0();
    usbp.control.state = Ep0State::Stalled;
    usbp.emit(UsbEvent::Stalled);
}

/// Writes a 16-bit status reply into the scratch buffer.
fn status_reply<'a, H>(usbp: &mut UsbDriver<'a, H>, status: u16) -> RequestOutcome<'a, H> {
    usbp.control.scratch[..2].copy_from_slice(&status.to_le_bytes());
    RequestOutcome::Respond(ControlResponse::scratch(2))
}

/// The standard requests every device must answer (USB 2.0 §9.4).
fn default_handler<'a, H: UsbHardware>(
    usbp: &mut UsbDriver<'a, H>,
    setup: &SetupPacket,
) -> RequestOutcome<'a, H> {
    let (Some(recipient), Some(request)) = (setup.recipient(), setup.standard_request()) else {
        return RequestOutcome::Stall;
    };
    let dir = setup.direction();
    match (recipient, dir, request) {
        (Recipient::Device, Direction::In, StandardRequest::GetStatus) => {
            let status = usbp.device_status();
            status_reply(usbp, status)
        }
        (Recipient::Device, Direction::Out, StandardRequest::ClearFeature)
            if setup.value() == FEATURE_DEVICE_REMOTE_WAKEUP =>
        {
            usbp.set_remote_wakeup(false);
            RequestOutcome::Respond(ControlResponse::empty())
        }
        (Recipient::Device, Direction::Out, StandardRequest::SetFeature)
            if setup.value() == FEATURE_DEVICE_REMOTE_WAKEUP =>
        {
            usbp.set_remote_wakeup(true);
            RequestOutcome::Respond(ControlResponse::empty())
        }
        (Recipient::Device, Direction::Out, StandardRequest::SetAddress) => {
            // The address goes into the hardware right away, before the
            // status stage. The controller finishes the status handshake on
            // the old address by itself.
            let address = (setup.value() & 0x7F) as u8;
            debug!("usb: address {}", address);
            usbp.set_address(address);
            usbp.emit(UsbEvent::Address(address));
            RequestOutcome::Respond(ControlResponse::empty())
        }
        (Recipient::Device, Direction::In, StandardRequest::GetDescriptor) => {
            let Some(config) = usbp.usb_config() else {
                return RequestOutcome::Stall;
            };
            let dtype = (setup.value() >> 8) as u8;
            let index = (setup.value() & 0xFF) as u8;
            match (config.get_descriptor)(usbp, dtype, index, setup.index()) {
                Some(descriptor) => RequestOutcome::Respond(ControlResponse::send(descriptor)),
                None => {
                    debug!("usb: no descriptor type {:#04x} index {}", dtype, index);
                    RequestOutcome::Stall
                }
            }
        }
        (Recipient::Device, Direction::In, StandardRequest::GetConfiguration) => {
            usbp.control.scratch[0] = usbp.configuration();
            RequestOutcome::Respond(ControlResponse::scratch(1))
        }
        (Recipient::Device, Direction::Out, StandardRequest::SetConfiguration) => {
            let configuration = (setup.value() & 0xFF) as u8;
            debug!("usb: configuration {}", configuration);
            usbp.set_configuration(configuration);
            usbp.emit(UsbEvent::Configured(configuration));
            RequestOutcome::Respond(ControlResponse::empty())
        }
        (Recipient::Interface, Direction::In, StandardRequest::GetStatus) => status_reply(usbp, 0),
        (Recipient::Endpoint, Direction::In, StandardRequest::GetStatus) => {
            let (ep, ep_dir) = endpoint_of(setup);
            let status = match ep_dir {
                Direction::In => usbp.status_in(ep),
                Direction::Out => usbp.status_out(ep),
            };
            match status {
                EndpointStatus::Disabled => RequestOutcome::Stall,
                EndpointStatus::Stalled => status_reply(usbp, 1),
                EndpointStatus::Idle | EndpointStatus::Busy => status_reply(usbp, 0),
            }
        }
        (Recipient::Endpoint, Direction::Out, StandardRequest::ClearFeature)
            if setup.value() == FEATURE_ENDPOINT_HALT =>
        {
            let (ep, ep_dir) = endpoint_of(setup);
            // Halting EP0 through a feature request is acknowledged but
            // ignored; a stalled EP0 clears itself on the next SETUP anyway.
            if ep != 0 {
                let cleared = match ep_dir {
                    Direction::In => usbp.clear_stall_in(ep),
                    Direction::Out => usbp.clear_stall_out(ep),
                };
                if cleared.is_err() {
                    return RequestOutcome::Stall;
                }
            }
            RequestOutcome::Respond(ControlResponse::empty())
        }
        (Recipient::Endpoint, Direction::Out, StandardRequest::SetFeature)
            if setup.value() == FEATURE_ENDPOINT_HALT =>
        {
            let (ep, ep_dir) = endpoint_of(setup);
            if ep != 0 {
                let stalled = match ep_dir {
                    Direction::In => usbp.stall_in(ep),
                    Direction::Out => usbp.stall_out(ep),
                };
                if stalled.is_err() {
                    return RequestOutcome::Stall;
                }
            }
            RequestOutcome::Respond(ControlResponse::empty())
        }
        (Recipient::Endpoint, Direction::In, StandardRequest::SynchFrame) => status_reply(usbp, 0),
        _ => RequestOutcome::Stall,
    }
}

/// Endpoint number and direction addressed by an endpoint-recipient request.
fn endpoint_of(setup: &SetupPacket) -> (u8, Direction) {
    let addr = (setup.index() & 0xFF) as u8;
    (addr & 0x0F, Direction::of_endpoint_addr(addr))
}
