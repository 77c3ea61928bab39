// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The device state machine and the endpoint transfer engine.
//!
//! `UsbDriver` owns the hardware glue and an arena of endpoint slots indexed
//! by endpoint number. Upper layers call the transfer API; the hardware's
//! interrupt handler calls the `on_*` event entry points. Both take
//! `&mut self`, so the driver never observes interleaved mutation. When the
//! two contexts really are different (thread code starting a transfer while
//! the USB interrupt finishes another), put the driver in a
//! [`SharedUsbDriver`](crate::SharedUsbDriver).
//!
//! Transfers never block. Starting one records it in the endpoint slot and
//! arms the first packet; each subsequent hardware-ready event moves at most
//! one more packet. The direction's completion callback runs exactly once,
//! from inside the event that observed completion.

use log::{debug, trace, warn};

use crate::config::{UsbConfig, UsbEvent, ENDPOINT_SLOTS, MAX_ENDPOINTS, MAX_PACKET_SIZE};
use crate::control::{self, ControlState, Ep0State};
use crate::endpoint::{EndpointConfig, EndpointSlot, RxBuffer, Sink, Source, TxBuffer};
use crate::error::Error;
use crate::hw::UsbHardware;
use crate::usb::{Direction, EndpointType, SetupPacket, STATUS_REMOTE_WAKEUP, STATUS_SELF_POWERED};

/// Driver lifecycle.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DeviceState {
    /// Constructed, peripheral untouched.
    Uninit,
    /// Peripheral initialized, transceiver off.
    Stopped,
    /// Transceiver on. Bus resets land here; the device may have an address
    /// but has no configuration selected.
    Ready,
    /// A nonzero configuration has been selected by the host.
    Active,
}

/// What one direction of an endpoint is doing.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum EndpointStatus {
    /// Not configured.
    Disabled,
    Idle,
    /// Transmitting (IN) or receiving (OUT).
    Busy,
    Stalled,
}

pub struct UsbDriver<'a, H> {
    hw: H,
    state: DeviceState,
    config: Option<UsbConfig<'a, H>>,
    pub(crate) endpoints: [EndpointSlot<'a, H>; ENDPOINT_SLOTS],
    /// Bit map of the transmitting IN endpoints.
    transmitting: u16,
    /// Bit map of the receiving OUT endpoints.
    receiving: u16,
    stalled_in: u16,
    stalled_out: u16,
    address: u8,
    configuration: u8,
    /// Device status word, as reported by GET_STATUS.
    status: u16,
    pub(crate) control: ControlState<'a, H>,
}

const fn bit(ep: u8) -> u16 {
    1 << ep
}

impl<'a, H: UsbHardware> UsbDriver<'a, H> {
    /// Takes ownership of the hardware glue. Nothing is touched until
    /// [`init`](Self::init).
    pub fn new(hw: H) -> Self {
        Self {
            hw,
            state: DeviceState::Uninit,
            config: None,
            endpoints: core::array::from_fn(|_| EndpointSlot::default()),
            transmitting: 0,
            receiving: 0,
            stalled_in: 0,
            stalled_out: 0,
            address: 0,
            configuration: 0,
            status: 0,
            control: ControlState::new(),
        }
    }

    /// One-time peripheral initialization. There is no way back to
    /// `Uninit`.
    pub fn init(&mut self) -> Result<(), Error> {
        if self.state != DeviceState::Uninit {
            return Err(Error::InvalidState);
        }
        self.hw.init();
        self.state = DeviceState::Stopped;
        debug!("usb: initialized");
        Ok(())
    }

    /// Enables the transceiver and starts answering on EP0.
    pub fn start(&mut self, config: UsbConfig<'a, H>) -> Result<(), Error> {
        if self.state != DeviceState::Stopped {
            return Err(Error::InvalidState);
        }
        self.config = Some(config);
        self.hw.enable();
        self.state = DeviceState::Ready;
        self.clear_device_state();
        debug!("usb: started");
        Ok(())
    }

    /// Disables every endpoint and the transceiver. Transfers in flight are
    /// abandoned without their callbacks.
    pub fn stop(&mut self) -> Result<(), Error> {
        match self.state {
            DeviceState::Uninit => Err(Error::InvalidState),
            DeviceState::Stopped => Ok(()),
            DeviceState::Ready | DeviceState::Active => {
                self.disable_all();
                self.control.reset();
                self.hw.disable_endpoints();
                self.hw.disable();
                self.config = None;
                self.address = 0;
                self.configuration = 0;
                self.state = DeviceState::Stopped;
                debug!("usb: stopped");
                Ok(())
            }
        }
    }

    pub fn connect_bus(&mut self) -> Result<(), Error> {
        self.check_running()?;
        self.hw.connect();
        Ok(())
    }

    pub fn disconnect_bus(&mut self) -> Result<(), Error> {
        self.check_running()?;
        self.hw.disconnect();
        Ok(())
    }

    pub fn state(&self) -> DeviceState {
        self.state
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    pub fn configuration(&self) -> u8 {
        self.configuration
    }

    /// The status word reported to the host by device GET_STATUS.
    pub fn device_status(&self) -> u16 {
        self.status
    }

    /// Whether the host has enabled remote wakeup.
    pub fn remote_wakeup_enabled(&self) -> bool {
        self.status & STATUS_REMOTE_WAKEUP != 0
    }

    /// Sets the self-powered bit reported by GET_STATUS.
    pub fn set_self_powered(&mut self, self_powered: bool) {
        if self_powered {
            self.status |= STATUS_SELF_POWERED;
        } else {
            self.status &= !STATUS_SELF_POWERED;
        }
    }

    pub fn hardware(&self) -> &H {
        &self.hw
    }

    pub fn hardware_mut(&mut self) -> &mut H {
        &mut self.hw
    }

    /// Current stage of the control-transfer state machine.
    pub fn ep0_state(&self) -> Ep0State {
        self.control.state
    }

    /// The SETUP packet of the control transaction in progress (or the last
    /// one).
    pub fn setup(&self) -> SetupPacket {
        self.control.setup
    }

    /// The driver's internal control buffer. A request hook can fill it and
    /// answer with [`ControlResponse::scratch`](crate::ControlResponse::scratch).
    pub fn control_scratch(&mut self) -> &mut [u8] {
        &mut self.control.scratch
    }

    /// Data received into the control scratch buffer by the last control OUT
    /// data stage. Meant to be read from the end-of-transaction callback.
    pub fn control_data(&self) -> &[u8] {
        let n = self.endpoints[0].rx.count.min(self.control.scratch.len());
        &self.control.scratch[..n]
    }

    ////////////////////////////////////////////////////////////////////////
    // Endpoint configuration.

    /// Activates endpoint `ep` with `config`.
    pub fn configure_endpoint(
        &mut self,
        ep: u8,
        config: EndpointConfig<'a, H>,
    ) -> Result<(), Error> {
        self.check_running()?;
        let idx = usize::from(ep);
        if idx > MAX_ENDPOINTS {
            return Err(Error::InvalidEndpoint);
        }
        if config.ep_type == EndpointType::Control && config.on_setup.is_none() {
            return Err(Error::InvalidEndpoint);
        }
        let sizes_ok = [config.in_dir.as_ref(), config.out_dir.as_ref()]
            .into_iter()
            .flatten()
            .all(|d| d.max_packet_size != 0 && usize::from(d.max_packet_size) <= MAX_PACKET_SIZE);
        if !sizes_ok {
            return Err(Error::InvalidEndpoint);
        }

        self.abort_in(ep);
        self.abort_out(ep);
        self.stalled_in &= !bit(ep);
        self.stalled_out &= !bit(ep);

        let slot = &mut self.endpoints[idx];
        slot.config = Some(config);
        slot.setup = [0; 8];
        self.hw.init_endpoint(ep, config.ep_type, config.in_max(), config.out_max());
        debug!("usb: ep{} configured as {:?}", ep, config.ep_type);
        Ok(())
    }

    /// Deactivates every endpoint except EP0, dropping any transfers in
    /// flight on them without invoking their callbacks.
    pub fn disable_endpoints(&mut self) -> Result<(), Error> {
        self.check_running()?;
        for ep in 1..=MAX_ENDPOINTS as u8 {
            self.abort_in(ep);
            self.abort_out(ep);
            self.endpoints[usize::from(ep)] = EndpointSlot::default();
        }
        self.stalled_in &= 1;
        self.stalled_out &= 1;
        self.hw.disable_endpoints();
        Ok(())
    }

    ////////////////////////////////////////////////////////////////////////
    // Transfers.

    /// Starts an OUT transfer of up to `size` bytes into `buffer`.
    ///
    /// For a linear buffer, `size` is clamped to the buffer's length. A queue
    /// must be able to hold at least one packet, or the transfer is refused
    /// with [`Error::QueueTooSmall`]. The transfer ends when `size` bytes have
    /// arrived or the host sends a short packet; ask
    /// [`received_size`](Self::received_size) for the exact count.
    pub fn start_receive(
        &mut self,
        ep: u8,
        buffer: RxBuffer<'a>,
        size: usize,
    ) -> Result<(), Error> {
        self.check_running()?;
        let max = usize::from(self.out_config(ep)?);
        if self.receiving & bit(ep) != 0 {
            return Err(Error::EndpointBusy);
        }
        if self.stalled_out & bit(ep) != 0 {
            return Err(Error::ProtocolStall);
        }
        let size = match &buffer {
            RxBuffer::Linear(buf) => size.min(buf.len()),
            RxBuffer::Queue(q) if q.capacity() < size.min(max) => {
                return Err(Error::QueueTooSmall);
            }
            RxBuffer::Queue(_) => size,
        };
        self.begin_out(ep, buffer.into(), size);
        Ok(())
    }

    /// Starts an IN transfer of `size` bytes from `buffer`.
    ///
    /// A `size` of zero sends a single zero-length packet. As with
    /// [`start_receive`](Self::start_receive), a queue source must be able to
    /// hold one packet.
    pub fn start_transmit(
        &mut self,
        ep: u8,
        buffer: TxBuffer<'a>,
        size: usize,
    ) -> Result<(), Error> {
        self.check_running()?;
        let max = usize::from(self.in_config(ep)?);
        if self.transmitting & bit(ep) != 0 {
            return Err(Error::EndpointBusy);
        }
        if self.stalled_in & bit(ep) != 0 {
            return Err(Error::ProtocolStall);
        }
        let size = match &buffer {
            TxBuffer::Linear(buf) => size.min(buf.len()),
            TxBuffer::Queue(q) if q.capacity() < size.min(max) => {
                return Err(Error::QueueTooSmall);
            }
            TxBuffer::Queue(_) => size,
        };
        self.begin_in(ep, buffer.into(), size);
        Ok(())
    }

    /// Restarts a queue-mode IN transfer that paused because its queue ran
    /// dry. Does nothing if the transfer isn't paused.
    pub fn resume_transmit(&mut self, ep: u8) {
        let idx = usize::from(ep);
        if idx < ENDPOINT_SLOTS
            && self.transmitting & bit(ep) != 0
            && self.endpoints[idx].tx.paused
        {
            self.arm_in(ep);
        }
    }

    /// Restarts a queue-mode OUT transfer that paused because its queue was
    /// full.
    pub fn resume_receive(&mut self, ep: u8) {
        let idx = usize::from(ep);
        if idx < ENDPOINT_SLOTS
            && self.receiving & bit(ep) != 0
            && self.endpoints[idx].rx.paused
        {
            self.arm_out(ep);
        }
    }

    /// Bytes received by the current or most recent OUT transfer on `ep`.
    pub fn received_size(&self, ep: u8) -> usize {
        self.endpoints.get(usize::from(ep)).map_or(0, |s| s.rx.count)
    }

    /// Bytes sent by the current or most recent IN transfer on `ep`.
    pub fn transmitted_size(&self, ep: u8) -> usize {
        self.endpoints.get(usize::from(ep)).map_or(0, |s| s.tx.count)
    }

    pub fn status_in(&self, ep: u8) -> EndpointStatus {
        if self.in_config(ep).is_err() {
            EndpointStatus::Disabled
        } else if self.stalled_in & bit(ep) != 0 {
            EndpointStatus::Stalled
        } else if self.transmitting & bit(ep) != 0 {
            EndpointStatus::Busy
        } else {
            EndpointStatus::Idle
        }
    }

    pub fn status_out(&self, ep: u8) -> EndpointStatus {
        if self.out_config(ep).is_err() {
            EndpointStatus::Disabled
        } else if self.stalled_out & bit(ep) != 0 {
            EndpointStatus::Stalled
        } else if self.receiving & bit(ep) != 0 {
            EndpointStatus::Busy
        } else {
            EndpointStatus::Idle
        }
    }

    /// Halts the IN direction. A transfer in flight is dropped and its
    /// callback will never run.
    pub fn stall_in(&mut self, ep: u8) -> Result<(), Error> {
        self.check_running()?;
        self.in_config(ep)?;
        self.abort_in(ep);
        self.stalled_in |= bit(ep);
        self.hw.stall(ep, Direction::In);
        debug!("usb: ep{} IN stalled", ep);
        Ok(())
    }

    /// Halts the OUT direction. A transfer in flight is dropped and its
    /// callback will never run.
    pub fn stall_out(&mut self, ep: u8) -> Result<(), Error> {
        self.check_running()?;
        self.out_config(ep)?;
        self.abort_out(ep);
        self.stalled_out |= bit(ep);
        self.hw.stall(ep, Direction::Out);
        debug!("usb: ep{} OUT stalled", ep);
        Ok(())
    }

    pub fn clear_stall_in(&mut self, ep: u8) -> Result<(), Error> {
        self.check_running()?;
        self.in_config(ep)?;
        self.stalled_in &= !bit(ep);
        self.hw.clear_stall(ep, Direction::In);
        Ok(())
    }

    pub fn clear_stall_out(&mut self, ep: u8) -> Result<(), Error> {
        self.check_running()?;
        self.out_config(ep)?;
        self.stalled_out &= !bit(ep);
        self.hw.clear_stall(ep, Direction::Out);
        Ok(())
    }

    /// Copies out the SETUP packet most recently latched on control endpoint
    /// `ep`.
    ///
    /// The latch is only overwritten when a new SETUP arrives, so this may be
    /// called at any stage of the transaction, not only from the setup
    /// callback. It reads all zeros until the first SETUP after the endpoint
    /// was configured.
    pub fn read_setup(&self, ep: u8, buf: &mut [u8; 8]) -> Result<(), Error> {
        let slot = self.endpoints.get(usize::from(ep)).ok_or(Error::InvalidEndpoint)?;
        match &slot.config {
            Some(c) if c.ep_type == EndpointType::Control => {
                *buf = slot.setup;
                Ok(())
            }
            _ => Err(Error::InvalidEndpoint),
        }
    }

    ////////////////////////////////////////////////////////////////////////
    // Hardware event entry points. Call these from the USB interrupt.

    /// The host reset the bus.
    pub fn on_reset(&mut self) {
        if !self.is_running() {
            warn!("usb: bus reset while {:?}, ignored", self.state);
            return;
        }
        debug!("usb: bus reset");
        self.state = DeviceState::Ready;
        self.hw.reset();
        self.hw.disable_endpoints();
        self.clear_device_state();
        self.emit(UsbEvent::Reset);
    }

    /// A SETUP packet was latched on `ep`.
    pub fn on_setup(&mut self, ep: u8) {
        if !self.is_running() {
            warn!("usb: setup while {:?}, ignored", self.state);
            return;
        }
        let idx = usize::from(ep);
        let cb = self.endpoints.get(idx).and_then(|s| s.config.as_ref()).and_then(|c| c.on_setup);
        let Some(cb) = cb else {
            warn!("usb: setup on non-control ep{}", ep);
            return;
        };
        let Self { hw, endpoints, .. } = self;
        hw.read_setup(ep, &mut endpoints[idx].setup);
        cb(self, ep);
    }

    /// The IN packet armed on `ep` has been collected by the host.
    pub fn on_in_complete(&mut self, ep: u8) {
        let idx = usize::from(ep);
        if idx >= ENDPOINT_SLOTS || self.transmitting & bit(ep) == 0 {
            trace!("usb: spurious IN complete on ep{}", ep);
            return;
        }
        let tx = &mut self.endpoints[idx].tx;
        if tx.paused {
            return;
        }
        tx.count += tx.packet;
        tx.packet = 0;
        trace!("usb: ep{} IN {}/{}", ep, tx.count, tx.size);
        if tx.count >= tx.size {
            tx.buffer = None;
            self.transmitting &= !bit(ep);
            let cb = self.endpoints[idx]
                .config
                .as_ref()
                .and_then(|c| c.in_dir.as_ref())
                .and_then(|d| d.on_complete);
            if let Some(cb) = cb {
                cb(self, ep);
            }
        } else {
            self.arm_in(ep);
        }
    }

    /// An OUT packet has landed in `ep`'s buffer.
    pub fn on_out_complete(&mut self, ep: u8) {
        let idx = usize::from(ep);
        if idx >= ENDPOINT_SLOTS || self.receiving & bit(ep) == 0 {
            trace!("usb: spurious OUT complete on ep{}", ep);
            return;
        }
        let Self { hw, endpoints, control, .. } = self;
        let rx = &mut endpoints[idx].rx;
        if rx.paused {
            return;
        }
        let armed = rx.packet;
        let start = rx.count;
        let received = match rx.buffer.as_mut() {
            None => return,
            Some(Sink::Linear(buf)) => hw.read_packet(ep, &mut buf[start..start + armed]),
            Some(Sink::Scratch) => hw.read_packet(ep, &mut control.scratch[start..start + armed]),
            Some(Sink::Queue(q)) => {
                let mut packet = [0; MAX_PACKET_SIZE];
                let received = hw.read_packet(ep, &mut packet[..armed]);
                // Room for `armed` bytes was checked before the packet was
                // armed, and nobody else pushes into the queue.
                q.write(&packet[..received.min(armed)]);
                received
            }
        };
        let n = received.min(armed);
        if received > armed {
            warn!("usb: ep{} OUT overrun, {} > {}", ep, received, armed);
        }
        rx.overrun = received > armed;
        rx.count += n;
        rx.packet = 0;
        trace!("usb: ep{} OUT {}/{}", ep, rx.count, rx.size);

        // Done when everything requested arrived, or the host ended early
        // with a short packet.
        if rx.count >= rx.size || n < armed {
            rx.buffer = None;
            self.receiving &= !bit(ep);
            let cb = self.endpoints[idx]
                .config
                .as_ref()
                .and_then(|c| c.out_dir.as_ref())
                .and_then(|d| d.on_complete);
            if let Some(cb) = cb {
                cb(self, ep);
            }
        } else {
            self.arm_out(ep);
        }
    }

    pub fn on_sof(&mut self) {
        self.emit(UsbEvent::StartOfFrame);
    }

    pub fn on_suspend(&mut self) {
        self.emit(UsbEvent::Suspend);
    }

    pub fn on_wakeup(&mut self) {
        self.emit(UsbEvent::Wakeup);
    }

    ////////////////////////////////////////////////////////////////////////
    // Internals shared with the control orchestrator.

    pub(crate) fn usb_config(&self) -> Option<UsbConfig<'a, H>> {
        self.config
    }

    pub(crate) fn emit(&mut self, event: UsbEvent) {
        if let Some(cb) = self.config.and_then(|c| c.event) {
            cb(self, event);
        }
    }

    /// Records a new IN transfer and arms its first packet. Callers have
    /// already checked that the direction is configured and idle.
    pub(crate) fn begin_in(&mut self, ep: u8, source: Source<'a>, size: usize) {
        self.endpoints[usize::from(ep)].tx.begin(source, size);
        self.transmitting |= bit(ep);
        self.arm_in(ep);
    }

    pub(crate) fn begin_out(&mut self, ep: u8, sink: Sink<'a>, size: usize) {
        self.endpoints[usize::from(ep)].rx.begin(sink, size);
        self.receiving |= bit(ep);
        self.arm_out(ep);
    }

    /// Drops an IN transfer without completing it.
    pub(crate) fn abort_in(&mut self, ep: u8) {
        if let Some(slot) = self.endpoints.get_mut(usize::from(ep)) {
            slot.tx.abort();
            self.transmitting &= !bit(ep);
        }
    }

    pub(crate) fn abort_out(&mut self, ep: u8) {
        if let Some(slot) = self.endpoints.get_mut(usize::from(ep)) {
            slot.rx.abort();
            self.receiving &= !bit(ep);
        }
    }

    /// Halts both directions of EP0 after a rejected or malformed control
    /// request.
    pub(crate) fn stall_ep0(&mut self) {
        self.abort_in(0);
        self.abort_out(0);
        self.stalled_in |= 1;
        self.stalled_out |= 1;
        self.hw.stall(0, Direction::In);
        self.hw.stall(0, Direction::Out);
    }

    /// Lifts an EP0 halt; SETUP packets always get through a stall.
    pub(crate) fn unstall_ep0(&mut self) {
        if self.stalled_in & 1 != 0 {
            self.stalled_in &= !1;
            self.hw.clear_stall(0, Direction::In);
        }
        if self.stalled_out & 1 != 0 {
            self.stalled_out &= !1;
            self.hw.clear_stall(0, Direction::Out);
        }
    }

    pub(crate) fn set_address(&mut self, address: u8) {
        self.address = address;
        self.hw.set_address(address);
    }

    pub(crate) fn set_configuration(&mut self, configuration: u8) {
        self.configuration = configuration;
        self.state = if configuration == 0 {
            DeviceState::Ready
        } else {
            DeviceState::Active
        };
    }

    pub(crate) fn set_remote_wakeup(&mut self, enabled: bool) {
        if enabled {
            self.status |= STATUS_REMOTE_WAKEUP;
        } else {
            self.status &= !STATUS_REMOTE_WAKEUP;
        }
    }

    ////////////////////////////////////////////////////////////////////////
    // Private helpers.

    fn is_running(&self) -> bool {
        matches!(self.state, DeviceState::Ready | DeviceState::Active)
    }

    fn check_running(&self) -> Result<(), Error> {
        if self.is_running() {
            Ok(())
        } else {
            Err(Error::InvalidState)
        }
    }

    fn in_config(&self, ep: u8) -> Result<u16, Error> {
        self.endpoints
            .get(usize::from(ep))
            .and_then(|s| s.config.as_ref())
            .and_then(|c| c.in_dir.as_ref())
            .map(|d| d.max_packet_size)
            .ok_or(Error::InvalidEndpoint)
    }

    fn out_config(&self, ep: u8) -> Result<u16, Error> {
        self.endpoints
            .get(usize::from(ep))
            .and_then(|s| s.config.as_ref())
            .and_then(|c| c.out_dir.as_ref())
            .map(|d| d.max_packet_size)
            .ok_or(Error::InvalidEndpoint)
    }

    /// Forgets every endpoint and transfer, silently.
    fn disable_all(&mut self) {
        for slot in self.endpoints.iter_mut() {
            *slot = EndpointSlot::default();
        }
        self.transmitting = 0;
        self.receiving = 0;
        self.stalled_in = 0;
        self.stalled_out = 0;
    }

    /// Post-reset state: no address, no configuration, only EP0.
    fn clear_device_state(&mut self) {
        self.address = 0;
        self.configuration = 0;
        self.status &= STATUS_SELF_POWERED;
        self.disable_all();
        self.control.reset();

        let ep0 = control::ep0_config();
        self.endpoints[0].config = Some(ep0);
        self.hw.init_endpoint(0, EndpointType::Control, ep0.in_max(), ep0.out_max());
    }

    /// Hands the next IN packet to the hardware, or pauses if a queue source
    /// doesn't have a full packet ready yet.
    fn arm_in(&mut self, ep: u8) {
        let max = match self.in_config(ep) {
            Ok(max) => usize::from(max),
            Err(_) => return,
        };
        let Self { hw, endpoints, control, .. } = self;
        let tx = &mut endpoints[usize::from(ep)].tx;
        let start = tx.count;
        let n = (tx.size - start).min(max);
        match tx.buffer.as_mut() {
            None => return,
            Some(Source::Linear(buf)) => hw.write_packet(ep, &buf[start..start + n]),
            Some(Source::Scratch) => hw.write_packet(ep, &control.scratch[start..start + n]),
            Some(Source::Queue(q)) => {
                if q.available() < n {
                    trace!("usb: ep{} IN paused, queue has {} of {}", ep, q.available(), n);
                    tx.paused = true;
                    return;
                }
                let mut packet = [0; MAX_PACKET_SIZE];
                let got = q.read(&mut packet[..n]);
                hw.write_packet(ep, &packet[..got]);
                tx.packet = got;
                tx.paused = false;
                return;
            }
        }
        tx.packet = n;
        tx.paused = false;
    }

    /// Arms the next OUT packet, or pauses if a queue sink doesn't have room
    /// for a full packet.
    fn arm_out(&mut self, ep: u8) {
        let max = match self.out_config(ep) {
            Ok(max) => usize::from(max),
            Err(_) => return,
        };
        let Self { hw, endpoints, .. } = self;
        let rx = &mut endpoints[usize::from(ep)].rx;
        let n = (rx.size - rx.count).min(max);
        match rx.buffer.as_ref() {
            None => return,
            Some(Sink::Queue(q)) if q.space() < n => {
                trace!("usb: ep{} OUT paused, queue has room for {} of {}", ep, q.space(), n);
                rx.paused = true;
                return;
            }
            Some(_) => {}
        }
        rx.packet = n;
        rx.paused = false;
        hw.prepare_out(ep, n);
    }
}
