// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Endpoint configuration and per-direction transfer state.

use crate::driver::UsbDriver;
use crate::queue::{RxQueue, TxQueue};
use crate::usb::EndpointType;

/// Invoked with the endpoint number when a SETUP packet has been latched, or
/// when a transfer on a direction completes.
pub type EndpointCallback<'a, H> = fn(&mut UsbDriver<'a, H>, u8);

/// Configuration of one direction of an endpoint.
pub struct DirectionConfig<'a, H> {
    /// Maximum packet size; must be nonzero and at most
    /// [`MAX_PACKET_SIZE`](crate::config::MAX_PACKET_SIZE).
    pub max_packet_size: u16,
    /// Called once per completed transfer.
    pub on_complete: Option<EndpointCallback<'a, H>>,
}

impl<'a, H> DirectionConfig<'a, H> {
    pub fn new(max_packet_size: u16, on_complete: Option<EndpointCallback<'a, H>>) -> Self {
        Self {
            max_packet_size,
            on_complete,
        }
    }
}

/// Describes an endpoint's type, packet sizes and callbacks. Supplied once,
/// when the endpoint is activated.
///
/// A direction that is `None` is not used; transfers on it are refused.
pub struct EndpointConfig<'a, H> {
    pub ep_type: EndpointType,
    /// Receives SETUP packets. Required for control endpoints, ignored for
    /// the rest. The packet itself is latched into a dedicated 8-byte buffer
    /// per endpoint, readable with `UsbDriver::read_setup`.
    pub on_setup: Option<EndpointCallback<'a, H>>,
    pub in_dir: Option<DirectionConfig<'a, H>>,
    pub out_dir: Option<DirectionConfig<'a, H>>,
}

impl<'a, H> EndpointConfig<'a, H> {
    /// A non-control endpoint with no directions yet.
    pub fn new(ep_type: EndpointType) -> Self {
        Self {
            ep_type,
            on_setup: None,
            in_dir: None,
            out_dir: None,
        }
    }

    pub fn with_in(
        mut self,
        max_packet_size: u16,
        on_complete: Option<EndpointCallback<'a, H>>,
    ) -> Self {
        self.in_dir = Some(DirectionConfig::new(max_packet_size, on_complete));
        self
    }

    pub fn with_out(
        mut self,
        max_packet_size: u16,
        on_complete: Option<EndpointCallback<'a, H>>,
    ) -> Self {
        self.out_dir = Some(DirectionConfig::new(max_packet_size, on_complete));
        self
    }

    pub fn with_setup(mut self, on_setup: EndpointCallback<'a, H>) -> Self {
        self.on_setup = Some(on_setup);
        self
    }

    pub(crate) fn in_max(&self) -> u16 {
        self.in_dir.as_ref().map_or(0, |d| d.max_packet_size)
    }

    pub(crate) fn out_max(&self) -> u16 {
        self.out_dir.as_ref().map_or(0, |d| d.max_packet_size)
    }
}

// Derived impls would demand `H: Clone`; every field is a plain value or a
// function pointer, so copying never needs it.
impl<H> Clone for DirectionConfig<'_, H> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<H> Copy for DirectionConfig<'_, H> {}

impl<H> Clone for EndpointConfig<'_, H> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<H> Copy for EndpointConfig<'_, H> {}

/// Where the bytes of an IN transfer come from.
///
/// The buffer or queue is borrowed for as long as the driver lives; the
/// driver drops its reference when the transfer completes or is aborted.
pub enum TxBuffer<'a> {
    Linear(&'a [u8]),
    Queue(&'a mut (dyn TxQueue + Send)),
}

/// Where the bytes of an OUT transfer go.
pub enum RxBuffer<'a> {
    Linear(&'a mut [u8]),
    Queue(&'a mut (dyn RxQueue + Send)),
}

/// Transfer source as tracked by the engine: a caller's buffer or queue, or
/// the driver's own control scratch buffer.
pub(crate) enum Source<'a> {
    Linear(&'a [u8]),
    Queue(&'a mut (dyn TxQueue + Send)),
    Scratch,
}

pub(crate) enum Sink<'a> {
    Linear(&'a mut [u8]),
    Queue(&'a mut (dyn RxQueue + Send)),
    Scratch,
}

impl<'a> From<TxBuffer<'a>> for Source<'a> {
    fn from(b: TxBuffer<'a>) -> Self {
        match b {
            TxBuffer::Linear(buf) => Source::Linear(buf),
            TxBuffer::Queue(q) => Source::Queue(q),
        }
    }
}

impl<'a> From<RxBuffer<'a>> for Sink<'a> {
    fn from(b: RxBuffer<'a>) -> Self {
        match b {
            RxBuffer::Linear(buf) => Sink::Linear(buf),
            RxBuffer::Queue(q) => Sink::Queue(q),
        }
    }
}

/// Progress of one direction's transfer.
///
/// `buffer` is `Some` exactly while the transfer is in flight. `count`
/// survives completion so the caller can ask how much actually moved.
pub(crate) struct Transfer<B> {
    pub buffer: Option<B>,
    /// Requested size.
    pub size: usize,
    /// Bytes moved so far; never exceeds `size`.
    pub count: usize,
    /// Length of the packet currently handed to the hardware.
    pub packet: usize,
    /// A queue-mode transfer waiting for data (IN) or room (OUT).
    pub paused: bool,
    /// The host sent more than was armed on the last OUT packet.
    pub overrun: bool,
}

impl<B> Transfer<B> {
    pub fn begin(&mut self, buffer: B, size: usize) {
        *self = Self {
            buffer: Some(buffer),
            size,
            ..Self::default()
        };
    }

    /// Drops the in-flight buffer without touching the byte count.
    pub fn abort(&mut self) {
        self.buffer = None;
        self.packet = 0;
        self.paused = false;
    }
}

impl<B> Default for Transfer<B> {
    fn default() -> Self {
        Self {
            buffer: None,
            size: 0,
            count: 0,
            packet: 0,
            paused: false,
            overrun: false,
        }
    }
}

/// Arena slot for one endpoint number.
pub(crate) struct EndpointSlot<'a, H> {
    pub config: Option<EndpointConfig<'a, H>>,
    /// Dedicated SETUP latch; only meaningful for control endpoints.
    pub setup: [u8; 8],
    pub tx: Transfer<Source<'a>>,
    pub rx: Transfer<Sink<'a>>,
}

impl<H> Default for EndpointSlot<'_, H> {
    fn default() -> Self {
        Self {
            config: None,
            setup: [0; 8],
            tx: Transfer::default(),
            rx: Transfer::default(),
        }
    }
}
