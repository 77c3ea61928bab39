// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! RP2040 USB controller backend.
//!
//! Implements [`UsbHardware`] on top of the `rp2040_pac` register blocks, and
//! provides [`service`], the interrupt handler body that turns the
//! controller's status bits into driver events.
//!
//! The caller is responsible for everything before the controller: bringing
//! `USBCTRL` out of reset and running `clk_usb` at 48 MHz from PLL_USB.
//!
//! # Buffers
//!
//! Each endpoint direction uses a single 64-byte buffer in USB DPRAM. EP0
//! shares the fixed hardware buffer at offset `0x100` between IN and OUT,
//! which works because control transfers only ever move one direction at a
//! time. The other endpoints get consecutive buffers starting at `0x180`.

use log::trace;

use crate::driver::UsbDriver;
use crate::hw::UsbHardware;
use crate::usb::{Direction, EndpointType};

const EP0_BUFFER_OFFSET: usize = 0x100;
const BUFFERS_OFFSET: usize = 0x180;
const BUFFER_SIZE: usize = 64;

pub struct Rp2040Usb {
    regs: rp2040_pac::USBCTRL_REGS,
    dpram: rp2040_pac::USBCTRL_DPRAM,
    /// DATA0/DATA1 PID expected next on each buffer control register. If
    /// `true`, we're expecting `DATA1`, otherwise `DATA0`.
    next_pid_1: [bool; 32],
    /// Address given by the host, waiting for the status stage of the
    /// SET_ADDRESS request to go out on address 0.
    pending_address: Option<u8>,
}

impl Rp2040Usb {
    pub fn new(regs: rp2040_pac::USBCTRL_REGS, dpram: rp2040_pac::USBCTRL_DPRAM) -> Self {
        Self {
            regs,
            dpram,
            next_pid_1: [false; 32],
            pending_address: None,
        }
    }

    /// Here we exploit knowledge of the ordering of buffer control registers
    /// in the peripheral. Each endpoint has a pair of registers, IN first,
    /// followed by OUT.
    fn buffer_control_index(ep: u8, dir: Direction) -> usize {
        usize::from(ep) * 2 + usize::from(dir == Direction::Out)
    }

    /// EP0 doesn't have an endpoint control register; the rest are laid out
    /// like the buffer control registers, minus EP0's pair.
    fn endpoint_control_index(ep: u8, dir: Direction) -> Option<usize> {
        match ep {
            0 => None,
            _ => Some(Self::buffer_control_index(ep, dir) - 2),
        }
    }

    fn buffer_offset(ep: u8, dir: Direction) -> usize {
        match Self::endpoint_control_index(ep, dir) {
            None => EP0_BUFFER_OFFSET,
            Some(i) => BUFFERS_OFFSET + i * BUFFER_SIZE,
        }
    }

    fn buffer_ptr(ep: u8, dir: Direction) -> *mut u8 {
        let base = rp2040_pac::USBCTRL_DPRAM::ptr() as *mut u8;
        base.wrapping_add(Self::buffer_offset(ep, dir))
    }

    /// Hands the buffer of `ep`/`dir` to the controller with the next PID.
    fn arm(&mut self, ep: u8, dir: Direction, len: usize) {
        let i = Self::buffer_control_index(ep, dir);
        let np = self.next_pid_1[i];
        self.dpram.ep_buffer_control[i].write(|w| unsafe {
            w
                // DATA0/1, depending
                .pid_0().bit(np)
                // For IN we have put data in, for OUT we want the host to
                // fill it.
                .full_0().bit(dir == Direction::In)
                // The buffer belongs to the controller now.
                .available_0().set_bit()
                // This many bytes, or up to this many bytes.
                .length_0().bits(len as u16)
        });
        // Flip the DATA0/1 PID for the next packet.
        self.next_pid_1[i] = !np;
    }
}

impl UsbHardware for Rp2040Usb {
    fn init(&mut self) {
        // Clear the control portion of DPRAM. This may not be necessary --
        // the datasheet is ambiguous -- but the C examples do it, and so do we.
        self.dpram.setup_packet_low.write(|w| unsafe { w.bits(0) });
        self.dpram.setup_packet_high.write(|w| unsafe { w.bits(0) });
        for epc in &self.dpram.ep_control {
            epc.write(|w| unsafe { w.bits(0) });
        }
        for epb in &self.dpram.ep_buffer_control {
            epb.write(|w| unsafe { w.bits(0) });
        }
    }

    fn enable(&mut self) {
        // Mux the controller to the onboard USB PHY.
        self.regs.usb_muxing.write(|w| w.to_phy().set_bit()
            .softcon().set_bit()
        );

        // Force VBUS detect. Not all RP2040 boards wire up VBUS detect.
        self.regs.usb_pwr.write(|w| w.vbus_detect().set_bit()
            .vbus_detect_override_en().set_bit()
        );

        // Enable controller in device mode.
        self.regs.main_ctrl.write(|w| w
            .controller_en().set_bit()
            .host_ndevice().clear_bit()
        );

        // Set a bit in `buff_status` every time a buffer moves through EP0.
        self.regs.sie_ctrl.write(|w| w.ep0_int_1buf().set_bit());

        self.regs.inte.write(|w| w
            .buff_status().set_bit()
            .bus_reset().set_bit()
            .setup_req().set_bit()
            .dev_suspend().set_bit()
            .dev_resume_from_host().set_bit()
            .dev_sof().set_bit()
        );
    }

    fn disable(&mut self) {
        self.regs.inte.write(|w| unsafe { w.bits(0) });
        self.regs.sie_ctrl.modify(|_, w| w.pullup_en().clear_bit());
        self.regs.main_ctrl.modify(|_, w| w.controller_en().clear_bit());
    }

    fn reset(&mut self) {
        self.pending_address = None;
        self.next_pid_1 = [false; 32];
        self.regs.addr_endp.write(|w| unsafe { w.address().bits(0) });
        // Anything armed on EP0 belongs to a transaction the host abandoned.
        for epb in &self.dpram.ep_buffer_control[..2] {
            epb.write(|w| unsafe { w.bits(0) });
        }
        self.regs.ep_stall_arm.write(|w| unsafe { w.bits(0) });
    }

    fn connect(&mut self) {
        // Present full-speed device by enabling pullup on DP. This is the
        // point where the host will notice our presence.
        self.regs.sie_ctrl.modify(|_, w| w.pullup_en().set_bit());
    }

    fn disconnect(&mut self) {
        self.regs.sie_ctrl.modify(|_, w| w.pullup_en().clear_bit());
    }

    fn set_address(&mut self, address: u8) {
        // The status stage of SET_ADDRESS still has to go out on address 0,
        // and unlike some controllers this one doesn't hold the old address
        // for us. Latch the register once EP0 IN reports the status packet
        // sent (see `service`).
        self.pending_address = Some(address);
    }

    fn init_endpoint(&mut self, ep: u8, ep_type: EndpointType, in_max: u16, out_max: u16) {
        for (dir, max) in [(Direction::In, in_max), (Direction::Out, out_max)] {
            self.next_pid_1[Self::buffer_control_index(ep, dir)] = false;
            let Some(epci) = Self::endpoint_control_index(ep, dir) else {
                continue;
            };
            if max == 0 {
                self.dpram.ep_control[epci].write(|w| unsafe { w.bits(0) });
                continue;
            }
            // The controller wants the buffer as an offset from the base of
            // USB SRAM.
            let offset = Self::buffer_offset(ep, dir) as u16;
            self.dpram.ep_control[epci].write(|w| unsafe {
                w.enable().set_bit()
                    // Please set the corresponding bit in buff_status when a
                    // buffer is done, thx.
                    .interrupt_per_buff().set_bit()
                    .endpoint_type().bits(ep_type as u8)
                    .buffer_address().bits(offset)
            });
        }
    }

    fn disable_endpoints(&mut self) {
        for epc in &self.dpram.ep_control {
            epc.write(|w| unsafe { w.bits(0) });
        }
        for epb in &self.dpram.ep_buffer_control[2..] {
            epb.write(|w| unsafe { w.bits(0) });
        }
        for pid in &mut self.next_pid_1[2..] {
            *pid = false;
        }
    }

    fn read_setup(&mut self, _ep: u8, buf: &mut [u8; 8]) {
        // The PAC models the setup buffer as two 32-bit registers. Copy it
        // out to a byte array.
        buf[..4].copy_from_slice(&self.dpram.setup_packet_low.read().bits().to_le_bytes());
        buf[4..].copy_from_slice(&self.dpram.setup_packet_high.read().bits().to_le_bytes());
    }

    fn write_packet(&mut self, ep: u8, data: &[u8]) {
        let len = data.len().min(BUFFER_SIZE);
        // Safety: we only copy into a buffer the controller isn't using: we
        // never arm an IN buffer while the previous packet is in flight.
        unsafe {
            Self::buffer_ptr(ep, Direction::In).copy_from_nonoverlapping(data.as_ptr(), len);
        }
        self.arm(ep, Direction::In, len);
    }

    fn prepare_out(&mut self, ep: u8, max_len: usize) {
        self.arm(ep, Direction::Out, max_len.min(BUFFER_SIZE));
    }

    fn read_packet(&mut self, ep: u8, buf: &mut [u8]) -> usize {
        let i = Self::buffer_control_index(ep, Direction::Out);
        let bc = self.dpram.ep_buffer_control[i].read();
        // Get the actual length of the data, which may be less than the
        // buffer size.
        let len = usize::from(bc.length_0().bits());
        let n = len.min(buf.len());
        // Safety: the controller has cleared AVAILABLE (that is what raised
        // the buffer event), so the buffer is ours until we re-arm it.
        unsafe {
            buf.as_mut_ptr().copy_from_nonoverlapping(Self::buffer_ptr(ep, Direction::Out), n);
        }
        len
    }

    fn stall(&mut self, ep: u8, dir: Direction) {
        if ep == 0 {
            // EP0 additionally needs the stall armed, or the next IN/OUT token
            // gets NAKed instead.
            self.regs.ep_stall_arm.modify(|_, w| match dir {
                Direction::In => w.ep0_in().set_bit(),
                Direction::Out => w.ep0_out().set_bit(),
            });
        }
        let i = Self::buffer_control_index(ep, dir);
        self.dpram.ep_buffer_control[i].write(|w| w.stall().set_bit());
    }

    fn clear_stall(&mut self, ep: u8, dir: Direction) {
        if ep == 0 {
            self.regs.ep_stall_arm.modify(|_, w| match dir {
                Direction::In => w.ep0_in().clear_bit(),
                Direction::Out => w.ep0_out().clear_bit(),
            });
        }
        let i = Self::buffer_control_index(ep, dir);
        self.dpram.ep_buffer_control[i].write(|w| unsafe { w.bits(0) });
        // Clearing a halt resets the data toggle.
        if ep != 0 {
            self.next_pid_1[i] = false;
        }
    }
}

/// Services pending controller interrupts. Call from the `USBCTRL_IRQ`
/// handler (with the driver locked, if it is shared).
pub fn service(usbp: &mut UsbDriver<'_, Rp2040Usb>) {
    // Check which interrupt flags are set.
    let ints = usbp.hardware().regs.ints.read();

    // Setup request received?
    if ints.setup_req().bit() {
        let hw = usbp.hardware_mut();
        // Clear the status flag (write-one-to-clear).
        hw.regs.sie_status.write(|w| w.setup_rec().set_bit());
        // Every DATA packet of the data and status stages that follow a
        // SETUP uses PID DATA1 first.
        hw.next_pid_1[Rp2040Usb::buffer_control_index(0, Direction::In)] = true;
        hw.next_pid_1[Rp2040Usb::buffer_control_index(0, Direction::Out)] = true;
        usbp.on_setup(0);
    }

    // Events on one or more buffers? (In practice, always one.)
    if ints.buff_status().bit() {
        let mut bufbits = usbp.hardware().regs.buff_status.read().bits();

        while bufbits != 0 {
            // Who's still outstanding? Find their bit index by counting how
            // many LSBs are zero.
            let lowbit_index = bufbits.trailing_zeros();
            let lowbit = 1 << lowbit_index;
            bufbits ^= lowbit;
            // Acknowledge before dispatching, so a buffer re-armed by the
            // driver can raise its own event.
            usbp.hardware().regs.buff_status.write(|w| unsafe { w.bits(lowbit) });

            let ep = (lowbit_index >> 1) as u8;
            let dir = if lowbit_index & 1 == 0 { Direction::In } else { Direction::Out };
            trace!("rp2040: buffer done ep{} {:?}", ep, dir);

            match dir {
                Direction::In => {
                    if ep == 0 {
                        // The status stage of SET_ADDRESS has gone out on the
                        // old address; switch over now.
                        let hw = usbp.hardware_mut();
                        if let Some(a) = hw.pending_address.take() {
                            hw.regs.addr_endp.write(|w| unsafe { w.address().bits(a) });
                        }
                    }
                    usbp.on_in_complete(ep);
                }
                Direction::Out => usbp.on_out_complete(ep),
            }
        }
    }

    // Has the host signaled a bus reset?
    if ints.bus_reset().bit() {
        usbp.hardware().regs.sie_status.write(|w| w.bus_reset().set_bit());
        usbp.on_reset();
    }

    if ints.dev_suspend().bit() {
        usbp.hardware().regs.sie_status.write(|w| w.suspended().set_bit());
        usbp.on_suspend();
    }

    if ints.dev_resume_from_host().bit() {
        usbp.hardware().regs.sie_status.write(|w| w.resume().set_bit());
        usbp.on_wakeup();
    }

    if ints.dev_sof().bit() {
        // Reading the frame number clears the SOF interrupt.
        let _ = usbp.hardware().regs.sof_rd.read();
        usbp.on_sof();
    }
}
