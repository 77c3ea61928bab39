// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Sharing a driver between thread context and the USB interrupt.
//!
//! The interrupt handler and ordinary code both need `&mut UsbDriver`: the
//! former to report hardware events, the latter to start and cancel
//! transfers. Wrapping the driver here lets both get at it, one at a time,
//! with interrupts masked for the duration.
//!
//! ```ignore
//! // USB interrupt handler:
//! USB.lock(|usbp| usbd_lld::rp2040::service(usbp));
//!
//! // Thread context:
//! USB.lock(|usbp| usbp.start_transmit(2, TxBuffer::Linear(&REPORT), REPORT.len()))?;
//! ```

use core::cell::RefCell;

use critical_section::Mutex;

use crate::driver::UsbDriver;

pub struct SharedUsbDriver<'a, H> {
    inner: Mutex<RefCell<UsbDriver<'a, H>>>,
}

impl<'a, H> SharedUsbDriver<'a, H> {
    pub const fn new(driver: UsbDriver<'a, H>) -> Self {
        Self {
            inner: Mutex::new(RefCell::new(driver)),
        }
    }

    /// Runs `f` with exclusive access to the driver, inside a critical
    /// section. The section ends when `f` returns, whichever way it returns.
    ///
    /// # Panics
    ///
    /// If called again from inside `f`. Driver callbacks already receive the
    /// driver and must use that instead of locking.
    pub fn lock<R>(&self, f: impl FnOnce(&mut UsbDriver<'a, H>) -> R) -> R {
        critical_section::with(|cs| f(&mut self.inner.borrow(cs).borrow_mut()))
    }

    pub fn into_inner(self) -> UsbDriver<'a, H> {
        self.inner.into_inner().into_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::DeviceState;
    use crate::hw::UsbHardware;
    use crate::usb::{Direction, EndpointType};

    #[derive(Default)]
    struct Inert {
        inits: usize,
    }

    impl UsbHardware for Inert {
        fn init(&mut self) {
            self.inits += 1;
        }
        fn enable(&mut self) {}
        fn disable(&mut self) {}
        fn reset(&mut self) {}
        fn connect(&mut self) {}
        fn disconnect(&mut self) {}
        fn set_address(&mut self, _address: u8) {}
        fn init_endpoint(&mut self, _ep: u8, _ep_type: EndpointType, _in_max: u16, _out_max: u16) {}
        fn disable_endpoints(&mut self) {}
        fn read_setup(&mut self, _ep: u8, _buf: &mut [u8; 8]) {}
        fn write_packet(&mut self, _ep: u8, _data: &[u8]) {}
        fn prepare_out(&mut self, _ep: u8, _max_len: usize) {}
        fn read_packet(&mut self, _ep: u8, _buf: &mut [u8]) -> usize {
            0
        }
        fn stall(&mut self, _ep: u8, _dir: Direction) {}
        fn clear_stall(&mut self, _ep: u8, _dir: Direction) {}
    }

    #[test]
    fn lock_hands_out_the_driver() {
        let shared = SharedUsbDriver::new(UsbDriver::new(Inert::default()));
        let state = shared.lock(|usbp| {
            usbp.init().unwrap();
            usbp.state()
        });
        assert_eq!(state, DeviceState::Stopped);

        // The lock is released again after each use.
        shared.lock(|usbp| assert!(usbp.init().is_err()));

        let driver = shared.into_inner();
        assert_eq!(driver.hardware().inits, 1);
    }
}
