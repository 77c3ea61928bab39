// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

mod common;

use common::*;
use usbd_lld::{
    ControlResponse, DeviceState, Direction, Ep0State, EndpointConfig, EndpointStatus,
    EndpointType, RequestOutcome, SetupPacket, UsbEvent,
};

const GET_STATUS: u8 = 0x00;
const CLEAR_FEATURE: u8 = 0x01;
const SET_FEATURE: u8 = 0x03;
const SET_ADDRESS: u8 = 0x05;
const GET_DESCRIPTOR: u8 = 0x06;
const SET_DESCRIPTOR: u8 = 0x07;
const GET_CONFIGURATION: u8 = 0x08;
const SET_CONFIGURATION: u8 = 0x09;

const VENDOR_OUT: u8 = 0x40;
const VENDOR_IN: u8 = 0xC0;

/// Vendor requests understood by the test device.
fn vendor_hook<'a>(usbp: &mut Driver<'a>, setup: &SetupPacket) -> RequestOutcome<'a, MockHardware> {
    match (setup.request_type, setup.request) {
        // Take up to wLength bytes into the scratch buffer.
        (VENDOR_OUT, 0x01) => {
            let len = usize::from(setup.length());
            RequestOutcome::Respond(ControlResponse::scratch(len).with_callback(control_done))
        }
        (VENDOR_OUT, 0x02) => RequestOutcome::Stall,
        // Answer from the scratch buffer.
        (VENDOR_IN, 0x03) => {
            usbp.control_scratch()[..3].copy_from_slice(b"abc");
            RequestOutcome::Respond(ControlResponse::scratch(3).with_callback(control_done))
        }
        // Data in the wrong direction.
        (VENDOR_OUT, 0x04) => RequestOutcome::Respond(ControlResponse::send(&LANGUAGES)),
        _ => RequestOutcome::NotHandled,
    }
}

fn status_stage_in(usbp: &mut Driver<'_>) {
    assert_eq!(usbp.ep0_state(), Ep0State::InStatus);
    assert_eq!(usbp.hardware().last_write(), Some((0, vec![])));
    host_in(usbp, 0);
    assert_eq!(usbp.ep0_state(), Ep0State::WaitSetup);
}

fn status_stage_out(usbp: &mut Driver<'_>) {
    assert_eq!(usbp.ep0_state(), Ep0State::OutStatus);
    assert_eq!(usbp.hardware().armed_out(0), Some(0));
    host_out(usbp, 0, &[]);
    assert_eq!(usbp.ep0_state(), Ep0State::WaitSetup);
}

#[test]
fn get_device_descriptor() {
    let mut usbp = started();
    host_setup(&mut usbp, 0x80, GET_DESCRIPTOR, 0x0100, 0, 64);
    assert_eq!(usbp.ep0_state(), Ep0State::InData);
    assert_eq!(usbp.hardware().writes(), vec![(0, DEVICE_DESCRIPTOR.to_vec())]);

    host_in(&mut usbp, 0);
    // Short reply, so no zero-length packet.
    assert_eq!(usbp.hardware().writes().len(), 1);
    status_stage_out(&mut usbp);
}

#[test]
fn set_address_takes_effect_immediately() {
    let mut usbp = started();
    host_setup(&mut usbp, 0x00, SET_ADDRESS, 5, 0, 0);
    assert_eq!(usbp.address(), 5);
    assert_eq!(usbp.hardware().calls[0], Call::SetAddress(5));
    assert_eq!(usbp.hardware().log, vec![Log::Event(UsbEvent::Address(5))]);
    status_stage_in(&mut usbp);
    assert_eq!(usbp.state(), DeviceState::Ready);
}

#[test]
fn reply_is_truncated_to_wlength() {
    let mut usbp = started();
    host_setup(&mut usbp, 0x80, GET_DESCRIPTOR, 0x0301, 0x0409, 10);
    assert_eq!(usbp.hardware().writes(), vec![(0, LONG_STRING[..10].to_vec())]);
    host_in(&mut usbp, 0);
    status_stage_out(&mut usbp);
}

#[test]
fn long_reply_spans_packets() {
    let mut usbp = started();
    host_setup(&mut usbp, 0x80, GET_DESCRIPTOR, 0x0301, 0x0409, 255);
    host_in(&mut usbp, 0);
    assert_eq!(
        usbp.hardware().writes(),
        vec![(0, LONG_STRING[..64].to_vec()), (0, LONG_STRING[64..].to_vec())]
    );
    host_in(&mut usbp, 0);
    status_stage_out(&mut usbp);
}

#[test]
fn reply_on_packet_boundary_ends_with_zlp() {
    let mut usbp = started();
    host_setup(&mut usbp, 0x80, GET_DESCRIPTOR, 0x0200, 0, 255);
    host_in(&mut usbp, 0);
    assert_eq!(usbp.ep0_state(), Ep0State::InData);
    assert_eq!(
        usbp.hardware().writes(),
        vec![(0, CONFIG_DESCRIPTOR.to_vec()), (0, vec![])]
    );
    host_in(&mut usbp, 0);
    status_stage_out(&mut usbp);
}

#[test]
fn reply_filling_wlength_needs_no_zlp() {
    let mut usbp = started();
    host_setup(&mut usbp, 0x80, GET_DESCRIPTOR, 0x0200, 0, 64);
    host_in(&mut usbp, 0);
    assert_eq!(usbp.hardware().writes().len(), 1);
    status_stage_out(&mut usbp);
}

#[test]
fn missing_descriptor_stalls() {
    let mut usbp = started();
    host_setup(&mut usbp, 0x80, GET_DESCRIPTOR, 0x0305, 0, 255);
    assert_eq!(usbp.ep0_state(), Ep0State::Stalled);
    assert_eq!(
        usbp.hardware().calls,
        vec![Call::Stall(0, Direction::In), Call::Stall(0, Direction::Out)]
    );
    assert_eq!(usbp.hardware().log, vec![Log::Event(UsbEvent::Stalled)]);
}

#[test]
fn next_setup_clears_a_stall() {
    let mut usbp = started();
    host_setup(&mut usbp, 0x00, SET_DESCRIPTOR, 0x0100, 0, 0);
    assert_eq!(usbp.ep0_state(), Ep0State::Stalled);
    assert_eq!(usbp.status_in(0), EndpointStatus::Stalled);
    usbp.hardware_mut().calls.clear();

    host_setup(&mut usbp, 0x80, GET_STATUS, 0, 0, 2);
    assert_eq!(
        usbp.hardware().calls[..2],
        [Call::ClearStall(0, Direction::In), Call::ClearStall(0, Direction::Out)]
    );
    assert_eq!(usbp.ep0_state(), Ep0State::InData);
}

#[test]
fn class_request_without_hook_stalls() {
    let mut usbp = started();
    host_setup(&mut usbp, 0x21, 0x09, 0x0200, 0, 8);
    assert_eq!(usbp.ep0_state(), Ep0State::Stalled);
}

#[test]
fn hook_receives_out_data() {
    let mut usbp = started_with(config_with_hook(vendor_hook));
    host_setup(&mut usbp, VENDOR_OUT, 0x01, 0, 0, 4);
    assert_eq!(usbp.ep0_state(), Ep0State::OutData);
    assert_eq!(usbp.hardware().armed_out(0), Some(4));

    host_out(&mut usbp, 0, &[1, 2, 3, 4]);
    assert!(usbp.hardware().log.is_empty());
    status_stage_in(&mut usbp);
    assert_eq!(usbp.hardware().log, vec![Log::ControlDone(vec![1, 2, 3, 4])]);
}

#[test]
fn hook_answers_from_scratch() {
    let mut usbp = started_with(config_with_hook(vendor_hook));
    host_setup(&mut usbp, VENDOR_IN, 0x03, 0, 0, 16);
    assert_eq!(usbp.hardware().writes(), vec![(0, b"abc".to_vec())]);
    host_in(&mut usbp, 0);
    assert!(usbp.hardware().log.is_empty());
    status_stage_out(&mut usbp);
    assert_eq!(usbp.hardware().log.len(), 1);
}

#[test]
fn hook_can_stall() {
    let mut usbp = started_with(config_with_hook(vendor_hook));
    host_setup(&mut usbp, VENDOR_OUT, 0x02, 0, 0, 0);
    assert_eq!(usbp.ep0_state(), Ep0State::Stalled);
    assert_eq!(usbp.hardware().log, vec![Log::Event(UsbEvent::Stalled)]);
}

#[test]
fn reply_in_wrong_direction_stalls() {
    let mut usbp = started_with(config_with_hook(vendor_hook));
    host_setup(&mut usbp, VENDOR_OUT, 0x04, 0, 0, 4);
    assert_eq!(usbp.ep0_state(), Ep0State::Stalled);
}

#[test]
fn hook_falls_through_to_standard_requests() {
    let mut usbp = started_with(config_with_hook(vendor_hook));
    host_setup(&mut usbp, 0x80, GET_DESCRIPTOR, 0x0100, 0, 18);
    assert_eq!(usbp.hardware().writes(), vec![(0, DEVICE_DESCRIPTOR.to_vec())]);
}

#[test]
fn new_setup_preempts_transaction() {
    let mut usbp = started_with(config_with_hook(vendor_hook));
    host_setup(&mut usbp, VENDOR_OUT, 0x01, 0, 0, 8);
    assert_eq!(usbp.ep0_state(), Ep0State::OutData);

    // The host gives up on that one and asks something else.
    host_setup(&mut usbp, 0x80, GET_STATUS, 0, 0, 2);
    assert_eq!(usbp.ep0_state(), Ep0State::InData);
    host_in(&mut usbp, 0);
    status_stage_out(&mut usbp);

    // The abandoned transaction's callback never runs.
    assert!(usbp.hardware().log.is_empty());
}

/// Runs a GET_STATUS to completion and checks that no end-of-transaction
/// callback fired along the way.
fn get_status_without_stale_callbacks(usbp: &mut Driver<'_>) {
    host_setup(usbp, 0x80, GET_STATUS, 0, 0, 2);
    assert_eq!(usbp.ep0_state(), Ep0State::InData);
    host_in(usbp, 0);
    status_stage_out(usbp);
    assert!(!usbp.hardware().log.iter().any(|l| matches!(l, Log::ControlDone(_))));
}

#[test]
fn new_setup_preempts_in_data() {
    let mut usbp = started_with(config_with_hook(vendor_hook));
    host_setup(&mut usbp, VENDOR_IN, 0x03, 0, 0, 16);
    assert_eq!(usbp.ep0_state(), Ep0State::InData);
    get_status_without_stale_callbacks(&mut usbp);
}

#[test]
fn new_setup_preempts_out_status() {
    let mut usbp = started_with(config_with_hook(vendor_hook));
    host_setup(&mut usbp, VENDOR_IN, 0x03, 0, 0, 16);
    host_in(&mut usbp, 0);
    assert_eq!(usbp.ep0_state(), Ep0State::OutStatus);
    get_status_without_stale_callbacks(&mut usbp);
}

#[test]
fn new_setup_preempts_in_status() {
    let mut usbp = started_with(config_with_hook(vendor_hook));
    host_setup(&mut usbp, VENDOR_OUT, 0x01, 0, 0, 0);
    assert_eq!(usbp.ep0_state(), Ep0State::InStatus);
    get_status_without_stale_callbacks(&mut usbp);
}

#[test]
fn new_setup_leaves_stalled_transaction_behind() {
    let mut usbp = started_with(config_with_hook(vendor_hook));
    host_setup(&mut usbp, VENDOR_IN, 0x03, 0, 0, 16);
    host_in(&mut usbp, 0);
    host_out(&mut usbp, 0, &[0xEE]);
    assert_eq!(usbp.ep0_state(), Ep0State::Stalled);
    get_status_without_stale_callbacks(&mut usbp);
    assert_eq!(usbp.status_in(0), EndpointStatus::Idle);
}

#[test]
fn non_empty_status_packet_stalls() {
    let mut usbp = started_with(config_with_hook(vendor_hook));
    host_setup(&mut usbp, VENDOR_IN, 0x03, 0, 0, 16);
    host_in(&mut usbp, 0);
    assert_eq!(usbp.ep0_state(), Ep0State::OutStatus);
    host_out(&mut usbp, 0, &[0xEE]);
    assert_eq!(usbp.ep0_state(), Ep0State::Stalled);
    assert_eq!(usbp.hardware().log, vec![Log::Event(UsbEvent::Stalled)]);
}

#[test]
fn device_status_and_remote_wakeup() {
    let mut usbp = started();
    usbp.set_self_powered(true);
    host_setup(&mut usbp, 0x80, GET_STATUS, 0, 0, 2);
    assert_eq!(usbp.hardware().last_write(), Some((0, vec![1, 0])));
    host_in(&mut usbp, 0);
    status_stage_out(&mut usbp);

    host_setup(&mut usbp, 0x00, SET_FEATURE, 1, 0, 0);
    status_stage_in(&mut usbp);
    assert!(usbp.remote_wakeup_enabled());

    host_setup(&mut usbp, 0x80, GET_STATUS, 0, 0, 2);
    assert_eq!(usbp.hardware().last_write(), Some((0, vec![3, 0])));
    host_in(&mut usbp, 0);
    status_stage_out(&mut usbp);

    host_setup(&mut usbp, 0x00, CLEAR_FEATURE, 1, 0, 0);
    status_stage_in(&mut usbp);
    assert!(!usbp.remote_wakeup_enabled());
    assert_eq!(usbp.device_status(), 1);
}

#[test]
fn interface_status_is_zero() {
    let mut usbp = started();
    host_setup(&mut usbp, 0x81, GET_STATUS, 0, 0, 2);
    assert_eq!(usbp.hardware().last_write(), Some((0, vec![0, 0])));
}

#[test]
fn endpoint_halt_feature() {
    let mut usbp = started();
    let ep1 = EndpointConfig::new(EndpointType::Bulk).with_in(64, Some(in_done));
    usbp.configure_endpoint(1, ep1).unwrap();

    host_setup(&mut usbp, 0x02, SET_FEATURE, 0, 0x81, 0);
    assert!(usbp.hardware().calls.contains(&Call::Stall(1, Direction::In)));
    assert_eq!(usbp.status_in(1), EndpointStatus::Stalled);
    status_stage_in(&mut usbp);

    host_setup(&mut usbp, 0x82, GET_STATUS, 0, 0x81, 2);
    assert_eq!(usbp.hardware().last_write(), Some((0, vec![1, 0])));
    host_in(&mut usbp, 0);
    status_stage_out(&mut usbp);

    host_setup(&mut usbp, 0x02, CLEAR_FEATURE, 0, 0x81, 0);
    assert!(usbp.hardware().calls.contains(&Call::ClearStall(1, Direction::In)));
    assert_eq!(usbp.status_in(1), EndpointStatus::Idle);
    status_stage_in(&mut usbp);

    host_setup(&mut usbp, 0x82, GET_STATUS, 0, 0x81, 2);
    assert_eq!(usbp.hardware().last_write(), Some((0, vec![0, 0])));
}

#[test]
fn halt_requests_for_unknown_endpoints_stall() {
    let mut usbp = started();
    host_setup(&mut usbp, 0x82, GET_STATUS, 0, 0x82, 2);
    assert_eq!(usbp.ep0_state(), Ep0State::Stalled);
    host_setup(&mut usbp, 0x02, SET_FEATURE, 0, 0x02, 0);
    assert_eq!(usbp.ep0_state(), Ep0State::Stalled);
}

#[test]
fn set_configuration_activates_device() {
    let mut usbp = started();
    host_setup(&mut usbp, 0x00, SET_CONFIGURATION, 1, 0, 0);
    assert_eq!(usbp.hardware().log, vec![Log::Event(UsbEvent::Configured(1))]);
    status_stage_in(&mut usbp);
    assert_eq!(usbp.state(), DeviceState::Active);
    assert_eq!(usbp.configuration(), 1);

    host_setup(&mut usbp, 0x80, GET_CONFIGURATION, 0, 0, 1);
    assert_eq!(usbp.hardware().last_write(), Some((0, vec![1])));
    host_in(&mut usbp, 0);
    status_stage_out(&mut usbp);

    host_setup(&mut usbp, 0x00, SET_CONFIGURATION, 0, 0, 0);
    status_stage_in(&mut usbp);
    assert_eq!(usbp.state(), DeviceState::Ready);
}

#[test]
fn setup_is_readable_from_ep0() {
    let mut usbp = started();
    host_setup(&mut usbp, 0x80, GET_DESCRIPTOR, 0x0100, 0, 64);
    let mut raw = [0; 8];
    usbp.read_setup(0, &mut raw).unwrap();
    assert_eq!(raw, [0x80, 0x06, 0x00, 0x01, 0x00, 0x00, 0x40, 0x00]);
    assert_eq!(usbp.setup().length(), 64);

    // Still the same request once the data stage is over.
    host_in(&mut usbp, 0);
    assert_eq!(usbp.ep0_state(), Ep0State::OutStatus);
    let mut later = [0; 8];
    usbp.read_setup(0, &mut later).unwrap();
    assert_eq!(later, raw);
}
