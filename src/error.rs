// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Failures reported synchronously by the transfer API.

use core::fmt;

/// Reasons an operation on the driver can be refused.
///
/// None of these are retried internally. A bus reset is never reported here;
/// it shows up only as [`UsbEvent::Reset`](crate::config::UsbEvent::Reset).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Error {
    /// The driver is not in a state that permits the operation (for example,
    /// starting a transfer while stopped).
    InvalidState,
    /// A transfer is already in flight on that endpoint direction.
    EndpointBusy,
    /// The endpoint number is out of range, or the endpoint/direction has not
    /// been configured.
    InvalidEndpoint,
    /// The endpoint direction is halted. Clear the stall before starting a new
    /// transfer on it.
    ProtocolStall,
    /// A queue-mode transfer was given a queue whose capacity is below one
    /// packet, so it could never make progress.
    QueueTooSmall,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Error::InvalidState => "operation not permitted in current device state",
            Error::EndpointBusy => "endpoint direction already has a transfer in flight",
            Error::InvalidEndpoint => "endpoint not configured or out of range",
            Error::ProtocolStall => "endpoint direction is stalled",
            Error::QueueTooSmall => "queue cannot hold a full packet",
        };
        f.write_str(s)
    }
}
