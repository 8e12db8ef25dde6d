//! Outbound telemetry record.
//!
//! The server expects a compact JSON object with two numbered tags: `"1"`
//! carries the modem identifier and `"2"` the signal strength, in that order.

use core::fmt::{self, Write};

use heapless::String;

use crate::status::NodeStatus;

/// Longest payload the node will send.
pub const MAX_PAYLOAD_LEN: usize = 96;

/// Bytes the modem expects on top of the payload for the trailing CR-LF.
pub const PAYLOAD_FRAMING_LEN: usize = 2;

pub type Payload = String<MAX_PAYLOAD_LEN>;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PayloadError {
    TooLong,
}

impl fmt::Display for PayloadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PayloadError::TooLong => f.write_str("payload exceeds buffer"),
        }
    }
}

/// Renders the telemetry record for `status`.
///
/// # Errors
///
/// Returns [`PayloadError::TooLong`] when the record does not fit
/// [`MAX_PAYLOAD_LEN`].
pub fn build(status: &NodeStatus) -> Result<Payload, PayloadError> {
    let mut payload = Payload::new();
    write!(
        payload,
        "{{\"1\":\"{}\", \"2\":{}}}",
        status.identifier, status.rssi
    )
    .map_err(|_| PayloadError::TooLong)?;
    Ok(payload)
}

/// Length announced to the modem before the payload is sent.
#[must_use]
pub fn declared_len(payload: &str) -> usize {
    payload.len() + PAYLOAD_FRAMING_LEN
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_identifier_then_signal_strength() {
        let mut status = NodeStatus::new();
        status.set_identifier("a4:cf:12:0b:77:e1");
        status.rssi = -67;

        let payload = build(&status).expect("payload");
        assert_eq!(payload.as_str(), "{\"1\":\"a4:cf:12:0b:77:e1\", \"2\":-67}");
        assert_eq!(declared_len(&payload), payload.len() + 2);
    }
}
