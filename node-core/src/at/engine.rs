use core::fmt;

use heapless::Vec;

use super::schema::{Fields, scan_reply};
use super::{AtError, Command, LINE_ENDING, MAX_COMMAND_LEN, MAX_RESPONSE_LEN};
use crate::rx::{RX_CAPACITY, RxRing};
use crate::time::{Monotonic, wait_until};

/// Write half of the modem link.
pub trait Transport {
    /// Writes every byte of `bytes`, blocking until they are queued.
    ///
    /// # Errors
    ///
    /// Returns [`TransmitError`] when the peripheral rejects the write.
    fn transmit(&mut self, bytes: &[u8]) -> Result<(), TransmitError>;
}

/// The transport could not send the command.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct TransmitError;

impl fmt::Display for TransmitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("transmit error")
    }
}

/// Sees every exchange after it ends; used for diagnostic echo.
pub trait ExchangeObserver {
    fn on_exchange(&mut self, command: &str, reply: &[u8], outcome: Result<(), AtError>);
}

/// Observer that ignores every exchange.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoopObserver;

impl ExchangeObserver for NoopObserver {
    fn on_exchange(&mut self, _command: &str, _reply: &[u8], _outcome: Result<(), AtError>) {}
}

/// A completed exchange: the bytes received and the fields decoded from them.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Response {
    raw: Vec<u8, MAX_RESPONSE_LEN>,
    fields: Fields,
}

impl Response {
    #[must_use]
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    /// Reply text up to the first byte that is not valid UTF-8.
    #[must_use]
    pub fn text(&self) -> &str {
        utf8_prefix(&self.raw)
    }

    #[must_use]
    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    #[must_use]
    pub fn contains(&self, needle: &str) -> bool {
        contains(&self.raw, needle)
    }
}

enum Completion {
    Terminated,
    Rejected,
}

/// Drives request/response exchanges with the modem.
pub struct AtEngine<'r, T, C, O, const N: usize = RX_CAPACITY> {
    transport: T,
    clock: C,
    rx: &'r RxRing<N>,
    observer: O,
}

impl<'r, T, C, const N: usize> AtEngine<'r, T, C, NoopObserver, N>
where
    T: Transport,
    C: Monotonic,
{
    #[must_use]
    pub const fn new(transport: T, clock: C, rx: &'r RxRing<N>) -> Self {
        Self {
            transport,
            clock,
            rx,
            observer: NoopObserver,
        }
    }
}

impl<'r, T, C, O, const N: usize> AtEngine<'r, T, C, O, N>
where
    T: Transport,
    C: Monotonic,
    O: ExchangeObserver,
{
    /// Replaces the exchange observer.
    #[must_use]
    pub fn with_observer<P>(self, observer: P) -> AtEngine<'r, T, C, P, N>
    where
        P: ExchangeObserver,
    {
        AtEngine {
            transport: self.transport,
            clock: self.clock,
            rx: self.rx,
            observer,
        }
    }

    #[must_use]
    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    #[must_use]
    pub fn observer(&self) -> &O {
        &self.observer
    }

    pub fn observer_mut(&mut self) -> &mut O {
        &mut self.observer
    }

    /// Runs one exchange.
    ///
    /// Bytes that were in the receive ring before the command went out are
    /// never part of the reply.
    ///
    /// # Errors
    ///
    /// * [`AtError::Timeout`] when the terminator does not arrive in time.
    /// * [`AtError::Failed`] when the modem sends its failure reply first.
    /// * [`AtError::Mismatch`] when the reply lacks the schema's marker or fields.
    /// * [`AtError::CommandTooLong`] / [`AtError::Transmit`] when nothing was sent.
    pub fn execute(&mut self, command: &Command<'_>) -> Result<Response, AtError> {
        let mut raw = Vec::new();
        let outcome = self.exchange(command, &mut raw);
        self.observer.on_exchange(
            command.text,
            &raw,
            outcome.as_ref().map(|_| ()).map_err(|error| *error),
        );

        let fields = outcome?;
        Ok(Response { raw, fields })
    }

    fn exchange(
        &mut self,
        command: &Command<'_>,
        raw: &mut Vec<u8, MAX_RESPONSE_LEN>,
    ) -> Result<Fields, AtError> {
        if command.text.len() + LINE_ENDING.len() > MAX_COMMAND_LEN {
            return Err(AtError::CommandTooLong);
        }

        let reply = command.reply;
        let rx = self.rx;
        let mark = rx.mark();

        self.transport.transmit(command.text.as_bytes())?;
        self.transport.transmit(LINE_ENDING)?;

        let completion = wait_until(&self.clock, reply.timeout_ms.max(1), || {
            if rx.contains_since(mark, reply.terminator.as_bytes()) {
                Some(Completion::Terminated)
            } else if reply
                .failures
                .iter()
                .any(|failure| rx.contains_since(mark, failure.as_bytes()))
            {
                Some(Completion::Rejected)
            } else {
                None
            }
        });
        raw.clear();
        rx.copy_since(mark, raw);

        match completion {
            Err(_) => Err(AtError::Timeout),
            Ok(Completion::Rejected) => Err(AtError::Failed),
            Ok(Completion::Terminated) => match reply.schema {
                Some(schema) => scan_reply(schema, utf8_prefix(raw)).map_err(AtError::Mismatch),
                None => Ok(Fields::new()),
            },
        }
    }
}

fn contains(haystack: &[u8], needle: &str) -> bool {
    let needle = needle.as_bytes();
    needle.is_empty() || haystack.windows(needle.len()).any(|window| window == needle)
}

fn utf8_prefix(bytes: &[u8]) -> &str {
    match core::str::from_utf8(bytes) {
        Ok(text) => text,
        Err(error) => core::str::from_utf8(&bytes[..error.valid_up_to()]).unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contains_matches_anywhere() {
        assert!(contains(b"\r\nSEND OK\r\n", "SEND OK"));
        assert!(contains(b"abc", ""));
        assert!(!contains(b"OK", "SEND OK"));
    }

    #[test]
    fn utf8_prefix_stops_at_invalid_byte() {
        assert_eq!(utf8_prefix(b"+CWSTATE:2\xff\xfe"), "+CWSTATE:2");
    }
}
