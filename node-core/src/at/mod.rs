//! AT command/response engine.
//!
//! One exchange writes a command line to the modem, then polls the receive
//! ring until the reply terminator shows up or the timeout budget runs out.
//! Replies carrying data are decoded through a typed [`ResponseSchema`].

mod engine;
pub mod schema;

use core::fmt;

pub use engine::{AtEngine, ExchangeObserver, NoopObserver, Response, Transport, TransmitError};
pub use schema::{FieldKind, FieldValue, Fields, ResponseSchema, ScanError, Segment};

/// Longest command line accepted, including the trailing CR-LF.
pub const MAX_COMMAND_LEN: usize = 128;

/// Line terminator appended to every command.
pub const LINE_ENDING: &[u8] = b"\r\n";

/// Largest reply the engine keeps for one exchange.
pub const MAX_RESPONSE_LEN: usize = 1024;

/// Reply text the modem sends when it rejects a command.
pub const ERROR_REPLY: &str = "ERROR";

/// How a command's reply is recognised and decoded.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Reply {
    /// Marker and fields to extract once the reply is complete.
    pub schema: Option<&'static ResponseSchema>,
    /// Substring that ends the exchange successfully.
    pub terminator: &'static str,
    /// Substrings that end the exchange with [`AtError::Failed`].
    pub failures: &'static [&'static str],
    /// Budget for the whole exchange, in milliseconds.
    pub timeout_ms: u32,
}

impl Reply {
    /// A reply that ends with `OK` and fails early on `ERROR`.
    #[must_use]
    pub const fn ok(timeout_ms: u32) -> Self {
        Self {
            schema: None,
            terminator: "OK",
            failures: &[ERROR_REPLY],
            timeout_ms,
        }
    }

    #[must_use]
    pub const fn with_schema(mut self, schema: &'static ResponseSchema) -> Self {
        self.schema = Some(schema);
        self
    }

    #[must_use]
    pub const fn with_terminator(mut self, terminator: &'static str) -> Self {
        self.terminator = terminator;
        self
    }

    #[must_use]
    pub const fn with_failures(mut self, failures: &'static [&'static str]) -> Self {
        self.failures = failures;
        self
    }
}

/// A command line paired with its expected reply.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Command<'a> {
    pub text: &'a str,
    pub reply: Reply,
}

impl<'a> Command<'a> {
    #[must_use]
    pub const fn new(text: &'a str, reply: Reply) -> Self {
        Self { text, reply }
    }
}

/// Outcome of an exchange that did not end in `OK`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum AtError {
    /// The terminator did not arrive within the timeout.
    Timeout,
    /// The modem answered with one of the failure replies.
    Failed,
    /// The reply completed but did not carry the expected fields.
    Mismatch(ScanError),
    /// The command line does not fit [`MAX_COMMAND_LEN`].
    CommandTooLong,
    /// The transport refused the bytes.
    Transmit,
}

impl fmt::Display for AtError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AtError::Timeout => f.write_str("timeout"),
            AtError::Failed => f.write_str("modem reported failure"),
            AtError::Mismatch(reason) => write!(f, "unexpected reply: {reason}"),
            AtError::CommandTooLong => f.write_str("command too long"),
            AtError::Transmit => f.write_str("transmit failed"),
        }
    }
}

impl From<TransmitError> for AtError {
    fn from(_: TransmitError) -> Self {
        AtError::Transmit
    }
}
