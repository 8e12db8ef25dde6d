//! Power-on self test of the modem and the network link.

use core::fmt;

use crate::at::{ExchangeObserver, Transport};
use crate::config::NodeConfig;
use crate::modem::{Modem, ModemError};
use crate::status::NodeStatus;
use crate::time::Monotonic;

/// Result of a single probe check.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Check {
    Pass,
    Fail(ModemError),
}

impl Check {
    fn from_result<T>(result: Result<T, ModemError>) -> Self {
        match result {
            Ok(_) => Check::Pass,
            Err(error) => Check::Fail(error),
        }
    }

    #[must_use]
    pub const fn passed(&self) -> bool {
        matches!(self, Check::Pass)
    }
}

/// Boot-time self test results.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ProbeReport {
    /// The modem had to be woken from its sleep mode.
    pub woke_modem: bool,
    pub echo_disabled: Check,
    pub modem: Check,
    /// Joined (or already joined) the access point.
    pub connection: Check,
    pub identifier: Check,
    pub signal: Check,
    pub status: NodeStatus,
}

impl ProbeReport {
    fn checks(&self) -> [&Check; 5] {
        [
            &self.echo_disabled,
            &self.modem,
            &self.connection,
            &self.identifier,
            &self.signal,
        ]
    }

    #[must_use]
    pub fn passed(&self) -> u32 {
        let count = self.checks().iter().filter(|check| check.passed()).count();
        u32::try_from(count).unwrap_or(u32::MAX)
    }

    #[must_use]
    pub fn failed(&self) -> u32 {
        5 - self.passed()
    }

    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.failed() == 0
    }
}

impl fmt::Display for ProbeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "-- WIFI MODEM      : {}",
            if self.modem.passed() { "OK" } else { "FAIL" }
        )?;
        writeln!(
            f,
            "-- WIFI CONNECTION : {}",
            if self.connection.passed() {
                "CONNECTED"
            } else {
                "DISCONNECTED"
            }
        )?;
        match self.identifier {
            Check::Pass => writeln!(f, "-- IDENTIFIER      : OK\t({})", self.status.identifier)?,
            Check::Fail(_) => writeln!(f, "-- IDENTIFIER      : FAIL")?,
        }
        match self.signal {
            Check::Pass => writeln!(f, "-- RSSI            : OK\t({})", self.status.rssi),
            Check::Fail(_) => writeln!(f, "-- RSSI            : FAIL"),
        }
    }
}

/// Runs the self test and leaves what it learned in `status`.
///
/// Every check runs even when an earlier one fails.
pub fn run_probe<T, C, O, const N: usize>(
    modem: &mut Modem<'_, T, C, O, N>,
    status: &mut NodeStatus,
    config: &NodeConfig,
) -> ProbeReport
where
    T: Transport,
    C: Monotonic,
    O: ExchangeObserver,
{
    let woke_modem = !matches!(modem.sleep_mode(), Ok(0)) && modem.wake().is_ok();
    let echo_disabled = Check::from_result(modem.disable_echo());
    let probe = Check::from_result(modem.probe());

    let connection = match modem.query_status(status) {
        Ok(state) if state.is_connected() => Check::Pass,
        _ => Check::from_result(modem.join_network(status, config)),
    };
    let identifier = Check::from_result(modem.query_identifier(status));
    let signal = Check::from_result(modem.query_signal_strength(status));

    ProbeReport {
        woke_modem,
        echo_disabled,
        modem: probe,
        connection,
        identifier,
        signal,
        status: status.clone(),
    }
}
