//! ESP32 modem driver.
//!
//! Each operation is a short, fixed sequence of AT exchanges. Results that
//! describe the node (link state, address, identifier, signal strength) are
//! written into the caller's [`NodeStatus`].

use core::fmt;

use crate::at::schema::FieldText;
use crate::at::{AtEngine, AtError, ExchangeObserver, Fields, ScanError, Transport};
use crate::calendar::{CalendarError, CalendarTime};
use crate::commands::{self, CommandLine};
use crate::config::NodeConfig;
use crate::payload::{self, PayloadError};
use crate::rx::RX_CAPACITY;
use crate::status::{ConnectionStatus, NodeStatus};
use crate::time::Monotonic;

/// Failure of a modem operation.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ModemError {
    At(AtError),
    Payload(PayloadError),
    Calendar(CalendarError),
    /// `+CWSTATE` reported a code outside the known set.
    UnknownState(i32),
    /// The modem has nothing buffered for the socket.
    NoData,
}

impl fmt::Display for ModemError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModemError::At(error) => write!(f, "AT exchange failed: {error}"),
            ModemError::Payload(error) => write!(f, "payload: {error}"),
            ModemError::Calendar(error) => write!(f, "network time: {error}"),
            ModemError::UnknownState(code) => write!(f, "unknown station state {code}"),
            ModemError::NoData => f.write_str("no data received"),
        }
    }
}

impl From<AtError> for ModemError {
    fn from(error: AtError) -> Self {
        ModemError::At(error)
    }
}

impl From<PayloadError> for ModemError {
    fn from(error: PayloadError) -> Self {
        ModemError::Payload(error)
    }
}

impl From<CalendarError> for ModemError {
    fn from(error: CalendarError) -> Self {
        ModemError::Calendar(error)
    }
}

/// High-level modem operations over an [`AtEngine`].
pub struct Modem<'r, T, C, O, const N: usize = RX_CAPACITY> {
    engine: AtEngine<'r, T, C, O, N>,
    line: CommandLine,
}

impl<'r, T, C, O, const N: usize> Modem<'r, T, C, O, N>
where
    T: Transport,
    C: Monotonic,
    O: ExchangeObserver,
{
    #[must_use]
    pub const fn new(engine: AtEngine<'r, T, C, O, N>) -> Self {
        Self {
            engine,
            line: CommandLine::new(),
        }
    }

    pub fn engine_mut(&mut self) -> &mut AtEngine<'r, T, C, O, N> {
        &mut self.engine
    }

    #[must_use]
    pub fn engine(&self) -> &AtEngine<'r, T, C, O, N> {
        &self.engine
    }

    /// Checks the modem answers `AT`.
    ///
    /// # Errors
    ///
    /// Propagates the exchange failure.
    pub fn probe(&mut self) -> Result<(), ModemError> {
        self.engine.execute(&commands::PROBE)?;
        Ok(())
    }

    /// # Errors
    ///
    /// Propagates the exchange failure.
    pub fn disable_echo(&mut self) -> Result<(), ModemError> {
        self.engine.execute(&commands::ECHO_OFF)?;
        Ok(())
    }

    /// Returns the modem's sleep mode; `0` means awake.
    ///
    /// # Errors
    ///
    /// Propagates the exchange failure.
    pub fn sleep_mode(&mut self) -> Result<i32, ModemError> {
        let response = self.engine.execute(&commands::SLEEP_QUERY)?;
        int_field(response.fields(), "mode").map_err(ModemError::from)
    }

    /// # Errors
    ///
    /// Propagates the exchange failure.
    pub fn wake(&mut self) -> Result<(), ModemError> {
        self.engine.execute(&commands::WAKE)?;
        Ok(())
    }

    /// Reads the station state into `status.connection`.
    ///
    /// # Errors
    ///
    /// Propagates the exchange failure, or [`ModemError::UnknownState`].
    pub fn query_status(
        &mut self,
        status: &mut NodeStatus,
    ) -> Result<ConnectionStatus, ModemError> {
        let response = self.engine.execute(&commands::STATION_STATE_QUERY)?;
        let code = int_field(response.fields(), "state")?;
        let connection = ConnectionStatus::from_wire(code).ok_or(ModemError::UnknownState(code))?;
        status.connection = connection;
        Ok(connection)
    }

    /// Associates with the access point when not already connected, then
    /// puts the socket layer in single-connection, passive-receive mode and
    /// records the station address.
    ///
    /// # Errors
    ///
    /// Stops at the first failed exchange.
    pub fn join_network(
        &mut self,
        status: &mut NodeStatus,
        config: &NodeConfig,
    ) -> Result<(), ModemError> {
        if !status.connection.is_connected() {
            self.engine.execute(&commands::WIFI_INIT)?;
            self.engine.execute(&commands::STATION_MODE)?;
            let join =
                commands::join_access_point(&mut self.line, config.wifi_ssid, config.wifi_password)?;
            self.engine.execute(&join)?;
            let policy = commands::reconnect_policy(
                &mut self.line,
                config.reconnect.interval_secs,
                config.reconnect.attempts,
            )?;
            self.engine.execute(&policy)?;
            status.connection = ConnectionStatus::Connected;
        }

        let mux = self.engine.execute(&commands::MUX_QUERY)?;
        if int_field(mux.fields(), "mode")? != 0 {
            self.engine.execute(&commands::SINGLE_CONNECTION)?;
        }
        self.engine.execute(&commands::PASSIVE_RECEIVE)?;

        let station = self.engine.execute(&commands::STATION_ADDRESS_QUERY)?;
        status.set_address(text_field(station.fields(), "address")?);
        Ok(())
    }

    /// Configures SNTP and returns the network's current calendar time.
    ///
    /// # Errors
    ///
    /// Propagates the exchange failure, or [`ModemError::Calendar`] when the
    /// answer is not a valid date and time.
    pub fn sync_time(&mut self, config: &NodeConfig) -> Result<CalendarTime, ModemError> {
        let configure = commands::configure_network_time(
            &mut self.line,
            config.timezone_hours,
            config.sntp_server,
        )?;
        self.engine.execute(&configure)?;

        let response = self.engine.execute(&commands::NETWORK_TIME_QUERY)?;
        let fields = response.fields();
        let time = CalendarTime::from_network(
            text_field(fields, "weekday")?,
            text_field(fields, "month")?,
            int_field(fields, "day")?,
            (
                int_field(fields, "hour")?,
                int_field(fields, "minute")?,
                int_field(fields, "second")?,
            ),
            int_field(fields, "year")?,
        )?;
        Ok(time)
    }

    /// Opens the UDP socket unless the reserved link is already up.
    ///
    /// A status reply without a link entry means no socket is open.
    ///
    /// # Errors
    ///
    /// Propagates the exchange failure.
    pub fn open_socket(&mut self, config: &NodeConfig) -> Result<(), ModemError> {
        let link = match self.engine.execute(&commands::LINK_STATUS_QUERY) {
            Ok(response) => response.fields().int("link"),
            Err(AtError::Mismatch(_)) => None,
            Err(error) => return Err(error.into()),
        };
        if link == Some(config.reserved_link_id) {
            return Ok(());
        }

        let open = commands::open_udp(&mut self.line, config.server_ip, config.server_port)?;
        self.engine.execute(&open)?;
        Ok(())
    }

    /// Sends the telemetry record built from `status`; returns the payload
    /// length.
    ///
    /// # Errors
    ///
    /// Propagates the payload or exchange failure.
    pub fn send_telemetry(&mut self, status: &NodeStatus) -> Result<usize, ModemError> {
        let payload = payload::build(status)?;
        let announce = commands::announce_send(&mut self.line, payload::declared_len(&payload))?;
        self.engine.execute(&announce)?;
        self.engine.execute(&commands::send_payload(&payload))?;
        Ok(payload.len())
    }

    /// Fetches whatever the server sent back.
    ///
    /// # Errors
    ///
    /// Returns [`ModemError::NoData`] when nothing is buffered.
    pub fn receive(&mut self) -> Result<FieldText, ModemError> {
        let pending = self.engine.execute(&commands::RECEIVE_LENGTH_QUERY)?;
        let length = usize::try_from(int_field(pending.fields(), "length")?)
            .ok()
            .filter(|length| *length > 0)
            .ok_or(ModemError::NoData)?;

        let fetch = commands::fetch_received(&mut self.line, length)?;
        let response = self.engine.execute(&fetch)?;
        let mut data = FieldText::new();
        data.push_str(text_field(response.fields(), "data")?)
            .map_err(|_| AtError::Mismatch(ScanError::FieldTooLong("data")))?;
        Ok(data)
    }

    /// # Errors
    ///
    /// Propagates the exchange failure.
    pub fn close_socket(&mut self) -> Result<(), ModemError> {
        self.engine.execute(&commands::CLOSE_SOCKET)?;
        Ok(())
    }

    /// Puts the modem in its sleep mode until the next cycle.
    ///
    /// # Errors
    ///
    /// Propagates the exchange failure.
    pub fn power_down(&mut self) -> Result<(), ModemError> {
        self.engine.execute(&commands::POWER_DOWN)?;
        Ok(())
    }

    /// Reads the modem's hardware address into `status.identifier`.
    ///
    /// # Errors
    ///
    /// Propagates the exchange failure.
    pub fn query_identifier(&mut self, status: &mut NodeStatus) -> Result<(), ModemError> {
        let response = self.engine.execute(&commands::IDENTIFIER_QUERY)?;
        status.set_identifier(text_field(response.fields(), "identifier")?);
        Ok(())
    }

    /// Reads the access point's RSSI into `status.rssi`.
    ///
    /// # Errors
    ///
    /// Propagates the exchange failure.
    pub fn query_signal_strength(&mut self, status: &mut NodeStatus) -> Result<i32, ModemError> {
        let response = self.engine.execute(&commands::SIGNAL_QUERY)?;
        let rssi = int_field(response.fields(), "rssi")?;
        status.rssi = rssi;
        Ok(rssi)
    }
}

fn int_field(fields: &Fields, name: &'static str) -> Result<i32, AtError> {
    fields
        .int(name)
        .ok_or(AtError::Mismatch(ScanError::Field(name)))
}

fn text_field<'f>(fields: &'f Fields, name: &'static str) -> Result<&'f str, AtError> {
    fields
        .text(name)
        .ok_or(AtError::Mismatch(ScanError::Field(name)))
}
