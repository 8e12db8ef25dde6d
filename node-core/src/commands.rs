//! AT command catalog for the ESP32 modem.
//!
//! Fixed commands are constants. Commands that carry arguments are rendered
//! into a caller-owned [`CommandLine`] so the returned [`Command`] can borrow
//! it without allocation.

use core::fmt::Write;

use heapless::String;

use crate::at::{
    AtError, Command, ERROR_REPLY, LINE_ENDING, MAX_COMMAND_LEN, Reply, ResponseSchema, Segment,
};

/// Buffer for commands rendered at runtime.
pub type CommandLine = String<{ MAX_COMMAND_LEN - LINE_ENDING.len() }>;

pub const SHORT_TIMEOUT_MS: u32 = 1_000;
pub const DEFAULT_TIMEOUT_MS: u32 = 2_000;
pub const SIGNAL_TIMEOUT_MS: u32 = 4_000;
pub const JOIN_TIMEOUT_MS: u32 = 5_000;

pub const SLEEP_MODE: ResponseSchema = ResponseSchema::new("+SLEEP:", &[Segment::int("mode")]);

pub const STATION_STATE: ResponseSchema =
    ResponseSchema::new("+CWSTATE:", &[Segment::int("state")]);

pub const MUX_MODE: ResponseSchema = ResponseSchema::new("+CIPMUX:", &[Segment::int("mode")]);

pub const STATION_ADDRESS: ResponseSchema =
    ResponseSchema::new("+CIPSTA:ip:", &[Segment::quoted("address")]);

pub const NETWORK_TIME: ResponseSchema = ResponseSchema::new(
    "+CIPSNTPTIME:",
    &[
        Segment::word("weekday"),
        Segment::word("month"),
        Segment::int("day"),
        Segment::int("hour"),
        Segment::lit(":"),
        Segment::int("minute"),
        Segment::lit(":"),
        Segment::int("second"),
        Segment::int("year"),
    ],
);

pub const LINK_STATUS: ResponseSchema = ResponseSchema::new(
    "+CIPSTATUS:",
    &[
        Segment::int("link"),
        Segment::lit(","),
        Segment::quoted("kind"),
        Segment::lit(","),
        Segment::quoted("remote"),
        Segment::lit(","),
        Segment::int("remote_port"),
        Segment::lit(","),
        Segment::int("local_port"),
    ],
);

pub const RECEIVE_LENGTH: ResponseSchema =
    ResponseSchema::new("+CIPRECVLEN:", &[Segment::int("length")]);

pub const RECEIVE_DATA: ResponseSchema = ResponseSchema::new(
    "+CIPRECVDATA:",
    &[Segment::int("length"), Segment::lit(","), Segment::line("data")],
);

pub const IDENTIFIER: ResponseSchema =
    ResponseSchema::new("+CIPAPMAC:", &[Segment::quoted("identifier")]);

pub const SIGNAL: ResponseSchema = ResponseSchema::new(
    "+CWJAP:",
    &[
        Segment::quoted("ssid"),
        Segment::lit(","),
        Segment::quoted("bssid"),
        Segment::lit(","),
        Segment::int("channel"),
        Segment::lit(","),
        Segment::int("rssi"),
    ],
);

/// Checks the modem answers at all.
pub const PROBE: Command<'static> = Command::new("AT", Reply::ok(SHORT_TIMEOUT_MS));
pub const ECHO_OFF: Command<'static> = Command::new("ATE0", Reply::ok(SHORT_TIMEOUT_MS));
pub const SLEEP_QUERY: Command<'static> = Command::new(
    "AT+SLEEP?",
    Reply::ok(DEFAULT_TIMEOUT_MS).with_schema(&SLEEP_MODE),
);
pub const WAKE: Command<'static> = Command::new("AT+SLEEP=0", Reply::ok(SHORT_TIMEOUT_MS));
/// Light-sleep mode between cycles.
pub const POWER_DOWN: Command<'static> =
    Command::new("AT+SLEEP=1", Reply::ok(DEFAULT_TIMEOUT_MS));
pub const STATION_STATE_QUERY: Command<'static> = Command::new(
    "AT+CWSTATE?",
    Reply::ok(DEFAULT_TIMEOUT_MS).with_schema(&STATION_STATE),
);
pub const WIFI_INIT: Command<'static> = Command::new("AT+CWINIT=1", Reply::ok(SHORT_TIMEOUT_MS));
pub const STATION_MODE: Command<'static> =
    Command::new("AT+CWMODE=1", Reply::ok(SHORT_TIMEOUT_MS));
pub const MUX_QUERY: Command<'static> = Command::new(
    "AT+CIPMUX?",
    Reply::ok(SHORT_TIMEOUT_MS).with_schema(&MUX_MODE),
);
pub const SINGLE_CONNECTION: Command<'static> =
    Command::new("AT+CIPMUX=0", Reply::ok(SHORT_TIMEOUT_MS));
/// Received data waits in the modem until fetched.
pub const PASSIVE_RECEIVE: Command<'static> =
    Command::new("AT+CIPRECVTYPE=1", Reply::ok(DEFAULT_TIMEOUT_MS));
pub const STATION_ADDRESS_QUERY: Command<'static> = Command::new(
    "AT+CIPSTA?",
    Reply::ok(SHORT_TIMEOUT_MS).with_schema(&STATION_ADDRESS),
);
pub const NETWORK_TIME_QUERY: Command<'static> = Command::new(
    "AT+CIPSNTPTIME?",
    Reply::ok(DEFAULT_TIMEOUT_MS).with_schema(&NETWORK_TIME),
);
pub const LINK_STATUS_QUERY: Command<'static> = Command::new(
    "AT+CIPSTATUS",
    Reply::ok(DEFAULT_TIMEOUT_MS).with_schema(&LINK_STATUS),
);
pub const RECEIVE_LENGTH_QUERY: Command<'static> = Command::new(
    "AT+CIPRECVLEN?",
    Reply::ok(DEFAULT_TIMEOUT_MS).with_schema(&RECEIVE_LENGTH),
);
pub const CLOSE_SOCKET: Command<'static> =
    Command::new("AT+CIPCLOSE", Reply::ok(DEFAULT_TIMEOUT_MS));
pub const IDENTIFIER_QUERY: Command<'static> = Command::new(
    "AT+CIPAPMAC?",
    Reply::ok(SHORT_TIMEOUT_MS).with_schema(&IDENTIFIER),
);
pub const SIGNAL_QUERY: Command<'static> = Command::new(
    "AT+CWJAP?",
    Reply::ok(SIGNAL_TIMEOUT_MS).with_schema(&SIGNAL),
);

/// Renders `AT+CWJAP="<ssid>","<password>"`.
///
/// # Errors
///
/// Returns [`AtError::CommandTooLong`] when the line does not fit.
pub fn join_access_point<'b>(
    line: &'b mut CommandLine,
    ssid: &str,
    password: &str,
) -> Result<Command<'b>, AtError> {
    render(
        line,
        format_args!("AT+CWJAP=\"{ssid}\",\"{password}\""),
        Reply::ok(JOIN_TIMEOUT_MS).with_failures(&[ERROR_REPLY, "FAIL"]),
    )
}

/// Renders `AT+CWRECONNCFG=<interval>,<attempts>`.
///
/// # Errors
///
/// Returns [`AtError::CommandTooLong`] when the line does not fit.
pub fn reconnect_policy(
    line: &mut CommandLine,
    interval_secs: u16,
    attempts: u16,
) -> Result<Command<'_>, AtError> {
    render(
        line,
        format_args!("AT+CWRECONNCFG={interval_secs},{attempts}"),
        Reply::ok(SHORT_TIMEOUT_MS),
    )
}

/// Renders `AT+CIPSNTPCFG=1,<timezone>,"<server>"`.
///
/// # Errors
///
/// Returns [`AtError::CommandTooLong`] when the line does not fit.
pub fn configure_network_time<'b>(
    line: &'b mut CommandLine,
    timezone_hours: i8,
    server: &str,
) -> Result<Command<'b>, AtError> {
    render(
        line,
        format_args!("AT+CIPSNTPCFG=1,{timezone_hours},\"{server}\""),
        Reply::ok(SHORT_TIMEOUT_MS),
    )
}

/// Renders `AT+CIPSTART="UDP","<ip>",<port>,<port>`.
///
/// # Errors
///
/// Returns [`AtError::CommandTooLong`] when the line does not fit.
pub fn open_udp<'b>(
    line: &'b mut CommandLine,
    server_ip: &str,
    port: u16,
) -> Result<Command<'b>, AtError> {
    render(
        line,
        format_args!("AT+CIPSTART=\"UDP\",\"{server_ip}\",{port},{port}"),
        Reply::ok(DEFAULT_TIMEOUT_MS),
    )
}

/// Renders `AT+CIPSEND=<length>`; the modem answers with a `>` prompt.
///
/// # Errors
///
/// Returns [`AtError::CommandTooLong`] when the line does not fit.
pub fn announce_send(line: &mut CommandLine, length: usize) -> Result<Command<'_>, AtError> {
    render(
        line,
        format_args!("AT+CIPSEND={length}"),
        Reply::ok(DEFAULT_TIMEOUT_MS).with_terminator(">"),
    )
}

/// The payload itself, acknowledged with `SEND OK`.
#[must_use]
pub const fn send_payload(payload: &str) -> Command<'_> {
    Command::new(
        payload,
        Reply::ok(DEFAULT_TIMEOUT_MS)
            .with_terminator("SEND OK")
            .with_failures(&[ERROR_REPLY, "SEND FAIL"]),
    )
}

/// Renders `AT+CIPRECVDATA=<length>`.
///
/// # Errors
///
/// Returns [`AtError::CommandTooLong`] when the line does not fit.
pub fn fetch_received(line: &mut CommandLine, length: usize) -> Result<Command<'_>, AtError> {
    render(
        line,
        format_args!("AT+CIPRECVDATA={length}"),
        Reply::ok(DEFAULT_TIMEOUT_MS).with_schema(&RECEIVE_DATA),
    )
}

fn render<'b>(
    line: &'b mut CommandLine,
    args: core::fmt::Arguments<'_>,
    reply: Reply,
) -> Result<Command<'b>, AtError> {
    line.clear();
    line.write_fmt(args).map_err(|_| AtError::CommandTooLong)?;
    Ok(Command::new(line.as_str(), reply))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_join_command() {
        let mut line = CommandLine::new();
        let command = join_access_point(&mut line, "lab", "secret").expect("fits");
        assert_eq!(command.text, "AT+CWJAP=\"lab\",\"secret\"");
        assert_eq!(command.reply.timeout_ms, JOIN_TIMEOUT_MS);
        assert_eq!(command.reply.failures, &[ERROR_REPLY, "FAIL"]);
    }

    #[test]
    fn renders_udp_open_with_mirrored_ports() {
        let mut line = CommandLine::new();
        let command = open_udp(&mut line, "10.0.0.2", 5005).expect("fits");
        assert_eq!(command.text, "AT+CIPSTART=\"UDP\",\"10.0.0.2\",5005,5005");
    }

    #[test]
    fn rejects_oversized_lines() {
        let mut line = CommandLine::new();
        let bytes = [b'x'; 200];
        let long = core::str::from_utf8(&bytes).expect("ascii");
        assert_eq!(
            join_access_point(&mut line, long, "pw"),
            Err(AtError::CommandTooLong)
        );
    }

    #[test]
    fn send_prompt_terminates_on_prompt() {
        let mut line = CommandLine::new();
        let command = announce_send(&mut line, 34).expect("fits");
        assert_eq!(command.text, "AT+CIPSEND=34");
        assert_eq!(command.reply.terminator, ">");
    }
}
