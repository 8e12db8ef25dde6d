//! Simulated ESP32 running the AT firmware, as far as the node uses it.
//!
//! Replies are scheduled on the [`Host`] line with a per-command latency so
//! the engine sees them arrive through the receive ring over several polls.
//! Faults injected from the command line turn chosen commands into `ERROR`
//! replies or into silence.

use std::collections::VecDeque;
use std::fmt::Write as _;

use node_core::at::{TransmitError, Transport};
use node_core::config::RESERVED_LINK_ID;
use node_core::status::ConnectionStatus;

use crate::hardware::Host;

const LATENCY_MS: u32 = 3;
const JOIN_LATENCY_MS: u32 = 250;
const NETWORK_TIME_LATENCY_MS: u32 = 40;
const SIGNAL_LATENCY_MS: u32 = 25;

const STATION_ADDRESS: &str = "192.168.1.42";
const GATEWAY: &str = "192.168.1.1";
const HARDWARE_ADDRESS: &str = "a4:cf:12:0b:77:e1";
const ACCESS_POINT_BSSID: &str = "3c:84:6a:10:22:5e";

/// How an injected fault answers.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum FaultKind {
    /// Reply `ERROR`.
    Error,
    /// Never reply.
    Silent,
}

/// Makes commands starting with `command` fail `remaining` more times.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Fault {
    pub command: String,
    pub kind: FaultKind,
    pub remaining: u32,
}

impl Fault {
    /// Parses `COMMAND[:COUNT]`, for example `AT+CIPSTART:2`.
    ///
    /// # Errors
    ///
    /// Returns a message when the command is empty or the count is not a
    /// positive number.
    pub fn parse(kind: FaultKind, text: &str) -> Result<Self, String> {
        let (command, remaining) = match text.rsplit_once(':') {
            Some((command, count)) => {
                let count = count
                    .parse::<u32>()
                    .ok()
                    .filter(|count| *count > 0)
                    .ok_or_else(|| format!("Invalid fault count `{count}`"))?;
                (command, count)
            }
            None => (text, 1),
        };
        if command.is_empty() {
            return Err("Fault needs a command prefix".to_string());
        }
        Ok(Self {
            command: command.to_string(),
            kind,
            remaining,
        })
    }
}

/// Modem-side state the node can observe.
#[derive(Debug)]
struct ModemState {
    echo: bool,
    sleep_mode: i32,
    wifi_initialized: bool,
    station_mode: bool,
    station: ConnectionStatus,
    ssid: String,
    mux: i32,
    passive_receive: bool,
    sntp_configured: bool,
    link: Option<(String, u16)>,
    awaiting_data: Option<usize>,
    datagrams: VecDeque<Vec<u8>>,
    sends: u32,
}

impl Default for ModemState {
    fn default() -> Self {
        Self {
            echo: true,
            sleep_mode: 2,
            wifi_initialized: false,
            station_mode: false,
            station: ConnectionStatus::Uninitialized,
            ssid: String::new(),
            mux: 1,
            passive_receive: false,
            sntp_configured: false,
            link: None,
            awaiting_data: None,
            datagrams: VecDeque::new(),
            sends: 0,
        }
    }
}

pub struct Esp32<'h> {
    host: &'h Host,
    line: Vec<u8>,
    state: ModemState,
    faults: Vec<Fault>,
    commands: u32,
}

impl<'h> Esp32<'h> {
    #[must_use]
    pub fn new(host: &'h Host, faults: Vec<Fault>) -> Self {
        Self {
            host,
            line: Vec::new(),
            state: ModemState::default(),
            faults,
            commands: 0,
        }
    }

    /// Command lines received so far.
    #[must_use]
    pub fn commands(&self) -> u32 {
        self.commands
    }

    /// Faults that have not fired yet.
    pub fn pending_faults(&self) -> impl Iterator<Item = &Fault> {
        self.faults.iter().filter(|fault| fault.remaining > 0)
    }

    fn handle_line(&mut self, command: &str) {
        self.commands += 1;
        if self.state.echo && self.state.awaiting_data.is_none() {
            self.host.deliver_after(0, format!("{command}\r\n").as_bytes());
        }

        match self.take_fault(command) {
            Some(FaultKind::Error) => {
                self.state.awaiting_data = None;
                self.host.note(format!("esp32: injected ERROR for `{command}`"));
                self.host.deliver_after(LATENCY_MS, b"\r\nERROR\r\n");
            }
            Some(FaultKind::Silent) => {
                self.state.awaiting_data = None;
                self.host.note(format!("esp32: injected silence for `{command}`"));
            }
            None => {
                let (delay, reply) = self.respond(command);
                self.host.deliver_after(delay, reply.as_bytes());
            }
        }
    }

    fn take_fault(&mut self, command: &str) -> Option<FaultKind> {
        let fault = self
            .faults
            .iter_mut()
            .find(|fault| fault.remaining > 0 && command.starts_with(&fault.command))?;
        fault.remaining -= 1;
        Some(fault.kind)
    }

    fn respond(&mut self, command: &str) -> (u32, String) {
        if let Some(expected) = self.state.awaiting_data.take() {
            return (LATENCY_MS, self.accept_data(command, expected));
        }

        let state = &mut self.state;
        let reply = match command {
            "AT" => ok(),
            "ATE0" => {
                state.echo = false;
                ok()
            }
            "AT+SLEEP?" => format!("+SLEEP:{}\r\n\r\nOK\r\n", state.sleep_mode),
            "AT+SLEEP=0" => {
                state.sleep_mode = 0;
                ok()
            }
            "AT+SLEEP=1" => {
                state.sleep_mode = 1;
                ok()
            }
            "AT+CWSTATE?" => format!(
                "+CWSTATE:{},\"{}\"\r\n\r\nOK\r\n",
                state.station.to_wire(),
                state.ssid
            ),
            "AT+CWINIT=1" => {
                state.wifi_initialized = true;
                ok()
            }
            "AT+CWMODE=1" => {
                state.station_mode = true;
                ok()
            }
            "AT+CIPMUX?" => format!("+CIPMUX:{}\r\n\r\nOK\r\n", state.mux),
            "AT+CIPMUX=0" if state.link.is_some() => error(),
            "AT+CIPMUX=0" => {
                state.mux = 0;
                ok()
            }
            "AT+CIPRECVTYPE=1" => {
                state.passive_receive = true;
                ok()
            }
            "AT+CIPSTA?" => {
                let address = if state.station.is_connected() {
                    STATION_ADDRESS
                } else {
                    "0.0.0.0"
                };
                format!(
                    "+CIPSTA:ip:\"{address}\"\r\n+CIPSTA:gateway:\"{GATEWAY}\"\r\n\r\nOK\r\n"
                )
            }
            "AT+CIPSNTPTIME?" => return (NETWORK_TIME_LATENCY_MS, self.network_time()),
            "AT+CIPSTATUS" => link_status(state),
            "AT+CIPRECVLEN?" if !state.passive_receive => error(),
            "AT+CIPRECVLEN?" => {
                let pending = state.datagrams.front().map_or(0, Vec::len);
                format!("+CIPRECVLEN:{pending}\r\n\r\nOK\r\n")
            }
            "AT+CIPCLOSE" => match state.link.take() {
                Some(_) => "CLOSED\r\n\r\nOK\r\n".to_string(),
                None => error(),
            },
            "AT+CIPAPMAC?" => format!("+CIPAPMAC:\"{HARDWARE_ADDRESS}\"\r\n\r\nOK\r\n"),
            "AT+CWJAP?" => return (SIGNAL_LATENCY_MS, signal(state)),
            other => return self.respond_with_arguments(other),
        };
        (LATENCY_MS, reply)
    }

    fn respond_with_arguments(&mut self, command: &str) -> (u32, String) {
        let state = &mut self.state;
        if let Some(arguments) = command.strip_prefix("AT+CWJAP=") {
            if !state.wifi_initialized || !state.station_mode {
                return (LATENCY_MS, error());
            }
            state.ssid = first_quoted(arguments).unwrap_or_default().to_string();
            state.station = ConnectionStatus::Connected;
            self.host.note(format!("esp32: joined `{}`", state.ssid));
            return (
                JOIN_LATENCY_MS,
                "WIFI CONNECTED\r\nWIFI GOT IP\r\n\r\nOK\r\n".to_string(),
            );
        }
        if command.starts_with("AT+CWRECONNCFG=") {
            return (LATENCY_MS, ok());
        }
        if command.starts_with("AT+CIPSNTPCFG=") {
            state.sntp_configured = true;
            return (LATENCY_MS, ok());
        }
        if let Some(arguments) = command.strip_prefix("AT+CIPSTART=") {
            let reply = if !state.station.is_connected() {
                error()
            } else if state.link.is_some() {
                "ALREADY CONNECTED\r\n\r\nERROR\r\n".to_string()
            } else {
                match parse_udp_target(arguments) {
                    Some(target) => {
                        state.link = Some(target);
                        "CONNECT\r\n\r\nOK\r\n".to_string()
                    }
                    None => error(),
                }
            };
            return (LATENCY_MS, reply);
        }
        if let Some(length) = command.strip_prefix("AT+CIPSEND=") {
            let reply = match length.parse::<usize>() {
                Ok(length) if state.link.is_some() && length > 0 => {
                    state.awaiting_data = Some(length);
                    "\r\nOK\r\n\r\n>".to_string()
                }
                _ => error(),
            };
            return (LATENCY_MS, reply);
        }
        if let Some(length) = command.strip_prefix("AT+CIPRECVDATA=") {
            let reply = match (length.parse::<usize>(), state.datagrams.pop_front()) {
                (Ok(length), Some(mut datagram)) if length > 0 => {
                    let rest = datagram.split_off(length.min(datagram.len()));
                    if !rest.is_empty() {
                        state.datagrams.push_front(rest);
                    }
                    format!(
                        "+CIPRECVDATA:{},{}\r\n\r\nOK\r\n",
                        datagram.len(),
                        String::from_utf8_lossy(&datagram)
                    )
                }
                (_, datagram) => {
                    if let Some(datagram) = datagram {
                        state.datagrams.push_front(datagram);
                    }
                    error()
                }
            };
            return (LATENCY_MS, reply);
        }
        (LATENCY_MS, error())
    }

    /// Handles the payload line that follows a `>` prompt.
    fn accept_data(&mut self, data: &str, expected: usize) -> String {
        let received = data.len() + 2;
        if received != expected {
            self.host.note(format!(
                "esp32: announced {expected} bytes, received {received}"
            ));
            return "\r\nSEND FAIL\r\n".to_string();
        }

        self.state.sends += 1;
        self.host.note(format!("esp32: datagram to server: {data}"));
        let echo = format!("ACK {}", self.state.sends);
        self.state.datagrams.push_back(echo.into_bytes());
        format!("\r\nRecv {received} bytes\r\n\r\nSEND OK\r\n")
    }

    fn network_time(&self) -> String {
        if !self.state.sntp_configured || !self.state.station.is_connected() {
            return "+CIPSNTPTIME:Thu Jan 01 00:00:00 1970\r\nOK\r\n".to_string();
        }
        let seconds = self.host.network_seconds();
        // The network date stays fixed; only the time of day moves.
        format!(
            "+CIPSNTPTIME:Thu Aug 08 {:02}:{:02}:{:02} 2024\r\nOK\r\n",
            seconds / 3_600,
            seconds / 60 % 60,
            seconds % 60
        )
    }
}

impl Transport for Esp32<'_> {
    fn transmit(&mut self, bytes: &[u8]) -> Result<(), TransmitError> {
        self.line.extend_from_slice(bytes);
        while let Some(end) = self.line.windows(2).position(|pair| pair == b"\r\n") {
            let line: Vec<u8> = self.line.drain(..end + 2).collect();
            let command = String::from_utf8_lossy(&line[..end]).into_owned();
            self.handle_line(&command);
        }
        Ok(())
    }
}

fn ok() -> String {
    "\r\nOK\r\n".to_string()
}

fn error() -> String {
    "\r\nERROR\r\n".to_string()
}

fn link_status(state: &ModemState) -> String {
    let mut reply = String::new();
    let code = match (&state.link, state.station.is_connected()) {
        (Some(_), _) => 3,
        (None, true) => 2,
        (None, false) => 5,
    };
    let _ = write!(reply, "STATUS:{code}\r\n");
    if let Some((remote, port)) = &state.link {
        let _ = write!(
            reply,
            "+CIPSTATUS:{RESERVED_LINK_ID},\"UDP\",\"{remote}\",{port},{port},0\r\n"
        );
    }
    reply.push_str("\r\nOK\r\n");
    reply
}

fn signal(state: &ModemState) -> String {
    if !state.station.is_connected() {
        return "No AP\r\n\r\nOK\r\n".to_string();
    }
    let rssi = -61 - i64::from(state.sends % 7);
    format!(
        "+CWJAP:\"{}\",\"{ACCESS_POINT_BSSID}\",6,{rssi},0,1,3,0,1\r\n\r\nOK\r\n",
        state.ssid
    )
}

fn first_quoted(text: &str) -> Option<&str> {
    let start = text.find('"')? + 1;
    let length = text[start..].find('"')?;
    Some(&text[start..start + length])
}

/// Parses `"UDP","<ip>",<port>,<local port>`.
fn parse_udp_target(arguments: &str) -> Option<(String, u16)> {
    let mut parts = arguments.split(',');
    if parts.next()? != "\"UDP\"" {
        return None;
    }
    let remote = parts.next()?.trim_matches('"');
    let port = parts.next()?.parse().ok()?;
    Some((remote.to_string(), port))
}
