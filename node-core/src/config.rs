//! Build-time operational parameters.
//!
//! Nothing here changes at runtime. Credentials and the server endpoint can
//! be supplied through environment variables when the firmware is compiled
//! (`NODE_WIFI_SSID`, `NODE_WIFI_PASSWORD`, `NODE_SERVER_IP`,
//! `NODE_SERVER_PORT`); otherwise the defaults below apply.

use crate::calendar::{CalendarDate, CalendarTime, TimeOfDay};

pub const DEFAULT_WIFI_SSID: &str = "sensor-net";
pub const DEFAULT_WIFI_PASSWORD: &str = "";
pub const DEFAULT_SERVER_IP: &str = "192.168.1.10";
pub const DEFAULT_SERVER_PORT: u16 = 5005;
pub const DEFAULT_SNTP_SERVER: &str = "2.gr.pool.ntp.org";
pub const DEFAULT_TIMEZONE_HOURS: i8 = 2;

/// Seconds between the end of one cycle and the next wake.
pub const SLEEP_INTERVAL_SECS: u32 = 1_800;

/// Failed steps tolerated in one lifecycle pass.
pub const MAX_RETRIES: u32 = 5;

/// Link id the modem reports for the telemetry socket.
pub const RESERVED_LINK_ID: i32 = 4;

/// Calendar value written at power-on, before network time is known.
pub const DEFAULT_CALENDAR: CalendarTime =
    CalendarTime::new(CalendarDate::new(7, 9, 8, 24), TimeOfDay::new(20, 45, 0));

/// Station auto-reconnect policy handed to the modem.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ReconnectPolicy {
    pub interval_secs: u16,
    pub attempts: u16,
}

/// Everything the node needs to know before it boots.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct NodeConfig {
    pub wifi_ssid: &'static str,
    pub wifi_password: &'static str,
    pub server_ip: &'static str,
    pub server_port: u16,
    pub sntp_server: &'static str,
    pub timezone_hours: i8,
    pub reconnect: ReconnectPolicy,
    pub reserved_link_id: i32,
    pub sleep_interval_secs: u32,
    pub max_retries: u32,
    pub initial_calendar: CalendarTime,
}

impl NodeConfig {
    /// Defaults with the compile-time environment overrides applied.
    ///
    /// # Panics
    ///
    /// Fails the build when `NODE_SERVER_PORT` is not a port number.
    #[must_use]
    pub const fn from_build_env() -> Self {
        Self {
            wifi_ssid: env_or(option_env!("NODE_WIFI_SSID"), DEFAULT_WIFI_SSID),
            wifi_password: env_or(option_env!("NODE_WIFI_PASSWORD"), DEFAULT_WIFI_PASSWORD),
            server_ip: env_or(option_env!("NODE_SERVER_IP"), DEFAULT_SERVER_IP),
            server_port: match option_env!("NODE_SERVER_PORT") {
                Some(text) => match parse_port(text) {
                    Some(port) => port,
                    None => panic!("NODE_SERVER_PORT must be a port number"),
                },
                None => DEFAULT_SERVER_PORT,
            },
            ..Self::defaults()
        }
    }

    /// Defaults without consulting the environment.
    #[must_use]
    pub const fn defaults() -> Self {
        Self {
            wifi_ssid: DEFAULT_WIFI_SSID,
            wifi_password: DEFAULT_WIFI_PASSWORD,
            server_ip: DEFAULT_SERVER_IP,
            server_port: DEFAULT_SERVER_PORT,
            sntp_server: DEFAULT_SNTP_SERVER,
            timezone_hours: DEFAULT_TIMEZONE_HOURS,
            reconnect: ReconnectPolicy {
                interval_secs: 1,
                attempts: 100,
            },
            reserved_link_id: RESERVED_LINK_ID,
            sleep_interval_secs: SLEEP_INTERVAL_SECS,
            max_retries: MAX_RETRIES,
            initial_calendar: DEFAULT_CALENDAR,
        }
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self::defaults()
    }
}

const fn env_or(value: Option<&'static str>, fallback: &'static str) -> &'static str {
    match value {
        Some(text) => text,
        None => fallback,
    }
}

/// Parses a decimal port number in a const context.
#[must_use]
pub const fn parse_port(text: &str) -> Option<u16> {
    let bytes = text.as_bytes();
    if bytes.is_empty() {
        return None;
    }

    let mut value: u32 = 0;
    let mut index = 0;
    while index < bytes.len() {
        let digit = bytes[index];
        if !digit.is_ascii_digit() {
            return None;
        }
        value = value * 10 + (digit - b'0') as u32;
        if value > u16::MAX as u32 {
            return None;
        }
        index += 1;
    }

    #[allow(clippy::cast_possible_truncation)]
    let port = value as u16;
    Some(port)
}
