//! Node status record shared by the modem queries, diagnostics and payload.

use core::fmt;

use heapless::String;

/// Longest station address kept.
pub const MAX_ADDRESS_LEN: usize = 40;

/// Longest modem identifier kept.
pub const MAX_IDENTIFIER_LEN: usize = 32;

/// Station association state as reported by `+CWSTATE`.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum ConnectionStatus {
    /// No connection attempt has started.
    #[default]
    Uninitialized,
    /// Associated, still waiting for an address.
    Connecting,
    /// Associated with an address.
    Connected,
    /// Lost the link and trying again.
    Reconnecting,
    /// Not associated.
    Disconnected,
}

impl ConnectionStatus {
    const UNINITIALIZED_CODE: i32 = 0;
    const CONNECTING_CODE: i32 = 1;
    const CONNECTED_CODE: i32 = 2;
    const RECONNECTING_CODE: i32 = 3;
    const DISCONNECTED_CODE: i32 = 4;

    /// Decodes the modem's state number.
    #[must_use]
    pub const fn from_wire(code: i32) -> Option<Self> {
        match code {
            Self::UNINITIALIZED_CODE => Some(ConnectionStatus::Uninitialized),
            Self::CONNECTING_CODE => Some(ConnectionStatus::Connecting),
            Self::CONNECTED_CODE => Some(ConnectionStatus::Connected),
            Self::RECONNECTING_CODE => Some(ConnectionStatus::Reconnecting),
            Self::DISCONNECTED_CODE => Some(ConnectionStatus::Disconnected),
            _ => None,
        }
    }

    #[must_use]
    pub const fn to_wire(self) -> i32 {
        match self {
            ConnectionStatus::Uninitialized => Self::UNINITIALIZED_CODE,
            ConnectionStatus::Connecting => Self::CONNECTING_CODE,
            ConnectionStatus::Connected => Self::CONNECTED_CODE,
            ConnectionStatus::Reconnecting => Self::RECONNECTING_CODE,
            ConnectionStatus::Disconnected => Self::DISCONNECTED_CODE,
        }
    }

    #[must_use]
    pub const fn is_connected(self) -> bool {
        matches!(self, ConnectionStatus::Connected)
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConnectionStatus::Uninitialized => "uninitialized",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Reconnecting => "reconnecting",
            ConnectionStatus::Disconnected => "disconnected",
        })
    }
}

/// What the node currently knows about itself and its link.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct NodeStatus {
    pub address: String<MAX_ADDRESS_LEN>,
    pub identifier: String<MAX_IDENTIFIER_LEN>,
    pub connection: ConnectionStatus,
    pub rssi: i32,
}

impl NodeStatus {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            address: String::new(),
            identifier: String::new(),
            connection: ConnectionStatus::Uninitialized,
            rssi: 0,
        }
    }

    /// Replaces the identifier, truncating to [`MAX_IDENTIFIER_LEN`].
    pub fn set_identifier(&mut self, identifier: &str) {
        replace_truncated(&mut self.identifier, identifier);
    }

    /// Replaces the station address, truncating to [`MAX_ADDRESS_LEN`].
    pub fn set_address(&mut self, address: &str) {
        replace_truncated(&mut self.address, address);
    }
}

fn replace_truncated<const N: usize>(target: &mut String<N>, value: &str) {
    target.clear();
    for ch in value.chars() {
        if target.push(ch).is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connected_and_reconnecting_stay_distinct() {
        let connected = ConnectionStatus::from_wire(2);
        let reconnecting = ConnectionStatus::from_wire(3);
        assert_eq!(connected, Some(ConnectionStatus::Connected));
        assert_eq!(reconnecting, Some(ConnectionStatus::Reconnecting));
        assert_ne!(
            ConnectionStatus::Connected.to_wire(),
            ConnectionStatus::Reconnecting.to_wire()
        );
        assert_eq!(ConnectionStatus::from_wire(9), None);
    }

    #[test]
    fn identifier_is_truncated_to_capacity() {
        let mut status = NodeStatus::new();
        status.set_identifier("0123456789abcdef0123456789abcdef-extra");
        assert_eq!(status.identifier.len(), MAX_IDENTIFIER_LEN);
        assert!(status.identifier.starts_with("0123456789abcdef"));
    }
}
