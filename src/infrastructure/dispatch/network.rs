//! Connectivity as reported by the embedding application.

use serde::{Deserialize, Serialize};

/// Worker count used when the network type is unknown or disconnected.
pub const DEFAULT_THREAD_COUNT: usize = 3;

/// Worker count on mobile data, whatever the generation.
pub const CELLULAR_THREAD_COUNT: usize = 2;

/// Kind of network the device is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    /// Wireless LAN.
    Wifi,
    /// Wired LAN.
    Ethernet,
    /// Mobile data of any generation.
    Cellular,
    /// Unknown or unclassified.
    #[default]
    Other,
}

/// Snapshot of connectivity used for sizing the worker pool and for retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NetworkState {
    /// True while a connection is established.
    pub connected: bool,
    /// Kind of the active connection.
    pub transport: Transport,
}

impl Default for NetworkState {
    fn default() -> Self {
        Self::connected(Transport::Other)
    }
}

impl NetworkState {
    /// Connected through `transport`.
    #[must_use]
    pub const fn connected(transport: Transport) -> Self {
        Self {
            connected: true,
            transport,
        }
    }

    /// No connection.
    #[must_use]
    pub const fn disconnected() -> Self {
        Self {
            connected: false,
            transport: Transport::Other,
        }
    }

    /// Number of workers suited to this network.
    #[must_use]
    pub const fn thread_count(&self) -> usize {
        if !self.connected {
            return DEFAULT_THREAD_COUNT;
        }
        match self.transport {
            Transport::Wifi | Transport::Ethernet => 4,
            Transport::Cellular => CELLULAR_THREAD_COUNT,
            Transport::Other => DEFAULT_THREAD_COUNT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(NetworkState::connected(Transport::Wifi), 4 ; "wifi")]
    #[test_case(NetworkState::connected(Transport::Ethernet), 4 ; "ethernet")]
    #[test_case(NetworkState::connected(Transport::Cellular), 2 ; "cellular")]
    #[test_case(NetworkState::connected(Transport::Other), 3 ; "other")]
    #[test_case(NetworkState::disconnected(), 3 ; "disconnected")]
    fn test_thread_count(state: NetworkState, expected: usize) {
        assert_eq!(state.thread_count(), expected);
    }

    #[test]
    fn test_cellular_parses_from_lowercase() {
        let state: NetworkState =
            serde_json::from_str(r#"{"connected":true,"transport":"cellular"}"#).unwrap();
        assert_eq!(state.transport, Transport::Cellular);
        assert_eq!(state.thread_count(), CELLULAR_THREAD_COUNT);
    }
}
