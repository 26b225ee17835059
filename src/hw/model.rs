use serde::Serialize;

/// A BLE peripheral observed during a scan.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct DiscoveredDevice {
    adapter_name: String,
    device_id: String,
    identifier: Option<String>,
    address: String,
    rssi: Option<i16>,
}

impl DiscoveredDevice {
    /// Creates a new discovered-device record.
    pub(crate) fn new(
        adapter_name: String,
        device_id: String,
        identifier: Option<String>,
        address: String,
        rssi: Option<i16>,
    ) -> Self {
        Self {
            adapter_name,
            device_id,
            identifier,
            address,
            rssi,
        }
    }

    /// Returns the adapter name used to discover this device.
    #[must_use]
    pub fn adapter_name(&self) -> &str {
        &self.adapter_name
    }

    /// Returns the backend-specific device identifier.
    #[must_use]
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Returns the advertised name, if present.
    #[must_use]
    pub fn identifier(&self) -> Option<&str> {
        self.identifier.as_deref()
    }

    /// Returns the hardware address.
    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Returns the latest observed RSSI value, if present.
    #[must_use]
    pub fn rssi(&self) -> Option<i16> {
        self.rssi
    }

    /// Returns `true` when the advertised name equals `name` exactly.
    #[must_use]
    pub fn is_named(&self, name: &str) -> bool {
        self.identifier.as_deref() == Some(name)
    }
}

/// Lifecycle state of a connection manager.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Serialize, strum_macros::Display)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Scanning,
    Connected,
}

/// Result of a disconnect request.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, strum_macros::Display)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DisconnectOutcome {
    /// There was no link to tear down.
    NotConnected,
    /// The link was torn down.
    Disconnected,
}
