use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::model::DiscoveredDevice;
use crate::error::InteractionError;
use crate::protocol::ServiceEndpoint;

/// Callback the adapter invokes for every notification on one endpoint.
pub type NotificationSink = Arc<dyn Fn(&[u8]) + Send + Sync>;

/// Platform BLE operations used by the connection manager.
///
/// Adapters hold at most one connected peripheral. Operations that need a
/// link return [`InteractionError::NotConnected`] without one, and
/// [`InteractionError::LinkLost`] when the platform reports the peripheral
/// went away.
#[async_trait]
pub trait BleAdapter: Send + Sync {
    /// Scans for `timeout` and returns every peripheral observed.
    async fn scan_for(&self, timeout: Duration) -> Result<Vec<DiscoveredDevice>, InteractionError>;

    /// Connects to a peripheral returned by the latest scan.
    async fn connect(&self, device: &DiscoveredDevice) -> Result<(), InteractionError>;

    /// Tears down the link to `device`.
    async fn disconnect(&self, device: &DiscoveredDevice) -> Result<(), InteractionError>;

    /// Writes without response.
    async fn write_command(
        &self,
        endpoint: ServiceEndpoint,
        payload: &[u8],
    ) -> Result<(), InteractionError>;

    /// Writes with response.
    async fn write_request(
        &self,
        endpoint: ServiceEndpoint,
        payload: &[u8],
    ) -> Result<(), InteractionError>;

    /// Reads the current value of `endpoint`.
    async fn read(&self, endpoint: ServiceEndpoint) -> Result<Vec<u8>, InteractionError>;

    /// Enables notifications on `endpoint`, delivering payloads to `sink`.
    async fn subscribe(
        &self,
        endpoint: ServiceEndpoint,
        sink: NotificationSink,
    ) -> Result<(), InteractionError>;

    /// Disables notifications on `endpoint`.
    async fn unsubscribe(&self, endpoint: ServiceEndpoint) -> Result<(), InteractionError>;
}
