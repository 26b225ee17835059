use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bon::Builder;
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};

use super::adapter::{BleAdapter, NotificationSink};
use super::model::{ConnectionState, DisconnectOutcome, DiscoveredDevice};
use crate::error::InteractionError;
use crate::notification::NotificationRouter;
use crate::protocol::ServiceEndpoint;

/// Scan window used by each connection attempt unless configured otherwise.
pub const DEFAULT_SCAN_TIMEOUT: Duration = Duration::from_secs(5);

/// Connection attempts made by the command-line interface unless configured otherwise.
pub const DEFAULT_ATTEMPTS: u32 = 3;

/// Timing settings for [`ConnectionManager`].
#[derive(Debug, Clone, Builder)]
pub struct ConnectionConfig {
    #[builder(default = DEFAULT_SCAN_TIMEOUT)]
    scan_timeout: Duration,
    /// Pause between failed scan attempts.
    #[builder(default)]
    retry_delay: Duration,
}

impl ConnectionConfig {
    #[must_use]
    pub fn scan_timeout(&self) -> Duration {
        self.scan_timeout
    }

    #[must_use]
    pub fn retry_delay(&self) -> Duration {
        self.retry_delay
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

#[derive(Debug, Default)]
struct LinkState {
    state: ConnectionState,
    device: Option<DiscoveredDevice>,
}

/// Owns the link to one peripheral and the notification router fed by it.
///
/// Lifecycle changes are serialised; data operations only check the state
/// and run concurrently.
pub struct ConnectionManager {
    adapter: Box<dyn BleAdapter>,
    config: ConnectionConfig,
    lifecycle: tokio::sync::Mutex<()>,
    link: Mutex<LinkState>,
    router: Arc<NotificationRouter>,
}

impl ConnectionManager {
    /// Creates a disconnected manager over `adapter`.
    #[must_use]
    pub fn new(adapter: Box<dyn BleAdapter>, config: ConnectionConfig) -> Self {
        Self {
            adapter,
            config,
            lifecycle: tokio::sync::Mutex::new(()),
            link: Mutex::default(),
            router: Arc::new(NotificationRouter::new()),
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.link().state
    }

    /// The connected device, if any.
    #[must_use]
    pub fn connected_device(&self) -> Option<DiscoveredDevice> {
        let link = self.link();
        match link.state {
            ConnectionState::Connected => link.device.clone(),
            ConnectionState::Disconnected | ConnectionState::Scanning => None,
        }
    }

    /// Returns `true` while connected.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Router receiving every notification delivered by the adapter.
    #[must_use]
    pub fn router(&self) -> &Arc<NotificationRouter> {
        &self.router
    }

    /// Scans up to `max_attempts` times for a device advertising exactly
    /// `device_name`, then connects to it.
    ///
    /// Returns the already-connected device without scanning when a link is
    /// up.
    ///
    /// # Errors
    ///
    /// Returns [`InteractionError::DeviceNotFound`] when no attempt observes
    /// the device, and adapter errors as they occur. The state is
    /// `Disconnected` after any failure.
    #[instrument(skip(self), level = "debug")]
    pub async fn connect(
        &self,
        device_name: &str,
        max_attempts: u32,
    ) -> Result<DiscoveredDevice, InteractionError> {
        if device_name.is_empty() {
            return Err(InteractionError::MissingDeviceName);
        }
        if max_attempts == 0 {
            return Err(InteractionError::NoConnectionAttempts);
        }

        let _lifecycle = self.lifecycle.lock().await;
        if let Some(device) = self.connected_device() {
            debug!(device_id = device.device_id(), "already connected");
            return Ok(device);
        }

        for attempt in 1..=max_attempts {
            self.set_state(ConnectionState::Scanning, None);
            let devices = match self.adapter.scan_for(self.config.scan_timeout).await {
                Ok(devices) => devices,
                Err(error) => {
                    self.set_state(ConnectionState::Disconnected, None);
                    return Err(error);
                }
            };

            if let Some(device) = devices
                .into_iter()
                .find(|device| device.is_named(device_name))
            {
                if let Err(error) = self.adapter.connect(&device).await {
                    self.set_state(ConnectionState::Disconnected, None);
                    return Err(error);
                }
                info!(attempt, address = device.address(), "connected to device");
                self.set_state(ConnectionState::Connected, Some(device.clone()));
                return Ok(device);
            }

            debug!(attempt, max_attempts, "device not found in scan");
            if attempt < max_attempts && !self.config.retry_delay.is_zero() {
                sleep(self.config.retry_delay).await;
            }
        }

        self.set_state(ConnectionState::Disconnected, None);
        Err(InteractionError::DeviceNotFound {
            name: device_name.to_string(),
            attempts: max_attempts,
        })
    }

    /// Tears down the link, if any.
    ///
    /// The state is `Disconnected` afterwards even when the adapter fails.
    /// Registered listeners are kept.
    ///
    /// # Errors
    ///
    /// Returns adapter errors raised while tearing down the link.
    #[instrument(skip(self), level = "debug")]
    pub async fn disconnect(&self) -> Result<DisconnectOutcome, InteractionError> {
        let _lifecycle = self.lifecycle.lock().await;
        let Some(device) = self.connected_device() else {
            self.set_state(ConnectionState::Disconnected, None);
            return Ok(DisconnectOutcome::NotConnected);
        };

        let result = self.adapter.disconnect(&device).await;
        self.set_state(ConnectionState::Disconnected, None);
        result?;
        info!(address = device.address(), "disconnected from device");
        Ok(DisconnectOutcome::Disconnected)
    }

    /// Writes `bytes` to `endpoint` without response.
    ///
    /// # Errors
    ///
    /// Returns [`InteractionError::NotConnected`] without a link, and
    /// adapter errors otherwise.
    pub async fn write(
        &self,
        endpoint: ServiceEndpoint,
        bytes: &[u8],
    ) -> Result<(), InteractionError> {
        self.ensure_connected()?;
        let result = self.adapter.write_command(endpoint, bytes).await;
        self.observe(result)
    }

    /// Writes `bytes` to `endpoint` with response.
    ///
    /// # Errors
    ///
    /// Returns [`InteractionError::NotConnected`] without a link, and
    /// adapter errors otherwise.
    pub async fn request(
        &self,
        endpoint: ServiceEndpoint,
        bytes: &[u8],
    ) -> Result<(), InteractionError> {
        self.ensure_connected()?;
        let result = self.adapter.write_request(endpoint, bytes).await;
        self.observe(result)
    }

    /// Reads the current value of `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns [`InteractionError::NotConnected`] without a link, and
    /// adapter errors otherwise.
    pub async fn read(&self, endpoint: ServiceEndpoint) -> Result<Vec<u8>, InteractionError> {
        self.ensure_connected()?;
        let result = self.adapter.read(endpoint).await;
        self.observe(result)
    }

    /// Enables notifications on `endpoint`, feeding them into the router.
    ///
    /// # Errors
    ///
    /// Returns [`InteractionError::NotConnected`] without a link, and
    /// adapter errors otherwise.
    pub async fn notify(&self, endpoint: ServiceEndpoint) -> Result<(), InteractionError> {
        self.ensure_connected()?;
        let router = Arc::clone(&self.router);
        let sink: NotificationSink = Arc::new(move |payload: &[u8]| {
            router.dispatch(endpoint, payload);
        });
        let result = self.adapter.subscribe(endpoint, sink).await;
        self.observe(result)
    }

    /// Disables notifications on `endpoint`. Router registrations are kept.
    ///
    /// # Errors
    ///
    /// Returns [`InteractionError::NotConnected`] without a link, and
    /// adapter errors otherwise.
    pub async fn stop_notify(&self, endpoint: ServiceEndpoint) -> Result<(), InteractionError> {
        self.ensure_connected()?;
        let result = self.adapter.unsubscribe(endpoint).await;
        self.observe(result)
    }

    /// Fails with `NotConnected` unless a link is up.
    pub(crate) fn ensure_connected(&self) -> Result<(), InteractionError> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(InteractionError::NotConnected)
        }
    }

    fn observe<T>(&self, result: Result<T, InteractionError>) -> Result<T, InteractionError> {
        if let Err(InteractionError::LinkLost) = &result {
            warn!("link to device lost");
            self.set_state(ConnectionState::Disconnected, None);
        }
        result
    }

    fn link(&self) -> MutexGuard<'_, LinkState> {
        self.link.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: ConnectionState, device: Option<DiscoveredDevice>) {
        let mut link = self.link();
        debug!(from = %link.state, to = %state, "connection state changed");
        link.state = state;
        link.device = device;
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::hw::fake_backend::{FakeAdapter, FakeAdapterConfig, FakeAdapterProbe};
    use crate::protocol::EndpointId;

    const FIXTURE: &str = "hci0|AA:BB:CC:DD:EE:FF|GLASSES-02FB6E|-43";

    fn manager(missed_scans: usize) -> (ConnectionManager, FakeAdapterProbe) {
        let adapter = FakeAdapter::new(
            FakeAdapterConfig::builder()
                .scan_fixture(FIXTURE.parse().unwrap())
                .missed_scans(missed_scans)
                .build(),
        );
        let probe = adapter.probe();
        (
            ConnectionManager::new(Box::new(adapter), ConnectionConfig::default()),
            probe,
        )
    }

    #[test]
    fn config_defaults_to_five_second_scans() {
        let config = ConnectionConfig::default();
        assert_eq!(Duration::from_secs(5), config.scan_timeout());
        assert_eq!(Duration::ZERO, config.retry_delay());
    }

    #[tokio::test]
    async fn connect_retries_until_device_appears() {
        let (manager, probe) = manager(2);

        let device = manager.connect("GLASSES-02FB6E", 3).await.unwrap();

        assert_eq!("AA:BB:CC:DD:EE:FF", device.address());
        assert_eq!(3, probe.scan_count());
        assert_eq!(ConnectionState::Connected, manager.state());
    }

    #[tokio::test]
    async fn connect_gives_up_after_max_attempts() {
        let (manager, probe) = manager(5);

        let result = manager.connect("GLASSES-02FB6E", 3).await;

        assert_matches!(
            result,
            Err(InteractionError::DeviceNotFound { attempts: 3, .. })
        );
        assert_eq!(3, probe.scan_count());
        assert_eq!(ConnectionState::Disconnected, manager.state());
    }

    #[tokio::test]
    async fn connect_requires_exact_name() {
        let (manager, _probe) = manager(0);
        assert_matches!(
            manager.connect("GLASSES", 1).await,
            Err(InteractionError::DeviceNotFound { .. })
        );
    }

    #[tokio::test]
    async fn connect_rejects_empty_name_and_zero_attempts() {
        let (manager, probe) = manager(0);
        assert_matches!(
            manager.connect("", 3).await,
            Err(InteractionError::MissingDeviceName)
        );
        assert_matches!(
            manager.connect("GLASSES-02FB6E", 0).await,
            Err(InteractionError::NoConnectionAttempts)
        );
        assert_eq!(0, probe.scan_count());
    }

    #[tokio::test]
    async fn connect_when_connected_does_not_rescan() {
        let (manager, probe) = manager(0);
        manager.connect("GLASSES-02FB6E", 1).await.unwrap();
        manager.connect("GLASSES-02FB6E", 1).await.unwrap();
        assert_eq!(1, probe.scan_count());
    }

    #[tokio::test]
    async fn disconnect_reports_outcome() {
        let (manager, probe) = manager(0);
        assert_eq!(
            DisconnectOutcome::NotConnected,
            manager.disconnect().await.unwrap()
        );

        manager.connect("GLASSES-02FB6E", 1).await.unwrap();
        assert_eq!(
            DisconnectOutcome::Disconnected,
            manager.disconnect().await.unwrap()
        );
        assert!(!probe.is_connected());
        assert_eq!(None, manager.connected_device());
    }

    #[tokio::test]
    async fn data_operations_require_connection() {
        let (manager, probe) = manager(0);
        let endpoint = EndpointId::CommandCharacteristic.endpoint();

        assert_matches!(
            manager.write(endpoint, &[1]).await,
            Err(InteractionError::NotConnected)
        );
        assert_matches!(
            manager.read(endpoint).await,
            Err(InteractionError::NotConnected)
        );
        assert!(probe.writes().is_empty());
    }

    #[tokio::test]
    async fn link_loss_moves_to_disconnected() {
        let (manager, probe) = manager(0);
        manager.connect("GLASSES-02FB6E", 1).await.unwrap();
        probe.drop_link();

        let result = manager
            .write(EndpointId::CommandCharacteristic.endpoint(), &[1])
            .await;

        assert_matches!(result, Err(InteractionError::LinkLost));
        assert_eq!(ConnectionState::Disconnected, manager.state());
    }

    #[tokio::test]
    async fn notifications_reach_router_listeners() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        use crate::notification::Listener;

        let (manager, probe) = manager(0);
        let endpoint = EndpointId::StatusCharacteristic.endpoint();
        let received = Arc::new(AtomicUsize::new(0));
        let listener = {
            let received = Arc::clone(&received);
            Listener::new(move |_payload| {
                received.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        };
        manager.router().subscribe(endpoint, listener);
        manager.connect("GLASSES-02FB6E", 1).await.unwrap();
        manager.notify(endpoint).await.unwrap();

        assert!(probe.notify(endpoint, &[0x01]));
        manager.stop_notify(endpoint).await.unwrap();
        assert!(!probe.notify(endpoint, &[0x02]));

        assert_eq!(1, received.load(Ordering::SeqCst));
    }
}
