use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use bon::Builder;
use tracing::{debug, info, instrument};

use super::adapter::{BleAdapter, NotificationSink};
use super::model::DiscoveredDevice;
use crate::error::{FixtureError, InteractionError};
use crate::protocol::ServiceEndpoint;

/// Parsed fake scan fixture records.
///
/// Records are `adapter|address|name|rssi`, separated by `;`. Use `-` for a
/// missing name or RSSI.
#[derive(Debug, Clone, derive_more::Into)]
pub struct ScanFixture {
    devices: Vec<DiscoveredDevice>,
}

impl FromStr for ScanFixture {
    type Err = FixtureError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let devices = parse_scan_fixture(value)?;
        Ok(Self { devices })
    }
}

/// Parsed fake hex payload.
#[derive(Debug, Clone, derive_more::Into)]
pub struct HexPayload {
    payload: Vec<u8>,
}

impl FromStr for HexPayload {
    type Err = FixtureError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let payload = parse_hex(value)?;
        Ok(Self { payload })
    }
}

/// Parsed fake notification payloads, comma separated.
#[derive(Debug, Clone, derive_more::Into)]
pub struct NotificationPayloads {
    payloads: Vec<Vec<u8>>,
}

impl FromStr for NotificationPayloads {
    type Err = FixtureError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let payloads = parse_notifications(value)?;
        Ok(Self { payloads })
    }
}

/// Settings for constructing a [`FakeAdapter`].
#[derive(Debug, Builder)]
pub struct FakeAdapterConfig {
    scan_fixture: ScanFixture,
    /// Number of leading scans that observe nothing.
    #[builder(default)]
    missed_scans: usize,
    status_payload: Option<HexPayload>,
    /// Payloads emitted to a sink as soon as it subscribes.
    notifications: Option<NotificationPayloads>,
}

/// Write flavour recorded by the fake adapter.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum WriteMode {
    WithResponse,
    WithoutResponse,
}

/// One write observed by the fake adapter.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct RecordedWrite {
    endpoint: ServiceEndpoint,
    payload: Vec<u8>,
    mode: WriteMode,
}

impl RecordedWrite {
    /// Target endpoint.
    #[must_use]
    pub fn endpoint(&self) -> ServiceEndpoint {
        self.endpoint
    }

    /// Bytes as written.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Write flavour.
    #[must_use]
    pub fn mode(&self) -> WriteMode {
        self.mode
    }
}

#[derive(Default)]
struct FakeState {
    scans: usize,
    connected: Option<String>,
    link_lost: bool,
    writes: Vec<RecordedWrite>,
    sinks: HashMap<ServiceEndpoint, NotificationSink>,
    write_failure: Option<String>,
}

impl FakeState {
    fn require_link(&self) -> Result<(), InteractionError> {
        match (&self.connected, self.link_lost) {
            (Some(_), _) => Ok(()),
            (None, true) => Err(InteractionError::LinkLost),
            (None, false) => Err(InteractionError::NotConnected),
        }
    }
}

fn lock(state: &Mutex<FakeState>) -> MutexGuard<'_, FakeState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// In-memory adapter used in tests and non-hardware environments.
pub struct FakeAdapter {
    devices: Vec<DiscoveredDevice>,
    missed_scans: usize,
    status_payload: Vec<u8>,
    notifications: Vec<Vec<u8>>,
    state: Arc<Mutex<FakeState>>,
}

impl FakeAdapter {
    /// Creates a fake adapter from explicit settings.
    #[must_use]
    pub fn new(config: FakeAdapterConfig) -> Self {
        Self {
            devices: config.scan_fixture.into(),
            missed_scans: config.missed_scans,
            status_payload: config.status_payload.map(Into::into).unwrap_or_default(),
            notifications: config.notifications.map(Into::into).unwrap_or_default(),
            state: Arc::default(),
        }
    }

    /// Returns a handle observing and steering this adapter.
    #[must_use]
    pub fn probe(&self) -> FakeAdapterProbe {
        FakeAdapterProbe {
            state: Arc::clone(&self.state),
        }
    }

    fn record_write(
        &self,
        endpoint: ServiceEndpoint,
        payload: &[u8],
        mode: WriteMode,
    ) -> Result<(), InteractionError> {
        let mut state = lock(&self.state);
        state.require_link()?;
        if let Some(message) = state.write_failure.clone() {
            return Err(InteractionError::Transport { message });
        }
        state.writes.push(RecordedWrite {
            endpoint,
            payload: payload.to_vec(),
            mode,
        });
        Ok(())
    }
}

impl fmt::Debug for FakeAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FakeAdapter")
            .field("devices", &self.devices)
            .field("missed_scans", &self.missed_scans)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl BleAdapter for FakeAdapter {
    #[instrument(skip(self), level = "debug")]
    async fn scan_for(&self, timeout: Duration) -> Result<Vec<DiscoveredDevice>, InteractionError> {
        let scans = {
            let mut state = lock(&self.state);
            state.scans += 1;
            state.scans
        };
        if scans <= self.missed_scans {
            debug!(scans, "fake scan observed nothing");
            return Ok(Vec::new());
        }
        Ok(self.devices.clone())
    }

    async fn connect(&self, device: &DiscoveredDevice) -> Result<(), InteractionError> {
        if !self
            .devices
            .iter()
            .any(|candidate| candidate.device_id() == device.device_id())
        {
            return Err(InteractionError::UnknownDevice {
                device_id: device.device_id().to_string(),
            });
        }

        let mut state = lock(&self.state);
        state.connected = Some(device.device_id().to_string());
        state.link_lost = false;
        info!(device_id = device.device_id(), "fake peripheral connected");
        Ok(())
    }

    async fn disconnect(&self, _device: &DiscoveredDevice) -> Result<(), InteractionError> {
        let mut state = lock(&self.state);
        state.connected = None;
        state.sinks.clear();
        Ok(())
    }

    async fn write_command(
        &self,
        endpoint: ServiceEndpoint,
        payload: &[u8],
    ) -> Result<(), InteractionError> {
        self.record_write(endpoint, payload, WriteMode::WithoutResponse)
    }

    async fn write_request(
        &self,
        endpoint: ServiceEndpoint,
        payload: &[u8],
    ) -> Result<(), InteractionError> {
        self.record_write(endpoint, payload, WriteMode::WithResponse)
    }

    async fn read(&self, _endpoint: ServiceEndpoint) -> Result<Vec<u8>, InteractionError> {
        lock(&self.state).require_link()?;
        Ok(self.status_payload.clone())
    }

    async fn subscribe(
        &self,
        endpoint: ServiceEndpoint,
        sink: NotificationSink,
    ) -> Result<(), InteractionError> {
        {
            let mut state = lock(&self.state);
            state.require_link()?;
            state.sinks.insert(endpoint, Arc::clone(&sink));
        }

        for payload in &self.notifications {
            sink(payload);
        }
        Ok(())
    }

    async fn unsubscribe(&self, endpoint: ServiceEndpoint) -> Result<(), InteractionError> {
        let mut state = lock(&self.state);
        state.require_link()?;
        state.sinks.remove(&endpoint);
        Ok(())
    }
}

/// Shared view of a [`FakeAdapter`]'s recorded activity.
#[derive(Clone)]
pub struct FakeAdapterProbe {
    state: Arc<Mutex<FakeState>>,
}

impl FakeAdapterProbe {
    /// Number of scans performed so far.
    #[must_use]
    pub fn scan_count(&self) -> usize {
        lock(&self.state).scans
    }

    /// Every successful write, in order.
    #[must_use]
    pub fn writes(&self) -> Vec<RecordedWrite> {
        lock(&self.state).writes.clone()
    }

    /// Returns `true` while a peripheral is connected.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        lock(&self.state).connected.is_some()
    }

    /// Returns `true` when notifications are enabled on `endpoint`.
    #[must_use]
    pub fn is_subscribed(&self, endpoint: ServiceEndpoint) -> bool {
        lock(&self.state).sinks.contains_key(&endpoint)
    }

    /// Pushes a notification to the sink subscribed on `endpoint`.
    ///
    /// Returns `false` when nothing is subscribed there.
    pub fn notify(&self, endpoint: ServiceEndpoint, payload: &[u8]) -> bool {
        let sink = lock(&self.state).sinks.get(&endpoint).cloned();
        match sink {
            Some(sink) => {
                sink(payload);
                true
            }
            None => false,
        }
    }

    /// Makes every following write fail with a transport error.
    pub fn fail_writes(&self, message: impl Into<String>) {
        lock(&self.state).write_failure = Some(message.into());
    }

    /// Simulates the peripheral going out of range.
    pub fn drop_link(&self) {
        let mut state = lock(&self.state);
        state.connected = None;
        state.link_lost = true;
        state.sinks.clear();
    }
}

impl fmt::Debug for FakeAdapterProbe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FakeAdapterProbe").finish_non_exhaustive()
    }
}

fn parse_scan_fixture(raw_fixture: &str) -> Result<Vec<DiscoveredDevice>, FixtureError> {
    if raw_fixture.trim().is_empty() {
        return Err(FixtureError::EmptyFixture);
    }

    raw_fixture
        .split(';')
        .map(parse_scan_record)
        .collect::<Result<Vec<_>, _>>()
}

fn parse_scan_record(raw_record: &str) -> Result<DiscoveredDevice, FixtureError> {
    let fields: Vec<&str> = raw_record.split('|').map(str::trim).collect();
    let [adapter, address, name, rssi] = fields.as_slice() else {
        return Err(FixtureError::InvalidRecordFieldCount);
    };
    if [adapter, address, name, rssi]
        .iter()
        .any(|field| field.is_empty())
    {
        return Err(FixtureError::EmptyRecordField);
    }

    let identifier = (*name != "-").then(|| (*name).to_string());
    let rssi = if *rssi == "-" {
        None
    } else {
        Some(rssi.parse::<i16>()?)
    };

    Ok(DiscoveredDevice::new(
        (*adapter).to_string(),
        format!("{adapter}/{address}"),
        identifier,
        (*address).to_string(),
        rssi,
    ))
}

fn parse_notifications(raw_value: &str) -> Result<Vec<Vec<u8>>, FixtureError> {
    if raw_value.trim().is_empty() {
        return Ok(Vec::new());
    }
    raw_value.split(',').map(parse_hex).collect()
}

fn parse_hex(raw_value: &str) -> Result<Vec<u8>, FixtureError> {
    let cleaned: String = raw_value.chars().filter(|c| !c.is_whitespace()).collect();
    hex::decode(&cleaned).map_err(|_| FixtureError::InvalidHex { value: cleaned })
}
