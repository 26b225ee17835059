use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use btleplug::api::{Central, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType};
use btleplug::platform::{Adapter, Manager, Peripheral};
use tokio::time::sleep;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace, warn};

use super::adapter::{BleAdapter, NotificationSink};
use super::model::DiscoveredDevice;
use crate::error::InteractionError;
use crate::protocol::{self, ServiceEndpoint};

type SinkMap = Arc<Mutex<HashMap<ServiceEndpoint, NotificationSink>>>;

struct AdapterHandle {
    adapter: Adapter,
    name: String,
}

struct ConnectedLink {
    device_id: String,
    peripheral: Peripheral,
    characteristics: Vec<Characteristic>,
    sinks: SinkMap,
    forwarder: CancellationToken,
}

/// BLE adapter backed by `btleplug`.
pub(crate) struct BtleplugAdapter {
    manager: Manager,
    discovered: Mutex<HashMap<String, Peripheral>>,
    link: Mutex<Option<ConnectedLink>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn map_ble_error(error: btleplug::Error) -> InteractionError {
    match error {
        btleplug::Error::NotConnected => InteractionError::LinkLost,
        other => InteractionError::Ble(other),
    }
}

impl BtleplugAdapter {
    /// Creates the real BLE adapter.
    pub(crate) async fn new() -> Result<Self, InteractionError> {
        let manager = Manager::new().await?;
        Ok(Self {
            manager,
            discovered: Mutex::default(),
            link: Mutex::default(),
        })
    }

    #[instrument(skip(self), level = "trace")]
    async fn adapters(&self) -> Result<Vec<AdapterHandle>, InteractionError> {
        let adapters = self.manager.adapters().await?;
        if adapters.is_empty() {
            return Err(InteractionError::NoAdapters);
        }

        let mut handles = Vec::with_capacity(adapters.len());
        for adapter in adapters {
            let name = adapter.adapter_info().await?;
            handles.push(AdapterHandle { adapter, name });
        }
        Ok(handles)
    }

    fn characteristic_for(
        &self,
        endpoint: ServiceEndpoint,
    ) -> Result<(Peripheral, Characteristic), InteractionError> {
        let link = lock(&self.link);
        let link = link.as_ref().ok_or(InteractionError::NotConnected)?;
        let characteristic = link
            .characteristics
            .iter()
            .find(|candidate| {
                endpoint.matches_service(&candidate.service_uuid.to_string())
                    && endpoint.matches_characteristic(&candidate.uuid.to_string())
            })
            .cloned()
            .ok_or(InteractionError::MissingEndpoint { endpoint })?;
        Ok((link.peripheral.clone(), characteristic))
    }

    async fn write(
        &self,
        endpoint: ServiceEndpoint,
        payload: &[u8],
        write_type: WriteType,
    ) -> Result<(), InteractionError> {
        let (peripheral, characteristic) = self.characteristic_for(endpoint)?;
        peripheral
            .write(&characteristic, payload, write_type)
            .await
            .map_err(map_ble_error)
    }
}

/// Awaits `step`; on failure, awaits `undo` before handing back the error.
async fn or_undo<T, E>(
    step: impl Future<Output = Result<T, E>>,
    undo: impl Future<Output = ()>,
) -> Result<T, E> {
    match step.await {
        Ok(value) => Ok(value),
        Err(error) => {
            undo.await;
            Err(error)
        }
    }
}

async fn stop_scans(adapters: &[AdapterHandle]) {
    for handle in adapters {
        if let Err(error) = handle.adapter.stop_scan().await {
            debug!(adapter = %handle.name, ?error, "failed to stop adapter scan cleanly");
        }
    }
}

/// Drops a half-established link.
async fn release(peripheral: &Peripheral) {
    if let Err(error) = peripheral.disconnect().await {
        warn!(?error, "failed to disconnect after service discovery failed");
    }
}

/// Routes platform notifications to registered sinks until `token` fires.
async fn forward_notifications(peripheral: Peripheral, sinks: SinkMap, token: CancellationToken) {
    let mut notifications = match peripheral.notifications().await {
        Ok(stream) => stream,
        Err(error) => {
            warn!(?error, "failed to open notification stream");
            return;
        }
    };

    loop {
        tokio::select! {
            () = token.cancelled() => break,
            maybe_notification = notifications.next() => {
                let Some(notification) = maybe_notification else {
                    debug!("notification stream closed");
                    break;
                };
                let uuid = notification.uuid.to_string();
                let sink = lock(&sinks)
                    .iter()
                    .find(|(endpoint, _sink)| endpoint.matches_characteristic(&uuid))
                    .map(|(endpoint, sink)| (*endpoint, Arc::clone(sink)));
                match sink {
                    Some((endpoint, sink)) => {
                        trace!(
                            endpoint = protocol::endpoint_id_for(endpoint)
                                .map_or("unknown", |id| protocol::endpoint_metadata(id).name()),
                            len = notification.value.len(),
                            "forwarding notification"
                        );
                        sink(&notification.value);
                    }
                    None => trace!(%uuid, "dropping notification without subscriber"),
                }
            }
        }
    }
}

#[async_trait]
impl BleAdapter for BtleplugAdapter {
    #[instrument(skip(self), level = "debug")]
    async fn scan_for(&self, timeout: Duration) -> Result<Vec<DiscoveredDevice>, InteractionError> {
        let adapters = self.adapters().await?;
        for (started, handle) in adapters.iter().enumerate() {
            or_undo(
                handle.adapter.start_scan(ScanFilter::default()),
                stop_scans(&adapters[..started]),
            )
            .await?;
        }

        sleep(timeout).await;

        let mut devices = Vec::new();
        let mut discovered = HashMap::new();
        stop_scans(&adapters).await;
        for handle in &adapters {
            for peripheral in handle.adapter.peripherals().await? {
                let Some(properties) = peripheral.properties().await? else {
                    continue;
                };
                let device = DiscoveredDevice::new(
                    handle.name.clone(),
                    peripheral.id().to_string(),
                    properties.local_name,
                    properties.address.to_string(),
                    properties.rssi,
                );
                debug!(
                    adapter = %handle.name,
                    address = device.address(),
                    name = device.identifier().unwrap_or("<unnamed>"),
                    "found peripheral"
                );
                discovered.insert(device.device_id().to_string(), peripheral);
                devices.push(device);
            }
        }

        debug!(device_count = devices.len(), "scan finished");
        *lock(&self.discovered) = discovered;
        Ok(devices)
    }

    #[instrument(skip(self, device), level = "debug", fields(device_id = device.device_id()))]
    async fn connect(&self, device: &DiscoveredDevice) -> Result<(), InteractionError> {
        let peripheral = lock(&self.discovered)
            .get(device.device_id())
            .cloned()
            .ok_or_else(|| InteractionError::UnknownDevice {
                device_id: device.device_id().to_string(),
            })?;

        if !peripheral.is_connected().await? {
            peripheral.connect().await?;
        }
        or_undo(peripheral.discover_services(), release(&peripheral)).await?;

        let characteristics = peripheral.characteristics().into_iter().collect();
        let sinks = SinkMap::default();
        let forwarder = CancellationToken::new();
        tokio::spawn(forward_notifications(
            peripheral.clone(),
            Arc::clone(&sinks),
            forwarder.clone(),
        ));

        let previous = lock(&self.link).replace(ConnectedLink {
            device_id: device.device_id().to_string(),
            peripheral,
            characteristics,
            sinks,
            forwarder,
        });
        if let Some(previous) = previous {
            previous.forwarder.cancel();
        }

        info!("connected to peripheral");
        Ok(())
    }

    #[instrument(skip(self, device), level = "debug", fields(device_id = device.device_id()))]
    async fn disconnect(&self, device: &DiscoveredDevice) -> Result<(), InteractionError> {
        let link = {
            let mut guard = lock(&self.link);
            match guard.as_ref() {
                Some(link) if link.device_id == device.device_id() => guard.take(),
                _ => None,
            }
        };
        let Some(link) = link else {
            return Ok(());
        };

        link.forwarder.cancel();
        if link.peripheral.is_connected().await? {
            link.peripheral.disconnect().await?;
        }
        Ok(())
    }

    #[instrument(
        skip(self, payload),
        level = "trace",
        fields(%endpoint, payload_len = payload.len())
    )]
    async fn write_command(
        &self,
        endpoint: ServiceEndpoint,
        payload: &[u8],
    ) -> Result<(), InteractionError> {
        self.write(endpoint, payload, WriteType::WithoutResponse).await
    }

    #[instrument(
        skip(self, payload),
        level = "trace",
        fields(%endpoint, payload_len = payload.len())
    )]
    async fn write_request(
        &self,
        endpoint: ServiceEndpoint,
        payload: &[u8],
    ) -> Result<(), InteractionError> {
        self.write(endpoint, payload, WriteType::WithResponse).await
    }

    #[instrument(skip(self), level = "trace", fields(%endpoint))]
    async fn read(&self, endpoint: ServiceEndpoint) -> Result<Vec<u8>, InteractionError> {
        let (peripheral, characteristic) = self.characteristic_for(endpoint)?;
        peripheral.read(&characteristic).await.map_err(map_ble_error)
    }

    #[instrument(skip(self, sink), level = "trace", fields(%endpoint))]
    async fn subscribe(
        &self,
        endpoint: ServiceEndpoint,
        sink: NotificationSink,
    ) -> Result<(), InteractionError> {
        let (peripheral, characteristic) = self.characteristic_for(endpoint)?;
        peripheral
            .subscribe(&characteristic)
            .await
            .map_err(map_ble_error)?;
        if let Some(link) = lock(&self.link).as_ref() {
            lock(&link.sinks).insert(endpoint, sink);
        }
        Ok(())
    }

    #[instrument(skip(self), level = "trace", fields(%endpoint))]
    async fn unsubscribe(&self, endpoint: ServiceEndpoint) -> Result<(), InteractionError> {
        let (peripheral, characteristic) = self.characteristic_for(endpoint)?;
        if let Some(link) = lock(&self.link).as_ref() {
            lock(&link.sinks).remove(&endpoint);
        }
        peripheral
            .unsubscribe(&characteristic)
            .await
            .map_err(map_ble_error)
    }
}
