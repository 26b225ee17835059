use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter};

/// BLE local name advertised by the reference pair of glasses.
pub const DEFAULT_DEVICE_NAME: &str = "GLASSES-02FB6E";

/// Primary GATT service exposing every glasses command.
pub const CONTROL_SERVICE_UUID: &str = "0000fff0-0000-1000-8000-00805f9b34fb";

const COMMAND_CHARACTERISTIC_UUID: &str = "d44bc439-abfd-45a2-b575-925416129600";
const STATUS_CHARACTERISTIC_UUID: &str = "d44bc439-abfd-45a2-b575-925416129601";

/// A (service, characteristic) pair addressing one GATT attribute.
///
/// Used both as the target of writes and as the routing key for notifications.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, derive_more::Display)]
#[display("{service}/{characteristic}")]
pub struct ServiceEndpoint {
    service: &'static str,
    characteristic: &'static str,
}

impl ServiceEndpoint {
    /// Creates an endpoint from service and characteristic UUID strings.
    ///
    /// ```
    /// use shining_glasses::ServiceEndpoint;
    ///
    /// let endpoint = ServiceEndpoint::new(
    ///     "0000fff0-0000-1000-8000-00805f9b34fb",
    ///     "d44bc439-abfd-45a2-b575-925416129600",
    /// );
    /// assert!(endpoint.matches_characteristic("D44BC439-ABFD-45A2-B575-925416129600"));
    /// ```
    #[must_use]
    pub const fn new(service: &'static str, characteristic: &'static str) -> Self {
        Self {
            service,
            characteristic,
        }
    }

    /// Service UUID.
    #[must_use]
    pub fn service(self) -> &'static str {
        self.service
    }

    /// Characteristic UUID.
    #[must_use]
    pub fn characteristic(self) -> &'static str {
        self.characteristic
    }

    /// Returns `true` when `uuid` names this endpoint's characteristic.
    #[must_use]
    pub fn matches_characteristic(self, uuid: &str) -> bool {
        self.characteristic.eq_ignore_ascii_case(uuid)
    }

    /// Returns `true` when `uuid` names this endpoint's service.
    #[must_use]
    pub fn matches_service(self, uuid: &str) -> bool {
        self.service.eq_ignore_ascii_case(uuid)
    }
}

/// Known glasses characteristics.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, EnumIter, Display)]
pub enum EndpointId {
    /// Characteristic receiving display and lighting commands.
    #[strum(to_string = "command_characteristic")]
    CommandCharacteristic,
    /// Characteristic used for status checks and notifications.
    #[strum(to_string = "status_characteristic")]
    StatusCharacteristic,
}

impl EndpointId {
    /// Returns the addressable endpoint for this characteristic.
    #[must_use]
    pub fn endpoint(self) -> ServiceEndpoint {
        ServiceEndpoint::new(CONTROL_SERVICE_UUID, endpoint_metadata(self).uuid())
    }
}

/// Descriptive metadata for one protocol endpoint.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub(crate) struct EndpointMetadata {
    name: &'static str,
    uuid: &'static str,
}

impl EndpointMetadata {
    /// Human-readable endpoint name.
    pub(crate) fn name(self) -> &'static str {
        self.name
    }

    /// Characteristic UUID.
    pub(crate) fn uuid(self) -> &'static str {
        self.uuid
    }
}

/// Returns metadata for one endpoint.
pub(crate) fn endpoint_metadata(endpoint: EndpointId) -> EndpointMetadata {
    match endpoint {
        EndpointId::CommandCharacteristic => EndpointMetadata {
            name: "glasses command",
            uuid: COMMAND_CHARACTERISTIC_UUID,
        },
        EndpointId::StatusCharacteristic => EndpointMetadata {
            name: "glasses status/notify",
            uuid: STATUS_CHARACTERISTIC_UUID,
        },
    }
}

/// Maps a service endpoint back to the known characteristic, if any.
pub(crate) fn endpoint_id_for(endpoint: ServiceEndpoint) -> Option<EndpointId> {
    EndpointId::iter().find(|candidate| candidate.endpoint() == endpoint)
}
