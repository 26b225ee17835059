mod adapter;
mod btleplug_backend;
mod connection;
mod fake_backend;
mod model;
mod session;

pub use self::adapter::{BleAdapter, NotificationSink};
pub(crate) use self::btleplug_backend::BtleplugAdapter;
pub use self::connection::{
    ConnectionConfig, ConnectionManager, DEFAULT_ATTEMPTS, DEFAULT_SCAN_TIMEOUT,
};
pub use self::fake_backend::{
    FakeAdapter, FakeAdapterConfig, FakeAdapterProbe, HexPayload, NotificationPayloads,
    RecordedWrite, ScanFixture, WriteMode,
};
pub use self::model::{ConnectionState, DisconnectOutcome, DiscoveredDevice};
pub use self::session::DeviceSession;
