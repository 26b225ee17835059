mod app;
mod cli;
mod error;
mod hw;
mod notification;
mod protocol;
mod telemetry;
mod terminal;
mod utils;
mod wire;

pub use app::{fake_adapter, real_adapter, run, run_with_clients};
pub use cli::{
    Args, CipherSettings, CliCommand, FakeArgs, ListenArgs, LogLevel, OutputFormat, RunOptions,
};
pub use error::{ErrorKind, FixtureError, InteractionError, ProtocolError};
pub use hw::{
    BleAdapter, ConnectionConfig, ConnectionManager, ConnectionState, DEFAULT_ATTEMPTS,
    DEFAULT_SCAN_TIMEOUT, DeviceSession, DisconnectOutcome, DiscoveredDevice, FakeAdapter,
    FakeAdapterConfig, FakeAdapterProbe, HexPayload, NotificationPayloads, NotificationSink,
    RecordedWrite, ScanFixture, WriteMode,
};
pub use notification::{DispatchReport, Listener, NotificationRouter};
pub use protocol::{CONTROL_SERVICE_UUID, DEFAULT_DEVICE_NAME, EndpointId, ServiceEndpoint};
pub use terminal::TerminalClient;
pub use wire::{
    Aes128Ecb, AesKey, BlockCipher, Brightness, CipherError, Command, CommandError,
    DEFAULT_BLOCK_SIZE, Delivery, DisplayMode, FRAME_HEADER, Frame, FrameCipher, FrameCipherError,
    FrameCodec, FrameCodecError, ImageIndex, Opcode, Playlist, Rgb, Route, TextColorMode,
    TextSpeed, UploadLength, align,
};
