use std::time::Duration;

use bon::Builder;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::level_filters::LevelFilter;

use crate::cli::listen::ListenArgs;
use crate::error::{CliConfigError, FixtureError};
use crate::hw::{
    ConnectionConfig, DEFAULT_ATTEMPTS, FakeAdapterConfig, HexPayload, NotificationPayloads,
    ScanFixture,
};
use crate::protocol::DEFAULT_DEVICE_NAME;
use crate::wire::{
    Aes128Ecb, AesKey, DEFAULT_BLOCK_SIZE, DisplayMode, FrameCipher, FrameCipherError,
    TextColorMode,
};

/// Command-line options for the glasses BLE tool.
#[derive(Debug, Parser)]
#[command(name = "glasses", about = "Drive Shining LED glasses over BLE.")]
pub struct Args {
    /// Exact advertised name of the glasses.
    #[arg(long, global = true, default_value = DEFAULT_DEVICE_NAME)]
    device_name: String,
    /// Scan attempts before giving up.
    #[arg(long, global = true, default_value_t = DEFAULT_ATTEMPTS)]
    attempts: u32,
    /// Length of each scan window (e.g. `5s`, `1500ms`).
    #[arg(long, global = true, default_value = "5s", value_parser = parse_duration)]
    scan_timeout: Duration,
    /// Pause between scan attempts.
    #[arg(long, global = true, value_parser = parse_duration)]
    retry_delay: Option<Duration>,
    /// AES-128 key as 32 hex digits.
    #[arg(long, global = true, env = "GLASSES_AES_KEY", hide_env_values = true)]
    key: Option<AesKey>,
    /// Sends frames unencrypted.
    #[arg(long, global = true)]
    plaintext: bool,
    /// Frame alignment in bytes.
    #[arg(long, global = true, default_value_t = DEFAULT_BLOCK_SIZE)]
    block_size: usize,
    /// Logs every frame before encryption.
    #[arg(long, global = true)]
    show_commands: bool,
    /// Log level override; `RUST_LOG` applies when omitted.
    #[arg(long, global = true, value_enum)]
    log_level: Option<LogLevel>,
    /// Output format; defaults to `pretty` on a terminal and `json` otherwise.
    #[arg(long, global = true, value_enum)]
    output: Option<OutputFormat>,
    /// Uses the fake BLE backend with fixture-driven discovery and payloads.
    #[arg(long, global = true)]
    fake: bool,
    /// Fake scan fixtures in the form `adapter|address|name|rssi;...`.
    #[arg(long, global = true, requires = "fake", required_if_eq("fake", "true"))]
    fake_scan: Option<ScanFixture>,
    /// Fake notification payloads as comma-separated hexadecimal payloads.
    #[arg(long, global = true, requires = "fake")]
    fake_notifications: Option<NotificationPayloads>,
    /// Fake status characteristic value as hexadecimal bytes.
    #[arg(long, global = true, requires = "fake")]
    fake_status: Option<HexPayload>,
    /// Number of leading fake scans that find nothing.
    #[arg(long, global = true, requires = "fake", default_value_t = 0)]
    fake_miss_scans: usize,
    #[command(subcommand)]
    command: CliCommand,
}

impl Args {
    /// Splits parsed arguments into the command, run options and optional
    /// fake-adapter settings.
    ///
    /// ```
    /// use clap::Parser;
    ///
    /// let args = shining_glasses::Args::try_parse_from([
    ///     "glasses",
    ///     "--plaintext",
    ///     "--fake",
    ///     "--fake-scan",
    ///     "hci0|AA:BB|GLASSES-02FB6E|-43",
    ///     "check",
    /// ])?;
    /// let (_command, options, fake_args) = args.into_parts()?;
    /// assert_eq!("GLASSES-02FB6E", options.device_name());
    /// assert!(fake_args.is_some());
    /// # Ok::<(), anyhow::Error>(())
    /// ```
    ///
    /// # Errors
    ///
    /// Returns an error when no AES key is available without `--plaintext`,
    /// or fake mode lacks a scan fixture.
    pub fn into_parts(self) -> anyhow::Result<(CliCommand, RunOptions, Option<FakeArgs>)> {
        let Args {
            device_name,
            attempts,
            scan_timeout,
            retry_delay,
            key,
            plaintext,
            block_size,
            show_commands,
            log_level,
            output,
            fake,
            fake_scan,
            fake_notifications,
            fake_status,
            fake_miss_scans,
            command,
        } = self;

        let cipher = match (plaintext, key) {
            (true, _) => CipherSettings::Plaintext { block_size },
            (false, Some(key)) => CipherSettings::Aes128 { key, block_size },
            (false, None) => return Err(CliConfigError::MissingCipherKey.into()),
        };

        let fake_args = if fake {
            let Some(scan_fixture) = fake_scan else {
                return Err(CliConfigError::MissingFakeScanFixture.into());
            };
            Some(FakeArgs {
                scan_fixture,
                notifications: fake_notifications,
                status_payload: fake_status,
                missed_scans: fake_miss_scans,
            })
        } else {
            None
        };

        let options = RunOptions {
            device_name,
            attempts,
            connection: ConnectionConfig::builder()
                .scan_timeout(scan_timeout)
                .retry_delay(retry_delay.unwrap_or(Duration::ZERO))
                .build(),
            cipher,
            show_commands,
            log_level,
            output_format: output,
        };

        Ok((command, options, fake_args))
    }
}

/// How outbound frames are protected.
#[derive(Debug, Clone)]
pub enum CipherSettings {
    /// Frames go out as encoded.
    Plaintext { block_size: usize },
    /// Frames are padded to `block_size` and AES-128 encrypted.
    Aes128 { key: AesKey, block_size: usize },
}

impl CipherSettings {
    pub(crate) fn build(&self) -> Result<FrameCipher, FrameCipherError> {
        match self {
            Self::Plaintext { block_size } => Ok(FrameCipher::plaintext(*block_size)),
            Self::Aes128 { key, block_size } => {
                FrameCipher::new(Box::new(Aes128Ecb::new(*key)), *block_size)
            }
        }
    }
}

/// Settings shared by every command run.
#[derive(Debug, Clone, Builder)]
pub struct RunOptions {
    #[builder(into, default = DEFAULT_DEVICE_NAME.to_string())]
    device_name: String,
    #[builder(default = DEFAULT_ATTEMPTS)]
    attempts: u32,
    #[builder(default)]
    connection: ConnectionConfig,
    cipher: CipherSettings,
    #[builder(default)]
    show_commands: bool,
    log_level: Option<LogLevel>,
    output_format: Option<OutputFormat>,
}

impl RunOptions {
    #[must_use]
    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub(crate) fn connection(&self) -> &ConnectionConfig {
        &self.connection
    }

    pub(crate) fn cipher(&self) -> &CipherSettings {
        &self.cipher
    }

    pub(crate) fn show_commands(&self) -> bool {
        self.show_commands
    }

    pub(crate) fn log_level(&self) -> Option<LogLevel> {
        self.log_level
    }

    pub(crate) fn output_format(&self) -> Option<OutputFormat> {
        self.output_format
    }
}

/// Fake adapter arguments for programmatic runs.
#[derive(Debug, Builder)]
pub struct FakeArgs {
    #[builder(with = |value: &str| -> std::result::Result<_, FixtureError> { value.parse() })]
    scan_fixture: ScanFixture,
    #[builder(with = |value: &str| -> std::result::Result<_, FixtureError> { value.parse() })]
    notifications: Option<NotificationPayloads>,
    #[builder(with = |value: &str| -> std::result::Result<_, FixtureError> { value.parse() })]
    status_payload: Option<HexPayload>,
    #[builder(default)]
    missed_scans: usize,
}

impl FakeArgs {
    pub(crate) fn into_adapter_config(self) -> FakeAdapterConfig {
        let Self {
            scan_fixture,
            notifications,
            status_payload,
            missed_scans,
        } = self;

        FakeAdapterConfig::builder()
            .scan_fixture(scan_fixture)
            .maybe_notifications(notifications)
            .maybe_status_payload(status_payload)
            .missed_scans(missed_scans)
            .build()
    }
}

/// Log level override.
#[derive(Debug, Clone, Copy, Eq, PartialEq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub(crate) fn as_level_filter(self) -> LevelFilter {
        match self {
            Self::Error => LevelFilter::ERROR,
            Self::Warn => LevelFilter::WARN,
            Self::Info => LevelFilter::INFO,
            Self::Debug => LevelFilter::DEBUG,
            Self::Trace => LevelFilter::TRACE,
        }
    }
}

/// Output rendering.
#[derive(Debug, Clone, Copy, Eq, PartialEq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable lines.
    Pretty,
    /// One JSON document per result.
    Json,
}

/// Supported CLI commands. Each one connects, acts, then disconnects.
#[derive(Debug, Clone, Subcommand)]
pub enum CliCommand {
    /// Set LED brightness (0..=100).
    Light { brightness: u8 },
    /// Show a built-in image (0..=21).
    Image { index: u8 },
    /// Show a built-in animation (0..=21).
    Animation { index: u8 },
    /// Cycle through image slots.
    Play {
        /// Image slots, in play order.
        #[arg(required = true)]
        indices: Vec<u16>,
        /// Declared slot count; defaults to the number of indices.
        #[arg(long)]
        count: Option<usize>,
    },
    /// Switch the display mode (`static`, `blink`, `scroll-rtl`, `scroll-ltr`, or 0..=5).
    Mode {
        #[arg(value_parser = parse_display_mode)]
        mode: DisplayMode,
    },
    /// Set text speed (0..=255).
    TextSpeed { speed: u32 },
    /// Set text colour mode (0..=7).
    TextColourMode {
        #[arg(value_parser = parse_text_colour_mode)]
        mode: TextColorMode,
    },
    /// Set text foreground colour.
    TextFg { red: u16, green: u16, blue: u16 },
    /// Set text background colour.
    TextBg { red: u16, green: u16, blue: u16 },
    /// Announce an upload of the given byte length (0..=65535).
    UploadRequest { length: u32 },
    /// Ask the glasses for a status check.
    Check,
    /// Subscribe to status notifications and print them.
    Listen(ListenArgs),
}

impl CliCommand {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            Self::Light { .. } => "light",
            Self::Image { .. } => "image",
            Self::Animation { .. } => "animation",
            Self::Play { .. } => "play",
            Self::Mode { .. } => "mode",
            Self::TextSpeed { .. } => "text_speed",
            Self::TextColourMode { .. } => "text_colour_mode",
            Self::TextFg { .. } => "text_fg",
            Self::TextBg { .. } => "text_bg",
            Self::UploadRequest { .. } => "upload_request",
            Self::Check => "check",
            Self::Listen(_args) => "listen",
        }
    }
}

fn parse_duration(value: &str) -> Result<Duration, String> {
    humantime::parse_duration(value).map_err(|error| error.to_string())
}

fn parse_display_mode(value: &str) -> Result<DisplayMode, String> {
    match value {
        "static" => Ok(DisplayMode::TEXT_STATIC),
        "blink" => Ok(DisplayMode::TEXT_BLINK),
        "scroll-rtl" => Ok(DisplayMode::TEXT_SCROLL_RTL),
        "scroll-ltr" => Ok(DisplayMode::TEXT_SCROLL_LTR),
        raw => {
            let raw = raw.parse::<u8>().map_err(|error| error.to_string())?;
            DisplayMode::try_from(raw).map_err(|error| error.to_string())
        }
    }
}

fn parse_text_colour_mode(value: &str) -> Result<TextColorMode, String> {
    let raw = value.parse::<u8>().map_err(|error| error.to_string())?;
    TextColorMode::try_from(raw).map_err(|error| error.to_string())
}
