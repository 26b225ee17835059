use std::io;

use anyhow::Result;
use owo_colors::OwoColorize;
use tracing::{Span, instrument, trace};
use tracing_indicatif::span_ext::IndicatifSpanExt;

use crate::cli::ui::Painter;
use crate::cli::{CliCommand, FakeArgs, LogLevel, OutputFormat, RunOptions};
use crate::error::InteractionError;
use crate::hw::{
    BleAdapter, BtleplugAdapter, ConnectionManager, DeviceSession, DiscoveredDevice, FakeAdapter,
};
use crate::telemetry;
use crate::terminal::{SystemTerminalClient, TerminalClient};
use crate::utils::format_rssi;

/// Creates an adapter backed by the platform BLE stack.
///
/// # Errors
///
/// Returns an error when the platform BLE manager cannot be created.
pub async fn real_adapter() -> Result<Box<dyn BleAdapter>, InteractionError> {
    Ok(Box::new(BtleplugAdapter::new().await?))
}

/// Creates an adapter backed by fake fixtures.
///
/// ```
/// let fake = shining_glasses::FakeArgs::builder()
///     .scan_fixture("hci0|AA:BB|GLASSES-02FB6E|-43")?
///     .build();
/// let adapter = shining_glasses::fake_adapter(fake);
/// assert_eq!(0, adapter.probe().scan_count());
/// # Ok::<(), shining_glasses::FixtureError>(())
/// ```
#[must_use]
pub fn fake_adapter(fake_args: FakeArgs) -> FakeAdapter {
    FakeAdapter::new(fake_args.into_adapter_config())
}

/// Runs one CLI command against `adapter`.
///
/// ```
/// # async fn run() -> anyhow::Result<()> {
/// use clap::Parser;
///
/// let args = shining_glasses::Args::try_parse_from([
///     "glasses",
///     "--plaintext",
///     "--fake",
///     "--fake-scan",
///     "hci0|AA:BB|GLASSES-02FB6E|-43",
///     "light",
///     "80",
/// ])?;
/// let (command, options, fake_args) = args.into_parts()?;
/// let adapter: Box<dyn shining_glasses::BleAdapter> = match fake_args {
///     Some(fake_args) => Box::new(shining_glasses::fake_adapter(fake_args)),
///     None => shining_glasses::real_adapter().await?,
/// };
/// let mut out = Vec::new();
/// shining_glasses::run(command, &options, &mut out, adapter).await?;
/// # Ok(())
/// # }
/// ```
///
/// # Errors
///
/// Returns an error if tracing initialisation fails, the device cannot be
/// reached, the command fails, or output writing fails.
pub async fn run<W>(
    command: CliCommand,
    options: &RunOptions,
    out: &mut W,
    adapter: Box<dyn BleAdapter>,
) -> Result<()>
where
    W: io::Write,
{
    run_with_clients(command, options, out, &SystemTerminalClient, adapter).await
}

/// Runs one CLI command with an injected terminal client.
///
/// Connects, executes the command, then disconnects. A disconnect failure
/// is reported only when the command itself succeeded.
///
/// # Errors
///
/// Returns an error if tracing initialisation fails, the device cannot be
/// reached, the command fails, or output writing fails.
#[instrument(
    skip(options, out, terminal_client, adapter),
    level = "info",
    fields(command = command.name(), device_name = options.device_name())
)]
pub async fn run_with_clients<W>(
    command: CliCommand,
    options: &RunOptions,
    out: &mut W,
    terminal_client: &dyn TerminalClient,
    adapter: Box<dyn BleAdapter>,
) -> Result<()>
where
    W: io::Write,
{
    telemetry::initialise_tracing(
        env!("CARGO_PKG_NAME"),
        terminal_client.stderr_is_terminal(),
        options.log_level().map(LogLevel::as_level_filter),
    )?;

    let output_format = options
        .output_format()
        .unwrap_or(if terminal_client.stdout_is_terminal() {
            OutputFormat::Pretty
        } else {
            OutputFormat::Json
        });
    let painter = Painter::new(terminal_client.stdout_is_terminal());

    let cipher = options.cipher().build()?;
    let session = DeviceSession::new(
        ConnectionManager::new(adapter, options.connection().clone()),
        cipher,
    )
    .with_show_commands(options.show_commands());

    let device = connect(&session, options).await?;
    trace!(rssi = %format_rssi(device.rssi()), "link ready");

    let command_result = match &command {
        CliCommand::Listen(args) => {
            crate::cli::listen::run(&session, args, out, painter, output_format).await
        }
        control => crate::cli::control::run(&session, control, out, painter, output_format).await,
    };
    let disconnect_result = session.disconnect().await;

    if let Err(error) = disconnect_result {
        if command_result.is_ok() {
            return Err(error.into());
        }
        trace!(?error, "failed to disconnect cleanly");
    }

    command_result
}

#[instrument(skip_all, level = "info", fields(device_name = options.device_name()))]
async fn connect(session: &DeviceSession, options: &RunOptions) -> Result<DiscoveredDevice> {
    let span = Span::current();
    span.pb_set_message(&format!("Scanning for {}", options.device_name()));

    match session
        .connect(options.device_name(), options.attempts())
        .await
    {
        Ok(device) => {
            span.pb_set_finish_message(&format!(
                "{} Connected to {} ({})",
                "✓".green(),
                options.device_name(),
                format_rssi(device.rssi())
            ));
            Ok(device)
        }
        Err(error) => {
            span.pb_set_finish_message(&format!("{} Connection failed", "✗".red()));
            Err(error.into())
        }
    }
}
