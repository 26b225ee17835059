use clap::Parser;
use clap::error::ErrorKind;
use insta::assert_snapshot;
use pretty_assertions::assert_eq;

const SCAN: &str = "hci1|00:11:22|Speaker|-65;hci0|AA:BB:CC|GLASSES-02FB6E|-43";

#[derive(Debug, Default)]
struct FakeTerminalClient;

impl shining_glasses::TerminalClient for FakeTerminalClient {
    fn stdout_is_terminal(&self) -> bool {
        false
    }

    fn stderr_is_terminal(&self) -> bool {
        false
    }
}

async fn run_with_parsed_args(args: shining_glasses::Args) -> anyhow::Result<String> {
    let mut output = Vec::new();
    let (command, options, fake_args) = args.into_parts()?;
    let adapter: Box<dyn shining_glasses::BleAdapter> = match fake_args {
        Some(fake_args) => Box::new(shining_glasses::fake_adapter(fake_args)),
        None => shining_glasses::real_adapter().await?,
    };
    shining_glasses::run_with_clients(command, &options, &mut output, &FakeTerminalClient, adapter)
        .await?;
    Ok(String::from_utf8(output)?)
}

async fn run_with_argv(argv: &[&str]) -> anyhow::Result<String> {
    let mut full = vec!["glasses", "--plaintext", "--fake", "--fake-scan", SCAN];
    full.extend_from_slice(argv);
    run_with_parsed_args(shining_glasses::Args::try_parse_from(full)?).await
}

#[tokio::test]
async fn light_command_prints_json_result_off_terminal() -> anyhow::Result<()> {
    let stdout = run_with_argv(&["light", "80"]).await?;
    assert_snapshot!(stdout.trim_end(), @r#"{"action":"light","brightness":80}"#);
    Ok(())
}

#[tokio::test]
async fn pretty_output_can_be_forced() -> anyhow::Result<()> {
    let stdout = run_with_argv(&["--output", "pretty", "play", "1", "2", "3"]).await?;
    assert_snapshot!(stdout.trim_end(), @"✓ Playing 3 image(s): 1, 2, 3");
    Ok(())
}

#[tokio::test]
async fn text_colour_is_reported_as_hex() -> anyhow::Result<()> {
    let stdout = run_with_argv(&["--output", "pretty", "text-fg", "255", "0", "128"]).await?;
    assert_snapshot!(stdout.trim_end(), @"✓ Applied text colour #FF0080");
    Ok(())
}

#[tokio::test]
async fn mode_accepts_named_values() -> anyhow::Result<()> {
    let stdout = run_with_argv(&["mode", "scroll-ltr"]).await?;
    assert_snapshot!(stdout.trim_end(), @r#"{"action":"mode","mode":4}"#);
    Ok(())
}

#[tokio::test]
async fn listen_command_reads_once_then_streams_notifications() -> anyhow::Result<()> {
    let stdout = run_with_argv(&[
        "--fake-status",
        "DEADBEEF",
        "--fake-notifications",
        "A1B2,0C",
        "listen",
        "--read",
        "--max-notifications",
        "2",
    ])
    .await?;
    assert_snapshot!(stdout.trim_end(), @r#"
    {"event":"status","payload":"deadbeef"}
    {"event":"ready","characteristic":"d44bc439-abfd-45a2-b575-925416129601"}
    {"event":"notification","index":1,"payload":"a1b2"}
    {"event":"notification","index":2,"payload":"0c"}
    {"event":"summary","received":2,"stop_reason":"reached_limit"}
    "#);
    Ok(())
}

#[tokio::test]
async fn listen_command_renders_pretty_lines() -> anyhow::Result<()> {
    let stdout = run_with_argv(&[
        "--output",
        "pretty",
        "--fake-notifications",
        "A1B2",
        "listen",
        "--max-notifications",
        "1",
    ])
    .await?;
    assert_snapshot!(stdout.trim_end(), @r"
    Listening for notifications on d44bc439-abfd-45a2-b575-925416129601
    #1 A1 B2
    Received 1 notification(s), reached notification limit
    ");
    Ok(())
}

#[tokio::test]
async fn listen_stops_when_duration_elapses() -> anyhow::Result<()> {
    let stdout = run_with_argv(&["listen", "--duration", "20ms"]).await?;
    assert_snapshot!(stdout.trim_end(), @r#"
    {"event":"ready","characteristic":"d44bc439-abfd-45a2-b575-925416129601"}
    {"event":"summary","received":0,"stop_reason":"timed_out"}
    "#);
    Ok(())
}

#[tokio::test]
async fn out_of_range_argument_fails_without_output() -> anyhow::Result<()> {
    let error = run_with_argv(&["upload-request", "65536"]).await.unwrap_err();
    let error = error.downcast_ref::<shining_glasses::ProtocolError>().unwrap();
    assert_eq!(shining_glasses::ErrorKind::InvalidArgument, error.kind());
    Ok(())
}

#[tokio::test]
async fn missing_device_is_reported_after_every_attempt() -> anyhow::Result<()> {
    let error = run_with_argv(&["--attempts", "2", "--fake-miss-scans", "5", "check"])
        .await
        .unwrap_err();
    let error = error.downcast_ref::<shining_glasses::ProtocolError>().unwrap();
    assert_eq!(shining_glasses::ErrorKind::DeviceNotFound, error.kind());
    assert_eq!(
        "no device named `GLASSES-02FB6E` was found after 2 scan attempt(s)",
        error.to_string()
    );
    Ok(())
}

#[test]
fn invalid_fixture_is_rejected() {
    let result = shining_glasses::FakeArgs::builder().scan_fixture("invalid-record");
    assert!(matches!(
        result,
        Err(shining_glasses::FixtureError::InvalidRecordFieldCount)
    ));
}

#[test]
fn play_requires_at_least_one_index() {
    let error = shining_glasses::Args::try_parse_from(["glasses", "--plaintext", "play"])
        .unwrap_err();
    assert_eq!(ErrorKind::MissingRequiredArgument, error.kind());
}
