use std::time::Duration;

use assert_matches::assert_matches;
use pretty_assertions::assert_eq;
use rstest::rstest;

const NAME: &str = "GLASSES-02FB6E";

fn manager(
    scan: &str,
    missed_scans: usize,
    retry_delay: Duration,
) -> anyhow::Result<(shining_glasses::ConnectionManager, shining_glasses::FakeAdapterProbe)> {
    let adapter = shining_glasses::FakeAdapter::new(
        shining_glasses::FakeAdapterConfig::builder()
            .scan_fixture(scan.parse()?)
            .missed_scans(missed_scans)
            .build(),
    );
    let probe = adapter.probe();
    let config = shining_glasses::ConnectionConfig::builder()
        .scan_timeout(Duration::from_millis(100))
        .retry_delay(retry_delay)
        .build();
    Ok((
        shining_glasses::ConnectionManager::new(Box::new(adapter), config),
        probe,
    ))
}

#[tokio::test(start_paused = true)]
async fn connect_retries_until_the_device_advertises() -> anyhow::Result<()> {
    let (manager, probe) = manager(
        "hci0|AA:BB:CC|GLASSES-02FB6E|-43",
        2,
        Duration::from_secs(1),
    )?;
    let started = tokio::time::Instant::now();

    let device = manager.connect(NAME, 3).await?;

    assert_eq!(Some(NAME), device.identifier());
    assert_eq!(3, probe.scan_count());
    assert!(started.elapsed() >= Duration::from_secs(2));
    assert_eq!(shining_glasses::ConnectionState::Connected, manager.state());
    assert!(probe.is_connected());
    Ok(())
}

#[tokio::test]
async fn connect_gives_up_after_the_last_attempt() -> anyhow::Result<()> {
    let (manager, probe) = manager("hci0|AA:BB:CC|GLASSES-02FB6E|-43", 5, Duration::ZERO)?;

    let error = manager.connect(NAME, 2).await.unwrap_err();

    assert_matches!(
        error,
        shining_glasses::InteractionError::DeviceNotFound { ref name, attempts: 2 } if name == NAME
    );
    assert_eq!(2, probe.scan_count());
    assert_eq!(shining_glasses::ConnectionState::Disconnected, manager.state());
    assert_eq!(None, manager.connected_device());
    Ok(())
}

#[rstest]
#[case::prefix_only("hci0|AA:BB:CC|GLASSES-02FB|-43")]
#[case::different_case("hci0|AA:BB:CC|glasses-02fb6e|-43")]
#[case::unnamed("hci0|AA:BB:CC|-|-43")]
#[tokio::test]
async fn only_exact_names_match(#[case] scan: &str) -> anyhow::Result<()> {
    let (manager, _probe) = manager(scan, 0, Duration::ZERO)?;

    let error = manager.connect(NAME, 1).await.unwrap_err();

    assert_matches!(error, shining_glasses::InteractionError::DeviceNotFound { .. });
    Ok(())
}

#[tokio::test]
async fn invalid_requests_are_rejected_before_scanning() -> anyhow::Result<()> {
    let (manager, probe) = manager("hci0|AA:BB:CC|GLASSES-02FB6E|-43", 0, Duration::ZERO)?;

    assert_matches!(
        manager.connect("", 3).await,
        Err(shining_glasses::InteractionError::MissingDeviceName)
    );
    assert_matches!(
        manager.connect(NAME, 0).await,
        Err(shining_glasses::InteractionError::NoConnectionAttempts)
    );
    assert_eq!(0, probe.scan_count());
    Ok(())
}

#[tokio::test]
async fn connecting_twice_reuses_the_link() -> anyhow::Result<()> {
    let (manager, probe) = manager(
        "hci1|00:11:22|Speaker|-65;hci0|AA:BB:CC|GLASSES-02FB6E|-43",
        0,
        Duration::ZERO,
    )?;

    let first = manager.connect(NAME, 1).await?;
    let second = manager.connect(NAME, 1).await?;

    assert_eq!(first, second);
    assert_eq!("hci0", second.adapter_name());
    assert_eq!(1, probe.scan_count());
    Ok(())
}

#[tokio::test]
async fn disconnect_is_idempotent() -> anyhow::Result<()> {
    let (manager, probe) = manager("hci0|AA:BB:CC|GLASSES-02FB6E|-43", 0, Duration::ZERO)?;
    manager.connect(NAME, 1).await?;

    assert_eq!(
        shining_glasses::DisconnectOutcome::Disconnected,
        manager.disconnect().await?
    );
    assert_eq!(
        shining_glasses::DisconnectOutcome::NotConnected,
        manager.disconnect().await?
    );
    assert!(!probe.is_connected());
    assert_matches!(
        manager
            .write(shining_glasses::EndpointId::CommandCharacteristic.endpoint(), &[0x06])
            .await,
        Err(shining_glasses::InteractionError::NotConnected)
    );
    Ok(())
}
