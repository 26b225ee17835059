/// Renders bytes as uppercase hex pairs separated by spaces.
pub(crate) fn format_hex(bytes: &[u8]) -> String {
    if bytes.is_empty() {
        return "<empty>".to_string();
    }

    bytes
        .iter()
        .map(|byte| format!("{byte:02X}"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Renders an optional RSSI reading in dBm.
pub(crate) fn format_rssi(rssi: Option<i16>) -> String {
    rssi.map_or_else(|| "unknown RSSI".to_string(), |value| format!("{value} dBm"))
}
