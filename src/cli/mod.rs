pub(crate) mod command;
pub(crate) mod control;
pub(crate) mod listen;
pub(crate) mod ui;

use std::io;

use serde::Serialize;

pub use self::command::{
    Args, CipherSettings, CliCommand, FakeArgs, LogLevel, OutputFormat, RunOptions,
};
pub use self::listen::ListenArgs;

/// Writes `value` as one compact JSON line.
pub(crate) fn write_json_line(
    out: &mut impl io::Write,
    value: &impl Serialize,
) -> anyhow::Result<()> {
    serde_json::to_writer(&mut *out, value)?;
    writeln!(out)?;
    Ok(())
}
