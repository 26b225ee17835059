use std::io;

use anyhow::{Result, bail};
use serde::Serialize;
use tracing::instrument;

use super::ui::Painter;
use super::{CliCommand, OutputFormat, write_json_line};
use crate::hw::DeviceSession;
use crate::wire::Rgb;

/// JSON result emitted by a control command.
#[derive(Debug, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum ControlResult {
    Light {
        brightness: u8,
    },
    Image {
        index: u8,
    },
    Animation {
        index: u8,
    },
    Play {
        count: usize,
        indices: Vec<u16>,
    },
    Mode {
        mode: u8,
    },
    TextSpeed {
        speed: u32,
    },
    TextColourMode {
        mode: u8,
    },
    TextForeground {
        red: u8,
        green: u8,
        blue: u8,
    },
    TextBackground {
        red: u8,
        green: u8,
        blue: u8,
    },
    UploadRequest {
        length: u32,
    },
    Check,
}

impl ControlResult {
    fn describe(&self, painter: Painter) -> String {
        match self {
            Self::Light { brightness } => {
                format!("Applied brightness: {}", painter.value(brightness.to_string()))
            }
            Self::Image { index } => format!("Showing image {}", painter.value(index.to_string())),
            Self::Animation { index } => {
                format!("Showing animation {}", painter.value(index.to_string()))
            }
            Self::Play { count, indices } => {
                let listed = indices
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("Playing {count} image(s): {}", painter.value(listed))
            }
            Self::Mode { mode } => {
                format!("Applied display mode {}", painter.value(mode.to_string()))
            }
            Self::TextSpeed { speed } => {
                format!("Applied text speed {}", painter.value(speed.to_string()))
            }
            Self::TextColourMode { mode } => {
                format!("Applied text colour mode {}", painter.value(mode.to_string()))
            }
            Self::TextForeground { red, green, blue } => {
                format!("Applied text colour {}", painter.colour(*red, *green, *blue))
            }
            Self::TextBackground { red, green, blue } => {
                format!(
                    "Applied text background {}",
                    painter.colour(*red, *green, *blue)
                )
            }
            Self::UploadRequest { length } => {
                format!("Announced upload of {} byte(s)", painter.value(length.to_string()))
            }
            Self::Check => "Requested status check".to_string(),
        }
    }
}

fn colour_from(channels: [u16; 3]) -> Result<Rgb> {
    Ok(Rgb::try_from(channels.as_slice())?)
}

/// Executes one control command on a connected session.
#[instrument(
    skip(session, out, painter),
    level = "info",
    fields(command = command.name(), ?output_format)
)]
pub(crate) async fn run<W>(
    session: &DeviceSession,
    command: &CliCommand,
    out: &mut W,
    painter: Painter,
    output_format: OutputFormat,
) -> Result<()>
where
    W: io::Write,
{
    let result = match command {
        CliCommand::Light { brightness } => {
            session.set_light(*brightness).await?;
            ControlResult::Light {
                brightness: *brightness,
            }
        }
        CliCommand::Image { index } => {
            session.set_image(*index).await?;
            ControlResult::Image { index: *index }
        }
        CliCommand::Animation { index } => {
            session.set_animation(*index).await?;
            ControlResult::Animation { index: *index }
        }
        CliCommand::Play { indices, count } => {
            let count = count.unwrap_or(indices.len());
            session.play(count, indices).await?;
            ControlResult::Play {
                count,
                indices: indices.clone(),
            }
        }
        CliCommand::Mode { mode } => {
            session.set_mode(*mode).await?;
            ControlResult::Mode {
                mode: mode.as_raw(),
            }
        }
        CliCommand::TextSpeed { speed } => {
            session.set_text_speed(*speed).await?;
            ControlResult::TextSpeed { speed: *speed }
        }
        CliCommand::TextColourMode { mode } => {
            session.set_text_color_mode(*mode).await?;
            ControlResult::TextColourMode {
                mode: mode.as_raw(),
            }
        }
        CliCommand::TextFg { red, green, blue } => {
            let channels = [*red, *green, *blue];
            session.set_text_foreground_color(&channels).await?;
            let [red, green, blue] = colour_from(channels)?.channels();
            ControlResult::TextForeground { red, green, blue }
        }
        CliCommand::TextBg { red, green, blue } => {
            let channels = [*red, *green, *blue];
            session.set_text_background_color(&channels).await?;
            let [red, green, blue] = colour_from(channels)?.channels();
            ControlResult::TextBackground { red, green, blue }
        }
        CliCommand::UploadRequest { length } => {
            session.request_upload(*length).await?;
            ControlResult::UploadRequest { length: *length }
        }
        CliCommand::Check => {
            session.check().await?;
            ControlResult::Check
        }
        CliCommand::Listen(_args) => bail!("`listen` is not a control command"),
    };

    match output_format {
        OutputFormat::Pretty => {
            writeln!(out, "{} {}", painter.success("✓"), result.describe(painter))?;
        }
        OutputFormat::Json => write_json_line(out, &result)?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(ControlResult::Light { brightness: 100 }, "Applied brightness: 100")]
    #[case(
        ControlResult::Play { count: 2, indices: vec![1, 5] },
        "Playing 2 image(s): 1, 5"
    )]
    #[case(
        ControlResult::TextBackground { red: 0xFF, green: 0, blue: 0x80 },
        "Applied text background #FF0080"
    )]
    #[case(ControlResult::Check, "Requested status check")]
    fn plain_descriptions(#[case] result: ControlResult, #[case] expected: &str) {
        assert_eq!(expected, result.describe(Painter::new(false)));
    }

    #[test]
    fn json_result_is_tagged_by_action() {
        let mut out = Vec::new();
        write_json_line(&mut out, &ControlResult::UploadRequest { length: 1024 }).unwrap();
        assert_eq!(
            "{\"action\":\"upload_request\",\"length\":1024}\n",
            String::from_utf8(out).unwrap()
        );
    }
}
