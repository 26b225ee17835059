use thiserror::Error;
use tracing::instrument;

use super::command::Command;

/// Leading byte of every command frame understood by the glasses firmware.
pub const FRAME_HEADER: u8 = 0x06;

/// Errors returned by frame encoding.
#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum FrameCodecError {
    /// The command is delivered without writing a frame.
    #[error("command `{command}` has no wire frame")]
    NoWireFrame { command: &'static str },
}

/// ASCII opcode tag identifying a command on the wire.
#[derive(Debug, Clone, Copy, Eq, PartialEq, derive_more::Display)]
#[display("{_0}")]
pub struct Opcode(&'static str);

impl Opcode {
    /// Image playlist.
    pub const PLAY: Self = Self("PLAY");
    /// LED brightness.
    pub const LIGHT: Self = Self("LIGHT");
    /// Built-in image.
    pub const IMAGE: Self = Self("IMAG");
    /// Built-in animation.
    pub const ANIMATION: Self = Self("ANIM");
    /// Display mode.
    pub const MODE: Self = Self("MODE");
    /// Text speed.
    pub const TEXT_SPEED: Self = Self("SPEED");
    /// Text colour mode.
    pub const TEXT_COLOR_MODE: Self = Self("M");
    /// Text foreground colour.
    pub const TEXT_FOREGROUND: Self = Self("FC");
    /// Text background colour.
    pub const TEXT_BACKGROUND: Self = Self("BG");
    /// Upload announcement.
    pub const UPLOAD_REQUEST: Self = Self("DATS");
    /// Status check.
    pub const CHECK: Self = Self("CHEC");

    /// Tag text.
    #[must_use]
    pub fn tag(self) -> &'static str {
        self.0
    }
}

/// Unencrypted, tagged encoding of one command.
#[derive(Debug, Clone, Eq, PartialEq, derive_more::Into)]
pub struct Frame(Vec<u8>);

impl Frame {
    fn new(opcode: Opcode, payload: &[u8]) -> Self {
        let tag = opcode.tag().as_bytes();
        let mut bytes = Vec::with_capacity(1 + tag.len() + payload.len());
        bytes.push(FRAME_HEADER);
        bytes.extend_from_slice(tag);
        bytes.extend_from_slice(payload);
        Self(bytes)
    }

    /// Frame bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Frame length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` for an empty frame. Encoded frames never are.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Stateless mapping from commands to frames.
pub struct FrameCodec;

impl FrameCodec {
    /// Encodes `command` as `[0x06][tag][payload]`.
    ///
    /// ```
    /// use shining_glasses::{Brightness, Command, FrameCodec};
    ///
    /// let frame = FrameCodec::encode(&Command::SetLight(Brightness::new(100)?))?;
    /// assert_eq!(b"\x06LIGHT\x64", frame.as_bytes());
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    ///
    /// # Errors
    ///
    /// Returns an error for commands that have no wire frame.
    #[instrument(skip(command), level = "trace", fields(command = command.name()))]
    pub fn encode(command: &Command) -> Result<Frame, FrameCodecError> {
        let (opcode, payload) =
            Self::parts(command).ok_or_else(|| FrameCodecError::NoWireFrame {
                command: command.name(),
            })?;
        Ok(Frame::new(opcode, &payload))
    }

    fn parts(command: &Command) -> Option<(Opcode, Vec<u8>)> {
        let parts = match command {
            Command::Play(playlist) => {
                let mut payload = Vec::with_capacity(1 + playlist.indices().len());
                payload.push(playlist.count());
                payload.extend_from_slice(playlist.indices());
                (Opcode::PLAY, payload)
            }
            Command::SetLight(brightness) => (Opcode::LIGHT, vec![brightness.value()]),
            Command::SetImage(index) => (Opcode::IMAGE, vec![index.value()]),
            Command::SetAnimation(index) => (Opcode::ANIMATION, vec![index.value()]),
            Command::SetMode(mode) => (Opcode::MODE, vec![mode.as_raw()]),
            Command::SetTextSpeed(speed) => (Opcode::TEXT_SPEED, vec![speed.value()]),
            Command::SetTextColorMode(mode) => (Opcode::TEXT_COLOR_MODE, vec![mode.as_raw()]),
            Command::SetTextForegroundColor(colour) => {
                (Opcode::TEXT_FOREGROUND, colour.channels().to_vec())
            }
            Command::SetTextBackgroundColor(colour) => {
                (Opcode::TEXT_BACKGROUND, colour.channels().to_vec())
            }
            Command::RequestUpload(length) => {
                (Opcode::UPLOAD_REQUEST, length.value().to_be_bytes().to_vec())
            }
            Command::Check => (Opcode::CHECK, Vec::new()),
            Command::SubscribeNotifications => return None,
        };
        Some(parts)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;
    use crate::wire::command::{
        Brightness, DisplayMode, ImageIndex, Playlist, Rgb, TextColorMode, TextSpeed, UploadLength,
    };

    fn encode(command: Command) -> Vec<u8> {
        FrameCodec::encode(&command)
            .expect("command should encode cleanly")
            .into()
    }

    #[rstest]
    #[case::light(
        Command::SetLight(Brightness::new(100).unwrap()),
        b"\x06LIGHT\x64".to_vec()
    )]
    #[case::image(Command::SetImage(ImageIndex::new(21).unwrap()), b"\x06IMAG\x15".to_vec())]
    #[case::animation(Command::SetAnimation(ImageIndex::new(0).unwrap()), b"\x06ANIM\x00".to_vec())]
    #[case::mode(Command::SetMode(DisplayMode::TEXT_SCROLL_RTL), b"\x06MODE\x03".to_vec())]
    #[case::speed(Command::SetTextSpeed(TextSpeed::from(255)), b"\x06SPEED\xff".to_vec())]
    #[case::colour_mode(
        Command::SetTextColorMode(TextColorMode::try_from(7).unwrap()),
        b"\x06M\x07".to_vec()
    )]
    #[case::foreground(
        Command::SetTextForegroundColor(Rgb::new(0x11, 0x22, 0x33)),
        b"\x06FC\x11\x22\x33".to_vec()
    )]
    #[case::background(
        Command::SetTextBackgroundColor(Rgb::new(0xff, 0x00, 0x80)),
        b"\x06BG\xff\x00\x80".to_vec()
    )]
    #[case::upload(
        Command::RequestUpload(UploadLength::new(0x1234).unwrap()),
        b"\x06DATS\x12\x34".to_vec()
    )]
    #[case::check(Command::Check, b"\x06CHEC".to_vec())]
    fn encode_matches_wire_layout(#[case] command: Command, #[case] expected: Vec<u8>) {
        assert_eq!(expected, encode(command));
    }

    #[test]
    fn play_frame_carries_count_then_indices() {
        let playlist = Playlist::new(3, &[0, 7, 255]).expect("playlist should be valid");
        assert_eq!(
            b"\x06PLAY\x03\x00\x07\xff".to_vec(),
            encode(Command::Play(playlist))
        );
    }

    #[test]
    fn upload_length_is_big_endian() {
        let frame = encode(Command::RequestUpload(UploadLength::new(65_535).unwrap()));
        assert_eq!(&[0xff, 0xff], &frame[frame.len() - 2..]);
    }

    #[test]
    fn encoding_is_deterministic() {
        let command = Command::Play(Playlist::new(2, &[4, 5]).unwrap());
        assert_eq!(
            FrameCodec::encode(&command).unwrap(),
            FrameCodec::encode(&command).unwrap()
        );
    }

    #[test]
    fn subscribe_has_no_frame() {
        assert_matches!(
            FrameCodec::encode(&Command::SubscribeNotifications),
            Err(FrameCodecError::NoWireFrame {
                command: "subscribe_notifications"
            })
        );
    }

    #[test]
    fn every_frame_fits_one_aes_block() {
        let longest = Command::SetTextForegroundColor(Rgb::new(1, 2, 3));
        assert!(encode(longest).len() <= 16);
        assert!(encode(Command::SetTextSpeed(TextSpeed::from(1))).len() <= 16);
    }
}
