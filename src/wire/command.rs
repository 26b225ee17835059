use thiserror::Error;

use crate::protocol::EndpointId;

const MAX_BRIGHTNESS: u8 = 100;
const MAX_IMAGE_INDEX: u8 = 21;
const MAX_DISPLAY_MODE: u8 = 5;
const MAX_TEXT_COLOR_MODE: u8 = 7;
const MAX_PLAYLIST_LEN: usize = 255;
const RGB_CHANNELS: usize = 3;

/// Errors returned when command arguments fail validation.
#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum CommandError {
    /// A numeric argument was outside its accepted range.
    #[error("{field} {value} is out of range ({min}..={max})")]
    OutOfRange {
        field: &'static str,
        value: u32,
        min: u32,
        max: u32,
    },
    /// The declared play-list length does not match the number of indices.
    #[error("play list declares {declared} images but lists {actual} indices")]
    ImageCountMismatch { declared: usize, actual: usize },
    /// A colour was given with the wrong number of channels.
    #[error("colour needs exactly 3 channels, got {actual}")]
    ChannelCount { actual: usize },
}

fn check_range(field: &'static str, value: u32, min: u32, max: u32) -> Result<(), CommandError> {
    if (min..=max).contains(&value) {
        return Ok(());
    }

    Err(CommandError::OutOfRange {
        field,
        value,
        min,
        max,
    })
}

/// Validated brightness in the inclusive range `0..=100`.
#[derive(Debug, Clone, Copy, Eq, PartialEq, derive_more::Display)]
#[display("{_0}")]
pub struct Brightness(u8);

impl Brightness {
    /// Creates a validated brightness value.
    ///
    /// # Errors
    ///
    /// Returns an error when `value` is above 100.
    ///
    /// ```
    /// use shining_glasses::Brightness;
    ///
    /// let value = Brightness::new(42)?;
    /// assert_eq!(42, value.value());
    /// assert!(Brightness::new(101).is_err());
    /// # Ok::<(), shining_glasses::CommandError>(())
    /// ```
    pub fn new(value: u8) -> Result<Self, CommandError> {
        check_range("brightness", value.into(), 0, MAX_BRIGHTNESS.into())?;
        Ok(Self(value))
    }

    /// Returns the underlying brightness byte.
    #[must_use]
    pub fn value(self) -> u8 {
        self.0
    }
}

/// Validated built-in image or animation slot in `0..=21`.
#[derive(Debug, Clone, Copy, Eq, PartialEq, derive_more::Display)]
#[display("{_0}")]
pub struct ImageIndex(u8);

impl ImageIndex {
    /// Creates a validated image slot.
    ///
    /// # Errors
    ///
    /// Returns an error when `value` is above 21.
    pub fn new(value: u8) -> Result<Self, CommandError> {
        check_range("image index", value.into(), 0, MAX_IMAGE_INDEX.into())?;
        Ok(Self(value))
    }

    /// Returns the slot byte.
    #[must_use]
    pub fn value(self) -> u8 {
        self.0
    }
}

/// Ordered list of image slots to cycle through.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Playlist {
    indices: Vec<u8>,
}

impl Playlist {
    /// Validates a play list of `count` images.
    ///
    /// `count` must lie in `1..=255`, `indices` must hold exactly `count`
    /// entries and every entry must fit in one byte.
    ///
    /// # Errors
    ///
    /// Returns an error when any of the rules above is violated.
    ///
    /// ```
    /// use shining_glasses::{CommandError, Playlist};
    ///
    /// let playlist = Playlist::new(2, &[3, 4])?;
    /// assert_eq!(2, playlist.count());
    ///
    /// let mismatch = Playlist::new(2, &[3]);
    /// assert_eq!(
    ///     Err(CommandError::ImageCountMismatch { declared: 2, actual: 1 }),
    ///     mismatch
    /// );
    /// # Ok::<(), CommandError>(())
    /// ```
    pub fn new(count: usize, indices: &[u16]) -> Result<Self, CommandError> {
        check_range(
            "image count",
            u32::try_from(count).unwrap_or(u32::MAX),
            1,
            MAX_PLAYLIST_LEN as u32,
        )?;
        if indices.len() != count {
            return Err(CommandError::ImageCountMismatch {
                declared: count,
                actual: indices.len(),
            });
        }

        let indices = indices
            .iter()
            .map(|index| {
                u8::try_from(*index).map_err(|_| CommandError::OutOfRange {
                    field: "play index",
                    value: u32::from(*index),
                    min: 0,
                    max: u8::MAX.into(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { indices })
    }

    /// Number of images in the list.
    #[must_use]
    pub fn count(&self) -> u8 {
        debug_assert!(self.indices.len() <= usize::from(u8::MAX));
        u8::try_from(self.indices.len()).unwrap_or(u8::MAX)
    }

    /// Image slots in play order.
    #[must_use]
    pub fn indices(&self) -> &[u8] {
        &self.indices
    }
}

/// Display mode in `0..=5`.
///
/// The text presentation modes have named constants; other values in range
/// are accepted as raw firmware modes.
#[derive(Debug, Clone, Copy, Eq, PartialEq, derive_more::Display)]
#[display("{_0}")]
pub struct DisplayMode(u8);

impl DisplayMode {
    /// Static text.
    pub const TEXT_STATIC: Self = Self(1);
    /// Blinking text.
    pub const TEXT_BLINK: Self = Self(2);
    /// Text scrolling right to left.
    pub const TEXT_SCROLL_RTL: Self = Self(3);
    /// Text scrolling left to right.
    pub const TEXT_SCROLL_LTR: Self = Self(4);

    /// Returns the raw mode byte.
    #[must_use]
    pub const fn as_raw(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for DisplayMode {
    type Error = CommandError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        check_range("display mode", value.into(), 0, MAX_DISPLAY_MODE.into())?;
        Ok(Self(value))
    }
}

/// Text colour/background mode in `0..=7`.
#[derive(Debug, Clone, Copy, Eq, PartialEq, derive_more::Display)]
#[display("{_0}")]
pub struct TextColorMode(u8);

impl TextColorMode {
    /// Returns the raw mode byte.
    #[must_use]
    pub const fn as_raw(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for TextColorMode {
    type Error = CommandError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        check_range("text colour mode", value.into(), 0, MAX_TEXT_COLOR_MODE.into())?;
        Ok(Self(value))
    }
}

/// Text scroll/blink speed. Every byte value is accepted.
#[derive(Debug, Clone, Copy, Eq, PartialEq, derive_more::Display, derive_more::From)]
#[display("{_0}")]
pub struct TextSpeed(u8);

impl TextSpeed {
    /// Returns the speed byte.
    #[must_use]
    pub fn value(self) -> u8 {
        self.0
    }
}

impl TryFrom<u32> for TextSpeed {
    type Error = CommandError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        let speed = u8::try_from(value).map_err(|_| CommandError::OutOfRange {
            field: "text speed",
            value,
            min: 0,
            max: u8::MAX.into(),
        })?;
        Ok(Self(speed))
    }
}

/// RGB colour sent as three raw bytes in R, G, B order.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct Rgb {
    /// Red channel.
    pub r: u8,
    /// Green channel.
    pub g: u8,
    /// Blue channel.
    pub b: u8,
}

impl Rgb {
    /// Creates an RGB colour.
    ///
    /// ```
    /// use shining_glasses::Rgb;
    ///
    /// let colour = Rgb::new(255, 127, 0);
    /// assert_eq!([255, 127, 0], colour.channels());
    /// ```
    #[must_use]
    pub fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Channels in wire order.
    #[must_use]
    pub fn channels(self) -> [u8; 3] {
        [self.r, self.g, self.b]
    }
}

impl TryFrom<&[u16]> for Rgb {
    type Error = CommandError;

    fn try_from(channels: &[u16]) -> Result<Self, Self::Error> {
        if channels.len() != RGB_CHANNELS {
            return Err(CommandError::ChannelCount {
                actual: channels.len(),
            });
        }

        let mut bytes = [0u8; RGB_CHANNELS];
        for (slot, channel) in bytes.iter_mut().zip(channels) {
            *slot = u8::try_from(*channel).map_err(|_| CommandError::OutOfRange {
                field: "colour channel",
                value: u32::from(*channel),
                min: 0,
                max: u8::MAX.into(),
            })?;
        }

        let [r, g, b] = bytes;
        Ok(Self { r, g, b })
    }
}

/// Announced byte length of an upcoming upload, `0..=65535`.
#[derive(Debug, Clone, Copy, Eq, PartialEq, derive_more::Display)]
#[display("{_0}")]
pub struct UploadLength(u16);

impl UploadLength {
    /// Creates a validated upload length.
    ///
    /// # Errors
    ///
    /// Returns an error when `value` does not fit in 16 bits.
    ///
    /// ```
    /// use shining_glasses::UploadLength;
    ///
    /// assert!(UploadLength::new(65_535).is_ok());
    /// assert!(UploadLength::new(65_536).is_err());
    /// ```
    pub fn new(value: u32) -> Result<Self, CommandError> {
        check_range("upload length", value, 0, u16::MAX.into())?;
        let length = u16::try_from(value).unwrap_or(u16::MAX);
        Ok(Self(length))
    }

    /// Returns the length.
    #[must_use]
    pub fn value(self) -> u16 {
        self.0
    }
}

/// One device operation with validated arguments.
#[derive(Debug, Clone, Eq, PartialEq, strum_macros::IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum Command {
    /// Cycle through the listed image slots.
    Play(Playlist),
    /// Set LED brightness.
    SetLight(Brightness),
    /// Show one built-in image.
    SetImage(ImageIndex),
    /// Show one built-in animation.
    SetAnimation(ImageIndex),
    /// Switch the display mode.
    SetMode(DisplayMode),
    /// Set text scroll/blink speed.
    SetTextSpeed(TextSpeed),
    /// Set text colour/background mode.
    SetTextColorMode(TextColorMode),
    /// Set text foreground colour.
    SetTextForegroundColor(Rgb),
    /// Set text background colour.
    SetTextBackgroundColor(Rgb),
    /// Announce an upload of the given length.
    RequestUpload(UploadLength),
    /// Ask the device for a status check.
    Check,
    /// Subscribe to status notifications.
    SubscribeNotifications,
}

/// How a command reaches the device.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Delivery {
    /// Write without response.
    Write,
    /// Write with response.
    Request,
    /// Platform notification subscription; nothing is written.
    Notify,
}

/// Static endpoint and delivery mode of one command.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct Route {
    /// Target characteristic.
    pub endpoint: EndpointId,
    /// Delivery mode.
    pub delivery: Delivery,
}

impl Command {
    /// Snake-case command name used in logs.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.into()
    }

    /// Returns the endpoint and delivery mode for this command.
    ///
    /// ```
    /// use shining_glasses::{Command, Delivery, EndpointId};
    ///
    /// let route = Command::Check.route();
    /// assert_eq!(EndpointId::StatusCharacteristic, route.endpoint);
    /// assert_eq!(Delivery::Request, route.delivery);
    /// ```
    #[must_use]
    pub fn route(&self) -> Route {
        match self {
            Self::Check => Route {
                endpoint: EndpointId::StatusCharacteristic,
                delivery: Delivery::Request,
            },
            Self::SubscribeNotifications => Route {
                endpoint: EndpointId::StatusCharacteristic,
                delivery: Delivery::Notify,
            },
            Self::Play(_)
            | Self::SetLight(_)
            | Self::SetImage(_)
            | Self::SetAnimation(_)
            | Self::SetMode(_)
            | Self::SetTextSpeed(_)
            | Self::SetTextColorMode(_)
            | Self::SetTextForegroundColor(_)
            | Self::SetTextBackgroundColor(_)
            | Self::RequestUpload(_) => Route {
                endpoint: EndpointId::CommandCharacteristic,
                delivery: Delivery::Write,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(0)]
    #[case(100)]
    fn brightness_accepts_bounds(#[case] value: u8) {
        let brightness = Brightness::new(value).expect("bound should be valid");
        assert_eq!(value, brightness.value());
    }

    #[test]
    fn brightness_rejects_above_max() {
        assert_matches!(
            Brightness::new(101),
            Err(CommandError::OutOfRange {
                field: "brightness",
                value: 101,
                min: 0,
                max: 100,
            })
        );
    }

    #[rstest]
    #[case(0, true)]
    #[case(21, true)]
    #[case(22, false)]
    fn image_index_bounds(#[case] value: u8, #[case] valid: bool) {
        assert_eq!(valid, ImageIndex::new(value).is_ok());
    }

    #[rstest]
    #[case(0, true)]
    #[case(5, true)]
    #[case(6, false)]
    fn display_mode_bounds(#[case] value: u8, #[case] valid: bool) {
        assert_eq!(valid, DisplayMode::try_from(value).is_ok());
    }

    #[test]
    fn named_display_modes_match_raw_values() {
        assert_eq!(Ok(DisplayMode::TEXT_STATIC), DisplayMode::try_from(1));
        assert_eq!(4, DisplayMode::TEXT_SCROLL_LTR.as_raw());
    }

    #[rstest]
    #[case(0, true)]
    #[case(7, true)]
    #[case(8, false)]
    fn text_color_mode_bounds(#[case] value: u8, #[case] valid: bool) {
        assert_eq!(valid, TextColorMode::try_from(value).is_ok());
    }

    #[rstest]
    #[case(0, true)]
    #[case(255, true)]
    #[case(256, false)]
    fn text_speed_bounds(#[case] value: u32, #[case] valid: bool) {
        assert_eq!(valid, TextSpeed::try_from(value).is_ok());
    }

    #[rstest]
    #[case(0, true)]
    #[case(65_535, true)]
    #[case(65_536, false)]
    fn upload_length_bounds(#[case] value: u32, #[case] valid: bool) {
        assert_eq!(valid, UploadLength::new(value).is_ok());
    }

    #[test]
    fn playlist_accepts_full_length_list() {
        let indices: Vec<u16> = (0..255).collect();
        let playlist = Playlist::new(255, &indices).expect("255 images should be valid");
        assert_eq!(255, playlist.count());
    }

    #[rstest]
    #[case(0, vec![])]
    #[case(256, (0..256).collect())]
    fn playlist_rejects_count_out_of_range(#[case] count: usize, #[case] indices: Vec<u16>) {
        assert_matches!(
            Playlist::new(count, &indices),
            Err(CommandError::OutOfRange {
                field: "image count",
                ..
            })
        );
    }

    #[test]
    fn playlist_rejects_length_mismatch() {
        assert_eq!(
            Err(CommandError::ImageCountMismatch {
                declared: 2,
                actual: 1,
            }),
            Playlist::new(2, &[3])
        );
    }

    #[test]
    fn playlist_rejects_wide_index() {
        assert_matches!(
            Playlist::new(1, &[256]),
            Err(CommandError::OutOfRange {
                field: "play index",
                value: 256,
                ..
            })
        );
    }

    #[rstest]
    #[case(&[1, 2], CommandError::ChannelCount { actual: 2 })]
    #[case(&[1, 2, 3, 4], CommandError::ChannelCount { actual: 4 })]
    #[case(
        &[1, 256, 3],
        CommandError::OutOfRange { field: "colour channel", value: 256, min: 0, max: 255 }
    )]
    fn rgb_rejects_invalid_channels(#[case] channels: &[u16], #[case] expected: CommandError) {
        assert_eq!(Err(expected), Rgb::try_from(channels));
    }

    #[test]
    fn rgb_keeps_channel_order() {
        let colour = Rgb::try_from([255u16, 0, 7].as_slice()).expect("channels should be valid");
        assert_eq!([255, 0, 7], colour.channels());
    }

    #[test]
    fn only_check_and_subscribe_use_status_characteristic() {
        let brightness = Brightness::new(10).expect("valid");
        assert_eq!(
            EndpointId::CommandCharacteristic,
            Command::SetLight(brightness).route().endpoint
        );
        assert_eq!(
            Delivery::Notify,
            Command::SubscribeNotifications.route().delivery
        );
        assert_eq!("set_light", Command::SetLight(brightness).name());
    }
}
