use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

use super::connection::ConnectionManager;
use super::model::{ConnectionState, DisconnectOutcome, DiscoveredDevice};
use crate::error::ProtocolError;
use crate::notification::{Listener, NotificationRouter};
use crate::protocol::{self, EndpointId, ServiceEndpoint};
use crate::utils::format_hex;
use crate::wire::{
    Brightness, Command, Delivery, DisplayMode, FrameCipher, FrameCodec, ImageIndex, Playlist,
    Rgb, TextColorMode, TextSpeed, UploadLength,
};

/// High-level command surface of one pair of glasses.
///
/// Every command checks the link first, then validates its arguments, so a
/// disconnected session reports `NotConnected` even for bad arguments.
/// Frames are encoded, encrypted and written under one lock, which keeps the
/// cipher stream in send order.
pub struct DeviceSession {
    connection: ConnectionManager,
    cipher: Mutex<FrameCipher>,
    show_commands: bool,
}

impl DeviceSession {
    /// Creates a session sending through `connection` and `cipher`.
    #[must_use]
    pub fn new(connection: ConnectionManager, cipher: FrameCipher) -> Self {
        Self {
            connection,
            cipher: Mutex::new(cipher),
            show_commands: false,
        }
    }

    /// Logs every plaintext frame before it is encrypted.
    #[must_use]
    pub fn with_show_commands(mut self, show_commands: bool) -> Self {
        self.show_commands = show_commands;
        self
    }

    /// Underlying connection manager.
    #[must_use]
    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    /// Notification router shared with the adapter.
    #[must_use]
    pub fn router(&self) -> &NotificationRouter {
        self.connection.router()
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// Connects to the device advertising exactly `device_name`.
    ///
    /// # Errors
    ///
    /// See [`ConnectionManager::connect`].
    pub async fn connect(
        &self,
        device_name: &str,
        max_attempts: u32,
    ) -> Result<DiscoveredDevice, ProtocolError> {
        Ok(self.connection.connect(device_name, max_attempts).await?)
    }

    /// Tears down the link, if any.
    ///
    /// # Errors
    ///
    /// See [`ConnectionManager::disconnect`].
    pub async fn disconnect(&self) -> Result<DisconnectOutcome, ProtocolError> {
        Ok(self.connection.disconnect().await?)
    }

    /// Registers a listener for status notifications.
    pub fn add_listener(&self, listener: Listener) -> bool {
        self.router().subscribe(status_endpoint(), listener)
    }

    /// Removes a status notification listener.
    pub fn remove_listener(&self, listener: &Listener) -> bool {
        self.router().unsubscribe(status_endpoint(), listener)
    }

    /// Cycles through `count` image slots listed in `indices`.
    ///
    /// # Errors
    ///
    /// Fails with an invalid-argument error when `count` is outside
    /// `1..=255`, disagrees with `indices.len()`, or an index exceeds 255.
    pub async fn play(&self, count: usize, indices: &[u16]) -> Result<(), ProtocolError> {
        self.connection.ensure_connected()?;
        let playlist = Playlist::new(count, indices)?;
        self.send(&Command::Play(playlist)).await
    }

    /// Sets the LED brightness, `0..=100`.
    ///
    /// ```no_run
    /// # use shining_glasses::{DeviceSession, ProtocolError};
    /// # async fn demo(session: &DeviceSession) -> Result<(), ProtocolError> {
    /// session.set_light(100).await?;
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// # Errors
    ///
    /// Fails when disconnected, out of range, or the write fails.
    pub async fn set_light(&self, brightness: u8) -> Result<(), ProtocolError> {
        self.connection.ensure_connected()?;
        let brightness = Brightness::new(brightness)?;
        self.send(&Command::SetLight(brightness)).await
    }

    /// Shows built-in image `index`, `0..=21`.
    ///
    /// # Errors
    ///
    /// Fails when disconnected, out of range, or the write fails.
    pub async fn set_image(&self, index: u8) -> Result<(), ProtocolError> {
        self.connection.ensure_connected()?;
        let index = ImageIndex::new(index)?;
        self.send(&Command::SetImage(index)).await
    }

    /// Shows built-in animation `index`, `0..=21`.
    ///
    /// # Errors
    ///
    /// Fails when disconnected, out of range, or the write fails.
    pub async fn set_animation(&self, index: u8) -> Result<(), ProtocolError> {
        self.connection.ensure_connected()?;
        let index = ImageIndex::new(index)?;
        self.send(&Command::SetAnimation(index)).await
    }

    /// Switches the display mode.
    ///
    /// # Errors
    ///
    /// Fails when disconnected or the write fails.
    pub async fn set_mode(&self, mode: DisplayMode) -> Result<(), ProtocolError> {
        self.connection.ensure_connected()?;
        self.send(&Command::SetMode(mode)).await
    }

    /// Sets the text speed, `0..=255`.
    ///
    /// # Errors
    ///
    /// Fails when disconnected, out of range, or the write fails.
    pub async fn set_text_speed(&self, speed: u32) -> Result<(), ProtocolError> {
        self.connection.ensure_connected()?;
        let speed = TextSpeed::try_from(speed)?;
        self.send(&Command::SetTextSpeed(speed)).await
    }

    /// Sets the text colour mode.
    ///
    /// # Errors
    ///
    /// Fails when disconnected or the write fails.
    pub async fn set_text_color_mode(&self, mode: TextColorMode) -> Result<(), ProtocolError> {
        self.connection.ensure_connected()?;
        self.send(&Command::SetTextColorMode(mode)).await
    }

    /// Sets the text colour from exactly three channels.
    ///
    /// # Errors
    ///
    /// Fails when disconnected, the channel list is malformed, or the write
    /// fails.
    pub async fn set_text_foreground_color(&self, channels: &[u16]) -> Result<(), ProtocolError> {
        self.connection.ensure_connected()?;
        let colour = Rgb::try_from(channels)?;
        self.send(&Command::SetTextForegroundColor(colour)).await
    }

    /// Sets the text background colour from exactly three channels.
    ///
    /// # Errors
    ///
    /// Fails when disconnected, the channel list is malformed, or the write
    /// fails.
    pub async fn set_text_background_color(&self, channels: &[u16]) -> Result<(), ProtocolError> {
        self.connection.ensure_connected()?;
        let colour = Rgb::try_from(channels)?;
        self.send(&Command::SetTextBackgroundColor(colour)).await
    }

    /// Announces an upload of `length` bytes, `0..=65535`.
    ///
    /// # Errors
    ///
    /// Fails when disconnected, out of range, or the write fails.
    pub async fn request_upload(&self, length: u32) -> Result<(), ProtocolError> {
        self.connection.ensure_connected()?;
        let length = UploadLength::new(length)?;
        self.send(&Command::RequestUpload(length)).await
    }

    /// Asks the device for a status check. Replies arrive as notifications.
    ///
    /// # Errors
    ///
    /// Fails when disconnected or the write fails.
    pub async fn check(&self) -> Result<(), ProtocolError> {
        self.send(&Command::Check).await
    }

    /// Enables status notifications.
    ///
    /// # Errors
    ///
    /// Fails when disconnected or the subscription fails.
    pub async fn subscribe_to_notifications(&self) -> Result<(), ProtocolError> {
        self.send(&Command::SubscribeNotifications).await
    }

    /// Reads the raw value of the status characteristic.
    ///
    /// # Errors
    ///
    /// Fails when disconnected or the read fails.
    pub async fn read_status(&self) -> Result<Vec<u8>, ProtocolError> {
        Ok(self.connection.read(status_endpoint()).await?)
    }

    /// Routes one validated command to the device.
    ///
    /// # Errors
    ///
    /// Fails when disconnected, encoding or encryption fails, or the adapter
    /// rejects the write.
    #[instrument(skip(self, command), level = "debug", fields(command = command.name()))]
    pub async fn send(&self, command: &Command) -> Result<(), ProtocolError> {
        self.connection.ensure_connected()?;
        let route = command.route();
        let endpoint = route.endpoint.endpoint();

        if route.delivery == Delivery::Notify {
            self.connection.notify(endpoint).await?;
            info!("subscribed to status notifications");
            return Ok(());
        }

        let frame = FrameCodec::encode(command)?;
        if self.show_commands {
            info!(
                endpoint = protocol::endpoint_metadata(route.endpoint).name(),
                frame = %format_hex(frame.as_bytes()),
                "sending command"
            );
        }

        let mut cipher = self.cipher.lock().await;
        let encrypted = cipher.encrypt(frame.as_bytes())?;
        debug!(encrypted_len = encrypted.len(), "frame encrypted");
        match route.delivery {
            Delivery::Write => self.connection.write(endpoint, &encrypted).await?,
            Delivery::Request | Delivery::Notify => {
                self.connection.request(endpoint, &encrypted).await?;
            }
        }
        Ok(())
    }
}

fn status_endpoint() -> ServiceEndpoint {
    EndpointId::StatusCharacteristic.endpoint()
}
