use std::fmt;
use std::io;
use std::time::Duration;

use anyhow::{Result, anyhow};
use clap::Args;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, instrument};

use super::ui::Painter;
use super::{OutputFormat, write_json_line};
use crate::error::InteractionError;
use crate::hw::DeviceSession;
use crate::notification::Listener;
use crate::protocol::EndpointId;
use crate::utils::format_hex;

/// Arguments for the `listen` command.
#[derive(Debug, Clone, Args)]
pub struct ListenArgs {
    /// Stop after this many notifications. If omitted, listen until Ctrl+C.
    #[arg(long)]
    max_notifications: Option<usize>,
    /// Stop after this long (e.g. `30s`).
    #[arg(long, value_parser = parse_duration)]
    duration: Option<Duration>,
    /// Send a status check once subscribed.
    #[arg(long)]
    check: bool,
    /// Read the status characteristic once before subscribing.
    #[arg(long)]
    read: bool,
}

impl ListenArgs {
    /// Creates listen arguments with an optional notification limit.
    ///
    /// ```
    /// let args = shining_glasses::ListenArgs::new(Some(2)).with_check(true);
    /// assert_eq!(Some(2), args.max_notifications());
    /// ```
    #[must_use]
    pub fn new(max_notifications: Option<usize>) -> Self {
        Self {
            max_notifications,
            duration: None,
            check: false,
            read: false,
        }
    }

    /// Notification limit, if any.
    #[must_use]
    pub fn max_notifications(&self) -> Option<usize> {
        self.max_notifications
    }

    /// Sends a status check once subscribed.
    #[must_use]
    pub fn with_check(mut self, check: bool) -> Self {
        self.check = check;
        self
    }

    /// Stops listening after `duration`.
    #[must_use]
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    /// Reads the status characteristic before subscribing.
    #[must_use]
    pub fn with_read(mut self, read: bool) -> Self {
        self.read = read;
        self
    }
}

/// Why a listen run ended.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
enum ListenStopReason {
    ReachedLimit,
    TimedOut,
    Interrupted,
    ListenerClosed,
}

impl fmt::Display for ListenStopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::ReachedLimit => "reached notification limit",
            Self::TimedOut => "listen duration elapsed",
            Self::Interrupted => "interrupted",
            Self::ListenerClosed => "listener closed",
        };
        f.write_str(text)
    }
}

#[derive(Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum ListenEvent {
    Status {
        #[serde(serialize_with = "serialize_hex")]
        payload: Vec<u8>,
    },
    Ready {
        characteristic: &'static str,
    },
    Notification {
        index: usize,
        #[serde(serialize_with = "serialize_hex")]
        payload: Vec<u8>,
    },
    Summary {
        received: usize,
        stop_reason: ListenStopReason,
    },
}

/// Executes the `listen` command on a connected session.
#[instrument(skip(session, args, out, painter), level = "info", fields(?output_format))]
pub(crate) async fn run<W>(
    session: &DeviceSession,
    args: &ListenArgs,
    out: &mut W,
    painter: Painter,
    output_format: OutputFormat,
) -> Result<()>
where
    W: io::Write,
{
    let (sender, mut receiver) = mpsc::unbounded_channel::<Vec<u8>>();
    let listener = Listener::new(move |payload| {
        sender
            .send(payload.to_vec())
            .map_err(|_closed| anyhow!("listen output is closed"))
    });
    session.add_listener(listener.clone());

    let mut view = ListenView {
        out,
        painter,
        output_format,
    };
    let result = listen(session, args, &mut receiver, &mut view).await;
    session.remove_listener(&listener);
    result
}

async fn listen<W>(
    session: &DeviceSession,
    args: &ListenArgs,
    receiver: &mut mpsc::UnboundedReceiver<Vec<u8>>,
    view: &mut ListenView<'_, W>,
) -> Result<()>
where
    W: io::Write,
{
    if args.read {
        let payload = session.read_status().await?;
        view.render(&ListenEvent::Status { payload })?;
    }

    session.subscribe_to_notifications().await?;
    view.render(&ListenEvent::Ready {
        characteristic: EndpointId::StatusCharacteristic.endpoint().characteristic(),
    })?;
    if args.check {
        session.check().await?;
    }

    let deadline = args.duration.map(|duration| Instant::now() + duration);
    let mut received = 0usize;
    let stop_reason = loop {
        if let Some(limit) = args.max_notifications
            && received >= limit
        {
            break ListenStopReason::ReachedLimit;
        }

        tokio::select! {
            biased;
            maybe_payload = receiver.recv() => {
                let Some(payload) = maybe_payload else {
                    break ListenStopReason::ListenerClosed;
                };
                received += 1;
                view.render(&ListenEvent::Notification {
                    index: received,
                    payload,
                })?;
            }
            signal = tokio::signal::ctrl_c() => {
                signal.map_err(|source| InteractionError::CtrlC { source })?;
                break ListenStopReason::Interrupted;
            }
            () = wait_until(deadline) => break ListenStopReason::TimedOut,
        }
    };

    debug!(received, ?stop_reason, "listen finished");
    view.render(&ListenEvent::Summary {
        received,
        stop_reason,
    })
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

struct ListenView<'a, W> {
    out: &'a mut W,
    painter: Painter,
    output_format: OutputFormat,
}

impl<W: io::Write> ListenView<'_, W> {
    fn render(&mut self, event: &ListenEvent) -> Result<()> {
        if self.output_format == OutputFormat::Json {
            return write_json_line(self.out, event);
        }

        let painter = self.painter;
        match event {
            ListenEvent::Status { payload } => {
                writeln!(self.out, "Status: {}", painter.value(format_hex(payload)))?;
            }
            ListenEvent::Ready { characteristic } => {
                writeln!(
                    self.out,
                    "Listening for notifications on {}",
                    painter.value(characteristic)
                )?;
            }
            ListenEvent::Notification { index, payload } => {
                writeln!(
                    self.out,
                    "{} {}",
                    painter.muted(format!("#{index}")),
                    format_hex(payload)
                )?;
            }
            ListenEvent::Summary {
                received,
                stop_reason,
            } => {
                writeln!(
                    self.out,
                    "{} {received} notification(s), {stop_reason}",
                    painter.success("Received")
                )?;
            }
        }
        Ok(())
    }
}

fn serialize_hex<S, T>(payload: T, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
    T: AsRef<[u8]>,
{
    serializer.serialize_str(&hex::encode(payload))
}

fn parse_duration(value: &str) -> Result<Duration, String> {
    humantime::parse_duration(value).map_err(|error| error.to_string())
}
