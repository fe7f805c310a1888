//! Event channel client: WebSocket feed of recognition events.
//!
//! [`run`] owns the socket and reconnects forever; everything it observes is
//! forwarded to the shell as a [`ChannelSignal`]. The task exits once the
//! receiving side is dropped.

use futures_util::StreamExt;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

/// Lifecycle of the event feed as seen by the dashboard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    Disconnected { error: Option<String> },
}

impl ConnectionState {
    /// State after observing `signal`. Messages do not change the state.
    pub fn on_signal(&self, signal: &ChannelSignal) -> Self {
        match signal {
            ChannelSignal::Connecting => Self::Connecting,
            ChannelSignal::Opened => Self::Connected,
            ChannelSignal::Closed(reason) => Self::Disconnected {
                error: reason.clone(),
            },
            ChannelSignal::Error(e) => Self::Disconnected {
                error: Some(e.clone()),
            },
            ChannelSignal::Message(_) => self.clone(),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnected { .. } => "disconnected",
        }
    }
}

/// What the channel task reports to the shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelSignal {
    Connecting,
    Opened,
    /// One inbound text message, unparsed.
    Message(String),
    /// The server closed the connection (optional close reason).
    Closed(Option<String>),
    /// Connect or transport failure.
    Error(String),
}

/// Bounded exponential reconnect delay.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        let initial = initial.max(Duration::from_millis(1));
        let max = max.max(initial);
        Self {
            initial,
            max,
            current: initial,
        }
    }

    /// Delay before the next attempt; doubles up to the cap.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

/// Receiver went away; the task should stop.
struct ShellGone;

/// Connect to `url` and forward signals to `tx` until `tx` is closed.
pub async fn run(url: String, mut backoff: Backoff, tx: mpsc::Sender<ChannelSignal>) {
    loop {
        if session(&url, &mut backoff, &tx).await.is_err() {
            tracing::debug!("event channel receiver dropped, stopping");
            return;
        }
        let delay = backoff.next_delay();
        tracing::warn!(url = %url, delay_ms = delay.as_millis() as u64, "event channel reconnecting");
        tokio::time::sleep(delay).await;
    }
}

/// One connect attempt and, if it opens, the read loop until the socket ends.
async fn session(
    url: &str,
    backoff: &mut Backoff,
    tx: &mpsc::Sender<ChannelSignal>,
) -> Result<(), ShellGone> {
    send(tx, ChannelSignal::Connecting).await?;

    let mut ws = match tokio_tungstenite::connect_async(url).await {
        Ok((ws, _response)) => ws,
        Err(e) => {
            tracing::warn!(url, error = %e, "event channel connect failed");
            return send(tx, ChannelSignal::Error(e.to_string())).await;
        }
    };

    tracing::info!(url, "event channel connected");
    backoff.reset();
    send(tx, ChannelSignal::Opened).await?;

    while let Some(frame) = ws.next().await {
        match frame {
            Ok(Message::Text(text)) => send(tx, ChannelSignal::Message(text)).await?,
            Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                Ok(text) => send(tx, ChannelSignal::Message(text)).await?,
                Err(_) => tracing::warn!("dropping non-UTF-8 binary frame"),
            },
            Ok(Message::Close(frame)) => {
                let reason = frame
                    .map(|f| f.reason.to_string())
                    .filter(|r| !r.is_empty());
                tracing::info!(reason = ?reason, "event channel closed by server");
                return send(tx, ChannelSignal::Closed(reason)).await;
            }
            // Ping/pong are answered by the transport.
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(error = %e, "event channel transport error");
                return send(tx, ChannelSignal::Error(e.to_string())).await;
            }
        }
    }

    tracing::info!("event channel stream ended");
    send(tx, ChannelSignal::Closed(None)).await
}

async fn send(tx: &mpsc::Sender<ChannelSignal>, signal: ChannelSignal) -> Result<(), ShellGone> {
    tx.send(signal).await.map_err(|_| ShellGone)
}
