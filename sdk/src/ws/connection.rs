//! Connection lifecycle.
//!
//! One background task owns the socket and the whole decode, sequence and
//! apply pipeline. It moves through
//! `Disconnected -> Connecting -> Authenticating -> Synced` and back to
//! `Disconnected` on any failure, reconnecting with backoff until shut down.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::config::WsConfig;
use super::dispatcher::{Dispatcher, FollowUp};
use super::error::WsError;
use super::messages::{ClientCommand, ServerMessage};
use super::metrics::FeedMetrics;
use super::subscription::{SubscriptionHandle, SubscriptionKey};
use crate::client::auth::Credentials;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// Lifecycle state of the feed connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// No socket; waiting to (re)connect.
    #[default]
    Disconnected,
    /// Preparing the signed handshake.
    Connecting,
    /// Handshake in flight.
    Authenticating,
    /// Socket up and every subscription re-issued.
    Synced,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Authenticating => write!(f, "authenticating"),
            Self::Synced => write!(f, "synced"),
        }
    }
}

/// Requests from feed handles to the connection task.
#[derive(Debug)]
pub(crate) enum FeedCommand {
    Subscribe {
        key: SubscriptionKey,
        reply: oneshot::Sender<SubscriptionHandle>,
    },
    Unsubscribe {
        key: SubscriptionKey,
        generation: u64,
    },
}

enum SessionEnd {
    Shutdown,
    Lost(WsError),
}

/// The connection task.
pub(crate) struct StreamConnection {
    config: WsConfig,
    credentials: Option<Credentials>,
    dispatcher: Dispatcher,
    commands: mpsc::Receiver<FeedCommand>,
    state: watch::Sender<ConnectionState>,
    metrics: Arc<FeedMetrics>,
    cancel: CancellationToken,
    next_id: u64,
}

impl StreamConnection {
    pub(crate) fn new(
        config: WsConfig,
        credentials: Option<Credentials>,
        dispatcher: Dispatcher,
        commands: mpsc::Receiver<FeedCommand>,
        state: watch::Sender<ConnectionState>,
        metrics: Arc<FeedMetrics>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            credentials,
            dispatcher,
            commands,
            state,
            metrics,
            cancel,
            next_id: 0,
        }
    }

    /// Runs until shutdown or until reconnect attempts are exhausted.
    pub(crate) async fn run(mut self) {
        let policy = self.config.reconnect;
        let mut failures: u32 = 0;
        let mut connected_before = false;

        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            match self.connect().await {
                Ok(stream) => {
                    if connected_before {
                        self.metrics.record_reconnect();
                    }
                    connected_before = true;
                    failures = 0;

                    let end = self.session(stream).await;
                    self.dispatcher.reset_connection().await;
                    self.set_state(ConnectionState::Disconnected);
                    match end {
                        SessionEnd::Shutdown => break,
                        SessionEnd::Lost(err) => warn!(error = %err, "connection lost"),
                    }
                }
                Err(err) => {
                    self.set_state(ConnectionState::Disconnected);
                    failures = failures.saturating_add(1);
                    match err {
                        WsError::Authentication(_) => error!(attempt = failures, error = %err, "handshake rejected"),
                        _ => warn!(attempt = failures, error = %err, "connect failed"),
                    }
                    if !policy.allows_retry(failures) {
                        error!(attempts = failures, "giving up on reconnecting");
                        break;
                    }
                }
            }

            let delay = policy.delay_for(failures.max(1), None);
            info!(
                attempt = failures.saturating_add(1),
                delay_ms = delay.as_millis() as u64,
                "reconnecting"
            );
            if !self.wait(delay).await {
                break;
            }
        }

        self.cancel.cancel();
        self.dispatcher.clear().await;
        self.set_state(ConnectionState::Disconnected);
        info!("feed stopped");
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!(from = %previous, to = %state, "connection state");
        }
    }

    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    /// Sleeps for the backoff delay while still serving subscribe and
    /// unsubscribe requests. Returns false on shutdown.
    async fn wait(&mut self, delay: Duration) -> bool {
        let cancel = self.cancel.clone();
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return false,
                _ = &mut sleep => return true,
                cmd = self.commands.recv() => match cmd {
                    Some(cmd) => {
                        let _ = self.handle_command(cmd, None).await;
                    }
                    None => return false,
                },
            }
        }
    }

    async fn connect(&mut self) -> Result<WsStream, WsError> {
        self.set_state(ConnectionState::Connecting);

        let mut request = self.config.url.as_str().into_client_request()?;
        if let Some(credentials) = &self.credentials {
            let path = request.uri().path().to_string();
            let headers = credentials.headers("GET", &path);
            for (name, value) in headers.pairs() {
                let name = HeaderName::from_bytes(name.as_bytes())
                    .map_err(|e| WsError::InvalidConfig(e.to_string()))?;
                let value =
                    HeaderValue::from_str(value).map_err(|e| WsError::InvalidConfig(e.to_string()))?;
                request.headers_mut().insert(name, value);
            }
        }

        self.set_state(ConnectionState::Authenticating);
        info!(url = %self.config.url, "connecting");

        let (stream, _) = tokio::time::timeout(
            self.config.connect_timeout,
            tokio_tungstenite::connect_async(request),
        )
        .await
        .map_err(|_| WsError::Connection("connect timed out".to_string()))??;

        Ok(stream)
    }

    async fn session(&mut self, stream: WsStream) -> SessionEnd {
        let (mut sink, mut source): (WsSink, WsSource) = stream.split();
        let cancel = self.cancel.clone();

        for key in self.dispatcher.registry().keys() {
            if let Err(err) = self.send_subscribe(&mut sink, &key).await {
                return SessionEnd::Lost(err);
            }
        }
        self.set_state(ConnectionState::Synced);
        info!(
            subscriptions = self.dispatcher.registry().len(),
            "feed connected"
        );

        let interval = self.config.heartbeat_interval;
        let mut heartbeat = tokio::time::interval_at(Instant::now() + interval, interval);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_seen = Instant::now();

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    let _ = sink.send(Message::Close(None)).await;
                    return SessionEnd::Shutdown;
                }
                cmd = self.commands.recv() => {
                    let Some(cmd) = cmd else {
                        let _ = sink.send(Message::Close(None)).await;
                        return SessionEnd::Shutdown;
                    };
                    if let Err(err) = self.handle_command(cmd, Some(&mut sink)).await {
                        return SessionEnd::Lost(err);
                    }
                }
                _ = heartbeat.tick() => {
                    if last_seen.elapsed() >= self.config.heartbeat_timeout {
                        return SessionEnd::Lost(WsError::ConnectionLost(
                            "heartbeat timeout".to_string(),
                        ));
                    }
                    if let Err(err) = sink.send(Message::Ping(Default::default())).await {
                        return SessionEnd::Lost(err.into());
                    }
                }
                frame = source.next() => {
                    let frame = match frame {
                        Some(Ok(frame)) => frame,
                        Some(Err(err)) => return SessionEnd::Lost(err.into()),
                        None => {
                            return SessionEnd::Lost(WsError::ConnectionLost(
                                "stream ended".to_string(),
                            ))
                        }
                    };
                    last_seen = Instant::now();
                    self.metrics.record_message();
                    if let Err(err) = self.on_frame(frame, &mut sink).await {
                        return SessionEnd::Lost(err);
                    }
                }
            }
        }
    }

    async fn on_frame(&mut self, frame: Message, sink: &mut WsSink) -> Result<(), WsError> {
        match frame {
            Message::Text(text) => match ServerMessage::decode(text.as_str()) {
                Ok(message) => {
                    if let Some(follow_up) = self.dispatcher.dispatch(message).await {
                        self.follow_up(follow_up, sink).await?;
                    }
                }
                Err(err) => debug!(error = %err, "dropping undecodable frame"),
            },
            Message::Pong(_) => {
                self.dispatcher.dispatch(ServerMessage::HeartbeatAck).await;
            }
            Message::Close(frame) => {
                return Err(WsError::ConnectionLost(format!(
                    "closed by server: {:?}",
                    frame
                )));
            }
            // Pings are answered by the protocol layer.
            Message::Ping(_) => {}
            Message::Binary(_) | Message::Frame(_) => debug!("ignoring non-text frame"),
        }
        Ok(())
    }

    async fn follow_up(&mut self, follow_up: FollowUp, sink: &mut WsSink) -> Result<(), WsError> {
        match follow_up {
            FollowUp::Resnapshot(key) => {
                self.metrics.record_resync();
                if let Some(sid) = self.dispatcher.registry_mut().detach(&key) {
                    let id = self.next_id();
                    send(sink, &ClientCommand::unsubscribe(id, vec![sid])).await?;
                }
                self.send_subscribe(sink, &key).await
            }
            FollowUp::Unsubscribe(sid) => {
                let id = self.next_id();
                send(sink, &ClientCommand::unsubscribe(id, vec![sid])).await
            }
        }
    }

    async fn send_subscribe(&mut self, sink: &mut WsSink, key: &SubscriptionKey) -> Result<(), WsError> {
        let id = self.next_id();
        self.dispatcher.registry_mut().mark_pending(key, id);
        send(sink, &ClientCommand::subscribe(id, key.channel, key.ticker.clone())).await?;
        debug!(id, channel = %key.channel, ticker = %key.ticker, "subscribe sent");
        Ok(())
    }

    async fn handle_command(&mut self, cmd: FeedCommand, sink: Option<&mut WsSink>) -> Result<(), WsError> {
        match cmd {
            FeedCommand::Subscribe { key, reply } => {
                let (handle, created) = self.dispatcher.registry_mut().get_or_insert(key.clone());
                let _ = reply.send(handle);
                if created {
                    info!(channel = %key.channel, ticker = %key.ticker, "subscription added");
                    if let Some(sink) = sink {
                        self.send_subscribe(sink, &key).await?;
                    }
                }
            }
            FeedCommand::Unsubscribe { key, generation } => {
                let Some(sid) = self.dispatcher.registry_mut().remove(&key, generation) else {
                    debug!(
                        channel = %key.channel,
                        ticker = %key.ticker,
                        generation,
                        "unsubscribe for inactive handle"
                    );
                    return Ok(());
                };
                if key.channel.is_book() {
                    self.dispatcher.remove_book(&key.ticker).await;
                }
                info!(channel = %key.channel, ticker = %key.ticker, "subscription removed");
                if let (Some(sid), Some(sink)) = (sid, sink) {
                    let id = self.next_id();
                    send(sink, &ClientCommand::unsubscribe(id, vec![sid])).await?;
                }
            }
        }
        Ok(())
    }
}

async fn send(sink: &mut WsSink, command: &ClientCommand) -> Result<(), WsError> {
    let json = command.to_json()?;
    sink.send(Message::Text(json.into()))
        .await
        .map_err(|e| WsError::ConnectionLost(format!("send failed: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_state_display() {
        assert_eq!(ConnectionState::default(), ConnectionState::Disconnected);
        assert_eq!(ConnectionState::Synced.to_string(), "synced");
        assert_eq!(ConnectionState::Authenticating.to_string(), "authenticating");
    }
}
