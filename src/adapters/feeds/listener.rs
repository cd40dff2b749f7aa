//! Feed Listener - Price Stream to Orchestration Cycles
//!
//! Connects to the price feed WebSocket, subscribes once per
//! connection, and for each update:
//!
//! 1. resolves the trading pair (unknown pairs are dropped silently),
//! 2. rejects non-positive or unparseable prices,
//! 3. quantizes the price into a slot and drops repeats of the last slot,
//! 4. starts a cycle unless one is already running for the instrument.
//!
//! The cycle task owns its [`CycleLease`], so guard membership is
//! released on every exit path.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tracing::{debug, error, info, instrument, warn};

use super::keepalive::Keepalive;
use crate::adapters::metrics::MetricsRegistry;
use crate::config::FeedConfig;
use crate::domain::backoff::{Backoff, BackoffPolicy};
use crate::domain::guard::{CycleGuard, CycleLease};
use crate::domain::instrument::{
    InstrumentId, InstrumentRegistry, PriceSlot, PriceUpdate, parse_price, parse_source_time,
};
use crate::domain::slot::SlotQuantizer;
use crate::ports::handler::{CycleHandler, CycleTrigger};

/// Connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    /// Socket open and subscription sent, not yet acknowledged.
    Subscribed,
    /// Subscription acknowledged; updates are flowing.
    Connected,
}

/// Why a session ended.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("websocket error: {0}")]
    Ws(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("invalid feed request: {0}")]
    Request(String),

    #[error("handshake and subscribe did not finish within {0:?}")]
    ConnectTimeout(Duration),

    #[error("no pong within {0:?}")]
    PongTimeout(Duration),

    #[error("stream closed by server")]
    Closed,

    #[error("malformed message: {0}")]
    Malformed(String),
}

/// What happened to one price update.
#[derive(Debug)]
pub enum UpdateOutcome {
    /// A cycle was spawned.
    Started(JoinHandle<()>),
    /// Same slot as the last update for this instrument.
    DuplicateSlot,
    /// New slot recorded, but a cycle is already in flight.
    CycleRunning,
    UnknownPair,
    InvalidPrice,
}

impl UpdateOutcome {
    fn label(&self) -> &'static str {
        match self {
            Self::Started(_) => "started",
            Self::DuplicateSlot => "duplicate_slot",
            Self::CycleRunning => "cycle_running",
            Self::UnknownPair => "unknown_pair",
            Self::InvalidPrice => "invalid_price",
        }
    }
}

/// Listener settings.
#[derive(Debug, Clone)]
pub struct FeedListenerConfig {
    /// Metric and log label, e.g. `keeper` or `safety`.
    pub label: String,
    pub ws_url: String,
    pub api_key: String,
    pub channel: String,
    pub resolution: u32,
    pub slot_decimals: u32,
    pub reconnect: BackoffPolicy,
    pub ping_interval: Duration,
    pub pong_grace: Duration,
    /// Bound on handshake plus subscribe.
    pub connect_timeout: Duration,
}

impl FeedListenerConfig {
    /// Build from the `[feed]` section.
    pub fn from_feed(label: impl Into<String>, feed: &FeedConfig) -> Self {
        Self {
            label: label.into(),
            ws_url: feed.ws_url.clone(),
            api_key: feed.api_key.clone(),
            channel: feed.channel.clone(),
            resolution: feed.resolution,
            slot_decimals: feed.slot_decimals,
            reconnect: feed.reconnect_policy(),
            ping_interval: feed.ping_interval(),
            pong_grace: feed.pong_grace(),
            connect_timeout: feed.connect_timeout(),
        }
    }

    /// Same feed, different slot granularity.
    pub fn with_slot_decimals(mut self, decimals: u32) -> Self {
        self.slot_decimals = decimals;
        self
    }
}

/// One feed connection driving one kind of cycle.
pub struct FeedListener<H: CycleHandler + ?Sized + 'static> {
    config: FeedListenerConfig,
    registry: Arc<InstrumentRegistry>,
    handler: Arc<H>,
    quantizer: SlotQuantizer,
    guard: CycleGuard,
    last_slots: Mutex<HashMap<InstrumentId, PriceSlot>>,
    state: Mutex<ConnectionState>,
    metrics: Arc<MetricsRegistry>,
    /// Shared with the health server.
    connected: Arc<AtomicBool>,
}

impl<H: CycleHandler + ?Sized + 'static> FeedListener<H> {
    pub fn new(
        config: FeedListenerConfig,
        registry: Arc<InstrumentRegistry>,
        handler: Arc<H>,
        metrics: Arc<MetricsRegistry>,
        connected: Arc<AtomicBool>,
    ) -> Self {
        let quantizer = SlotQuantizer::new(config.slot_decimals);
        Self {
            config,
            registry,
            handler,
            quantizer,
            guard: CycleGuard::new(),
            last_slots: Mutex::new(HashMap::new()),
            state: Mutex::new(ConnectionState::Disconnected),
            metrics,
            connected,
        }
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The per-instrument cycle guard.
    pub fn guard(&self) -> &CycleGuard {
        &self.guard
    }

    /// Last slot seen for an instrument.
    pub fn last_slot(&self, instrument: InstrumentId) -> Option<PriceSlot> {
        self.last_slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&instrument)
            .copied()
    }

    /// The one subscription request sent per connection.
    pub fn subscription_message(&self) -> Value {
        json!({
            "action": "subscribe",
            "channels": [{
                "name": self.config.channel,
                "resolution": self.config.resolution,
                "tradingPairs": self.registry.pairs(),
            }]
        })
    }

    /// Run the connection loop until shutdown.
    ///
    /// Reconnects with exponential backoff; the backoff resets once a
    /// connection is open and subscribed.
    #[instrument(skip(self, shutdown_rx), fields(listener = %self.config.label))]
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) -> anyhow::Result<()> {
        let mut backoff = Backoff::new(self.config.reconnect);
        info!(
            url = %self.config.ws_url,
            pairs = self.registry.len(),
            slot_decimals = self.quantizer.decimals(),
            "Starting feed listener"
        );

        loop {
            self.set_state(ConnectionState::Connecting);

            match self.connect_and_stream(&mut shutdown_rx, &mut backoff).await {
                Ok(()) => {
                    self.set_state(ConnectionState::Disconnected);
                    info!("Feed listener shut down gracefully");
                    return Ok(());
                }
                Err(e) => {
                    self.set_state(ConnectionState::Disconnected);
                    let delay = backoff.next_delay();
                    self.metrics
                        .feed_reconnects
                        .with_label_values(&[&self.config.label])
                        .inc();
                    warn!(error = %e, delay_ms = delay.as_millis() as u64, "Feed disconnected, reconnecting");

                    tokio::select! {
                        _ = shutdown_rx.recv() => return Ok(()),
                        _ = tokio::time::sleep(delay) => {},
                    }
                }
            }
        }
    }

    /// Single session: connect, subscribe, stream until error or shutdown.
    async fn connect_and_stream(
        &self,
        shutdown_rx: &mut broadcast::Receiver<()>,
        backoff: &mut Backoff,
    ) -> Result<(), FeedError> {
        let mut request = self.config.ws_url.as_str().into_client_request()?;
        let key = HeaderValue::from_str(&self.config.api_key)
            .map_err(|e| FeedError::Request(e.to_string()))?;
        request.headers_mut().insert("x-api-key", key);

        let limit = self.config.connect_timeout;
        let (mut write, mut read) = tokio::time::timeout(limit, async {
            let (ws_stream, _) = connect_async(request).await?;
            let (mut write, read) = ws_stream.split();
            write
                .send(Message::Text(self.subscription_message().to_string()))
                .await?;
            Ok::<_, FeedError>((write, read))
        })
        .await
        .map_err(|_| FeedError::ConnectTimeout(limit))??;
        self.set_state(ConnectionState::Subscribed);
        backoff.reset();
        info!("Feed connected, subscription sent");

        let mut keepalive = Keepalive::new(self.config.ping_interval, self.config.pong_grace);
        let period = keepalive.interval();
        let mut ping_timer = tokio::time::interval_at(Instant::now() + period, period);

        loop {
            let pong_deadline = keepalive.pong_deadline();

            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal in feed listener");
                    let _ = write.send(Message::Close(None)).await;
                    return Ok(());
                }
                _ = async {
                    match pong_deadline {
                        Some(deadline) => sleep_until(deadline).await,
                        None => std::future::pending().await,
                    }
                } => {
                    if keepalive.is_overdue(Instant::now()) {
                        return Err(FeedError::PongTimeout(self.config.pong_grace));
                    }
                }
                _ = ping_timer.tick() => {
                    if !keepalive.awaiting_pong() {
                        write.send(Message::Ping(Vec::new())).await?;
                        keepalive.on_ping_sent(Instant::now());
                    }
                }
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            if let Err(e) = self.handle_text(&text) {
                                warn!(error = %e, "Dropping feed message");
                            }
                        }
                        Some(Ok(Message::Pong(_))) => keepalive.on_pong(Instant::now()),
                        Some(Ok(Message::Ping(_))) => debug!("Feed ping received"),
                        Some(Ok(Message::Close(frame))) => {
                            debug!(?frame, "Feed close frame");
                            return Err(FeedError::Closed);
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => return Err(FeedError::Ws(e)),
                        None => return Err(FeedError::Closed),
                    }
                }
            }
        }
    }

    /// Process one text frame.
    ///
    /// Returns the outcome of every price update it carried. Control
    /// messages and other channels yield an empty list.
    pub fn handle_text(&self, text: &str) -> Result<Vec<UpdateOutcome>, FeedError> {
        let msg: Value =
            serde_json::from_str(text).map_err(|e| FeedError::Malformed(e.to_string()))?;

        match msg.get("event").and_then(Value::as_str) {
            Some("subscribed") => {
                self.set_state(ConnectionState::Connected);
                info!("Feed subscription acknowledged");
                Ok(Vec::new())
            }
            Some(event) if event == self.config.channel => {
                let Some(Value::Array(payload)) = msg.get("payload") else {
                    return Err(FeedError::Malformed("payload is not an array".into()));
                };
                Ok(payload.iter().map(|raw| self.process_update(raw)).collect())
            }
            _ => Ok(Vec::new()),
        }
    }

    /// Dedupe one raw update and start a cycle when warranted.
    pub fn process_update(&self, raw: &Value) -> UpdateOutcome {
        let outcome = self.classify_update(raw);
        self.metrics
            .price_updates
            .with_label_values(&[&self.config.label, outcome.label()])
            .inc();
        outcome
    }

    fn classify_update(&self, raw: &Value) -> UpdateOutcome {
        let Some(instrument) = raw
            .get("tradingPair")
            .and_then(Value::as_str)
            .and_then(|pair| self.registry.resolve(pair))
        else {
            return UpdateOutcome::UnknownPair;
        };

        let Some(price) = raw.get("currentPrice").and_then(parse_price) else {
            return UpdateOutcome::InvalidPrice;
        };
        let Some(slot) = self.quantizer.slot(price) else {
            return UpdateOutcome::InvalidPrice;
        };

        let update = PriceUpdate {
            instrument: instrument.id,
            price,
            source_time: parse_source_time(raw.get("time")),
        };

        {
            let mut last = self.last_slots.lock().unwrap_or_else(PoisonError::into_inner);
            if last.get(&update.instrument) == Some(&slot) {
                return UpdateOutcome::DuplicateSlot;
            }
            last.insert(update.instrument, slot);
        }

        let Some(lease) = self.guard.try_acquire(update.instrument) else {
            debug!(instrument = update.instrument, slot, "Cycle already running");
            return UpdateOutcome::CycleRunning;
        };

        info!(
            instrument = update.instrument,
            pair = %instrument.pair,
            price = %update.price,
            slot,
            source_time = ?update.source_time,
            "New price slot"
        );

        UpdateOutcome::Started(self.spawn_cycle(
            lease,
            CycleTrigger {
                instrument: update.instrument,
                price: update.price,
                slot,
            },
        ))
    }

    fn spawn_cycle(&self, lease: CycleLease, trigger: CycleTrigger) -> JoinHandle<()> {
        let handler = Arc::clone(&self.handler);
        let metrics = Arc::clone(&self.metrics);
        let label = self.config.label.clone();

        tokio::spawn(async move {
            let _lease = lease;
            let started = Instant::now();

            let result = match handler.run_cycle(trigger).await {
                Ok(()) => "ok",
                Err(e) => {
                    error!(listener = %label, instrument = trigger.instrument, error = %e, "Cycle failed");
                    "error"
                }
            };

            metrics.cycles.with_label_values(&[&label, result]).inc();
            metrics
                .cycle_duration_seconds
                .with_label_values(&[&label])
                .observe(started.elapsed().as_secs_f64());
        })
    }

    fn set_state(&self, next: ConnectionState) {
        let prev = std::mem::replace(
            &mut *self.state.lock().unwrap_or_else(PoisonError::into_inner),
            next,
        );
        if prev != next {
            debug!(listener = %self.config.label, from = ?prev, to = ?next, "Feed state change");
        }

        let connected = next == ConnectionState::Connected;
        self.connected.store(connected, Ordering::Relaxed);
        self.metrics
            .feed_connected
            .with_label_values(&[&self.config.label])
            .set(i64::from(connected));
    }
}
