// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Connection state machine.
//!
//! ```text
//! disconnected -> connecting -> connected -> disconnected -> connecting ...
//!                     |                                        ^
//!                     +--> error ---- scheduled reconnect -----+
//! ```
//!
//! Every connection attempt gets a fresh epoch. Link events, heartbeats and
//! connect results carrying an older epoch are ignored, so a manual
//! `disconnect()` cleanly supersedes anything still in flight.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use tether_bus::{Listeners, Subscription};
use tether_config::model::TransportConfig;
use tether_core::metrics;
use tether_core::traits::connector::{CLOSE_ABNORMAL, CLOSE_NORMAL};
use tether_core::types::message_types;
use tether_core::{
    Clock, ConnectionState, Connector, Frame, Link, LinkEvent, OutgoingMessage, TetherError,
    TransportMessage,
};

use crate::backoff::reconnect_delay;
use crate::events::{Disconnected, TransportFailure};
use crate::url::build_connection_url;

/// Tunables for a [`Transport`].
#[derive(Clone)]
pub struct TransportSettings {
    pub endpoint: String,
    pub auth_token: Option<String>,
    /// Base of the exponential reconnect backoff.
    pub reconnect_interval: Duration,
    pub max_reconnect_attempts: u32,
    pub heartbeat_interval: Duration,
    /// Outbound messages kept while disconnected. The oldest is dropped first.
    pub outbound_capacity: usize,
}

impl std::fmt::Debug for TransportSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportSettings")
            .field("endpoint", &self.endpoint)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "[REDACTED]"))
            .field("reconnect_interval", &self.reconnect_interval)
            .field("max_reconnect_attempts", &self.max_reconnect_attempts)
            .field("heartbeat_interval", &self.heartbeat_interval)
            .field("outbound_capacity", &self.outbound_capacity)
            .finish()
    }
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self::from(&TransportConfig::default())
    }
}

impl From<&TransportConfig> for TransportSettings {
    fn from(config: &TransportConfig) -> Self {
        Self {
            endpoint: config.endpoint.clone(),
            auth_token: config.auth_token.clone(),
            reconnect_interval: config.reconnect_interval(),
            max_reconnect_attempts: config.max_reconnect_attempts,
            heartbeat_interval: config.heartbeat_interval(),
            outbound_capacity: config.outbound_capacity,
        }
    }
}

/// Handle to the connection. Clones share the same connection.
#[derive(Clone)]
pub struct Transport {
    inner: Arc<Inner>,
}

struct Inner {
    settings: TransportSettings,
    url: String,
    connector: Arc<dyn Connector>,
    clock: Arc<dyn Clock>,
    state: watch::Sender<ConnectionState>,
    shared: Mutex<Shared>,
    connected: Listeners<()>,
    disconnected: Listeners<Disconnected>,
    errors: Listeners<TransportFailure>,
    any_message: Listeners<TransportMessage>,
    by_type: Mutex<HashMap<String, Listeners<TransportMessage>>>,
}

#[derive(Default)]
struct Shared {
    epoch: u64,
    link: Option<mpsc::UnboundedSender<Frame>>,
    manual_close: bool,
    reconnect_attempts: u32,
    outbound: VecDeque<TransportMessage>,
    connecting: Option<PendingConnect>,
    reconnect_task: Option<JoinHandle<()>>,
    heartbeat_task: Option<JoinHandle<()>>,
    reader_task: Option<JoinHandle<()>>,
}

/// The attempt currently opening a link. Joining callers wait on `outcome`.
struct PendingConnect {
    cancel: CancellationToken,
    outcome: watch::Receiver<Option<AttemptOutcome>>,
}

enum Role {
    Join(watch::Receiver<Option<AttemptOutcome>>),
    Lead {
        epoch: u64,
        cancel: CancellationToken,
        outcome_tx: watch::Sender<Option<AttemptOutcome>>,
    },
}

#[derive(Debug, Clone)]
enum AttemptOutcome {
    Connected,
    Cancelled(String),
    Failed(String),
}

impl AttemptOutcome {
    fn of(result: &Result<(), TetherError>) -> Self {
        match result {
            Ok(()) => Self::Connected,
            Err(TetherError::Cancelled(reason)) => Self::Cancelled(reason.clone()),
            Err(TetherError::Transport { message, .. }) => Self::Failed(message.clone()),
            Err(e) => Self::Failed(e.to_string()),
        }
    }

    fn into_result(self) -> Result<(), TetherError> {
        match self {
            Self::Connected => Ok(()),
            Self::Cancelled(reason) => Err(TetherError::Cancelled(reason)),
            Self::Failed(reason) => Err(TetherError::transport(reason)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    Caller,
    Reconnect,
}

impl Transport {
    /// Create a disconnected transport. Fails if the endpoint is unusable.
    pub fn new(
        settings: TransportSettings,
        connector: Arc<dyn Connector>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, TetherError> {
        let url = build_connection_url(&settings.endpoint, settings.auth_token.as_deref())?;
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Ok(Self {
            inner: Arc::new(Inner {
                settings,
                url,
                connector,
                clock,
                state,
                shared: Mutex::new(Shared::default()),
                connected: Listeners::new(),
                disconnected: Listeners::new(),
                errors: Listeners::new(),
                any_message: Listeners::new(),
                by_type: Mutex::new(HashMap::new()),
            }),
        })
    }

    /// Connect and wait until the connection is up.
    ///
    /// Resolves immediately when already connected and joins the in-flight
    /// attempt when one is running. A failure here is returned to the caller
    /// and does not schedule a reconnect. A `disconnect()` issued while this
    /// is pending makes it return [`TetherError::Cancelled`].
    pub async fn connect(&self) -> Result<(), TetherError> {
        self.inner.establish(Origin::Caller).await
    }

    /// Close the connection and stop reconnecting.
    pub fn disconnect(&self) {
        self.inner.disconnect();
    }

    /// Stamp and send a message, buffering it while the connection is down.
    pub fn send(&self, message: OutgoingMessage) {
        self.inner.send(message);
    }

    pub fn is_connected(&self) -> bool {
        self.connection_state() == ConnectionState::Connected
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    /// Watch channel following every state transition.
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    /// Reconnects fired since the last successful connection.
    pub fn reconnect_attempts(&self) -> u32 {
        self.inner.shared.lock().reconnect_attempts
    }

    /// Messages waiting for the connection to come back.
    pub fn queued_len(&self) -> usize {
        self.inner.shared.lock().outbound.len()
    }

    /// The socket URL, including the token parameter.
    pub fn url(&self) -> &str {
        &self.inner.url
    }

    pub fn on_connected<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&()) + Send + Sync + 'static,
    {
        self.inner.connected.subscribe(callback)
    }

    pub fn on_disconnected<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&Disconnected) + Send + Sync + 'static,
    {
        self.inner.disconnected.subscribe(callback)
    }

    pub fn on_error<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&TransportFailure) + Send + Sync + 'static,
    {
        self.inner.errors.subscribe(callback)
    }

    /// Subscribe to inbound messages of one type.
    pub fn on_message<F>(&self, kind: &str, callback: F) -> Subscription
    where
        F: Fn(&TransportMessage) + Send + Sync + 'static,
    {
        self.inner
            .by_type
            .lock()
            .entry(kind.to_string())
            .or_default()
            .subscribe(callback)
    }

    /// Subscribe to every inbound application message.
    pub fn on_any_message<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&TransportMessage) + Send + Sync + 'static,
    {
        self.inner.any_message.subscribe(callback)
    }
}

impl Inner {
    fn current_state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    fn set_state(&self, next: ConnectionState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            debug!(from = %previous, to = %next, "connection state changed");
        }
    }

    async fn establish(self: &Arc<Self>, origin: Origin) -> Result<(), TetherError> {
        let role = {
            let mut shared = self.shared.lock();
            let joinable = match self.current_state() {
                ConnectionState::Connected => return Ok(()),
                ConnectionState::Connecting => match shared.connecting.as_ref() {
                    // A closed sender means the leading caller was dropped mid-handshake.
                    Some(pending) if pending.outcome.has_changed().is_ok() => {
                        Some(pending.outcome.clone())
                    }
                    Some(_) => None,
                    None => {
                        return Err(TetherError::Cancelled(
                            "disconnected while connecting".to_string(),
                        ));
                    }
                },
                ConnectionState::Disconnected | ConnectionState::Error => None,
            };
            match joinable {
                Some(outcome) => Role::Join(outcome),
                None => {
                    match origin {
                        Origin::Caller => shared.manual_close = false,
                        Origin::Reconnect if shared.manual_close => {
                            return Err(TetherError::Cancelled(
                                "reconnect after manual disconnect".to_string(),
                            ));
                        }
                        Origin::Reconnect => {}
                    }
                    shared.epoch += 1;
                    let cancel = CancellationToken::new();
                    let (outcome_tx, outcome) = watch::channel(None);
                    if let Some(stale) = shared.connecting.replace(PendingConnect {
                        cancel: cancel.clone(),
                        outcome,
                    }) {
                        stale.cancel.cancel();
                    }
                    self.set_state(ConnectionState::Connecting);
                    Role::Lead {
                        epoch: shared.epoch,
                        cancel,
                        outcome_tx,
                    }
                }
            }
        };
        let (epoch, cancel, outcome_tx) = match role {
            Role::Join(outcome) => return join_attempt(outcome).await,
            Role::Lead {
                epoch,
                cancel,
                outcome_tx,
            } => (epoch, cancel, outcome_tx),
        };

        debug!(epoch, ?origin, "opening connection");
        let opened = tokio::select! {
            _ = cancel.cancelled() => Err(TetherError::Cancelled(
                "disconnected while connecting".to_string(),
            )),
            result = self.connector.open(&self.url) => result,
        };

        let result = self.finish_attempt(epoch, origin, opened);
        outcome_tx.send_replace(Some(AttemptOutcome::of(&result)));
        result
    }

    fn finish_attempt(
        self: &Arc<Self>,
        epoch: u64,
        origin: Origin,
        opened: Result<Link, TetherError>,
    ) -> Result<(), TetherError> {
        match opened {
            Ok(link) => self.on_open(epoch, link),
            Err(e) if e.is_cancelled() => Err(e),
            Err(e) => {
                {
                    let mut shared = self.shared.lock();
                    if shared.epoch != epoch {
                        return Err(e);
                    }
                    shared.connecting = None;
                    self.set_state(ConnectionState::Error);
                }
                warn!(error = %e, ?origin, "connection attempt failed");
                self.errors
                    .emit(&TransportFailure::ConnectFailed(e.to_string()));
                if origin == Origin::Reconnect {
                    self.schedule_reconnect();
                }
                Err(e)
            }
        }
    }

    fn on_open(self: &Arc<Self>, epoch: u64, link: Link) -> Result<(), TetherError> {
        let Link { outbound, inbound } = link;
        {
            let mut shared = self.shared.lock();
            if shared.epoch != epoch || shared.manual_close {
                let _ = outbound.send(Frame::Close {
                    code: CLOSE_NORMAL,
                    reason: "superseded".to_string(),
                });
                return Err(TetherError::Cancelled(
                    "disconnected while connecting".to_string(),
                ));
            }

            shared.connecting = None;
            shared.reconnect_attempts = 0;
            for task in [
                shared.reconnect_task.take(),
                shared.reader_task.take(),
                shared.heartbeat_task.take(),
            ]
            .into_iter()
            .flatten()
            {
                task.abort();
            }
            let weak = Arc::downgrade(self);
            shared.reader_task = Some(tokio::spawn(read_loop(weak.clone(), epoch, inbound)));
            shared.heartbeat_task = Some(tokio::spawn(heartbeat_loop(
                weak,
                epoch,
                self.settings.heartbeat_interval,
            )));

            // Replay under the lock so concurrent sends queue behind the backlog.
            self.set_state(ConnectionState::Connected);
            flush_outbound(&mut shared, &outbound);
            shared.link = Some(outbound);
        }

        info!(url = %redact(&self.url), "connected");
        self.connected.emit(&());
        Ok(())
    }

    fn disconnect(&self) {
        let link = {
            let mut shared = self.shared.lock();
            shared.manual_close = true;
            shared.epoch += 1;
            if let Some(pending) = shared.connecting.take() {
                pending.cancel.cancel();
            }
            for task in [
                shared.reconnect_task.take(),
                shared.heartbeat_task.take(),
                shared.reader_task.take(),
            ]
            .into_iter()
            .flatten()
            {
                task.abort();
            }
            shared.link.take()
        };

        if let Some(link) = link {
            let _ = link.send(Frame::Close {
                code: CLOSE_NORMAL,
                reason: "client disconnect".to_string(),
            });
        }
        self.set_state(ConnectionState::Disconnected);
        info!("disconnected by client");
        self.disconnected.emit(&Disconnected {
            code: CLOSE_NORMAL,
            reason: "manual disconnect".to_string(),
            manual: true,
        });
    }

    fn handle_close(self: &Arc<Self>, epoch: u64, code: u16, reason: String) {
        let manual = {
            let mut shared = self.shared.lock();
            if shared.epoch != epoch || shared.link.is_none() {
                return;
            }
            shared.link = None;
            if let Some(task) = shared.heartbeat_task.take() {
                task.abort();
            }
            // Called from the reader itself, which returns right after.
            shared.reader_task = None;
            shared.manual_close
        };

        self.set_state(ConnectionState::Disconnected);
        info!(code, reason = %reason, "connection closed");
        self.disconnected.emit(&Disconnected {
            code,
            reason,
            manual,
        });
        if !manual {
            self.schedule_reconnect();
        }
    }

    /// Arm the reconnect timer unless reconnecting is over.
    fn schedule_reconnect(self: &Arc<Self>) {
        let exhausted = {
            let mut shared = self.shared.lock();
            if shared.manual_close {
                return;
            }
            let attempts = shared.reconnect_attempts;
            if attempts >= self.settings.max_reconnect_attempts {
                Some(attempts)
            } else {
                if let Some(previous) = shared.reconnect_task.take() {
                    previous.abort();
                }
                let delay = reconnect_delay(self.settings.reconnect_interval, attempts);
                info!(
                    attempt = attempts + 1,
                    delay_ms = delay.as_millis() as u64,
                    "reconnect scheduled"
                );
                let weak = Arc::downgrade(self);
                shared.reconnect_task = Some(tokio::spawn(reconnect_after(weak, delay)));
                None
            }
        };

        if let Some(attempts) = exhausted {
            warn!(attempts, "reconnect attempts exhausted");
            self.errors
                .emit(&TransportFailure::ReconnectExhausted { attempts });
        }
    }

    fn send(&self, message: OutgoingMessage) {
        let message = message.stamp(self.clock.now_millis());
        let mut shared = self.shared.lock();

        if self.current_state() == ConnectionState::Connected
            && let Some(link) = shared.link.as_ref()
        {
            match write(link, &message) {
                Ok(()) => return,
                Err(e) => warn!(error = %e, kind = %message.kind, "send failed, buffering"),
            }
        }

        if shared.outbound.len() >= self.settings.outbound_capacity
            && let Some(dropped) = shared.outbound.pop_front()
        {
            metrics::record_outbound_dropped();
            warn!(
                kind = %dropped.kind,
                capacity = self.settings.outbound_capacity,
                "outbound buffer full, dropping oldest message"
            );
        }
        trace!(kind = %message.kind, "message buffered");
        shared.outbound.push_back(message);
    }

    fn handle_text(&self, epoch: u64, text: &str) {
        if self.shared.lock().epoch != epoch {
            return;
        }
        let message: TransportMessage = match serde_json::from_str(text) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "dropping malformed frame");
                return;
            }
        };
        metrics::record_message("inbound");

        match message.kind.as_str() {
            message_types::HEARTBEAT => {
                self.send(OutgoingMessage::new(message_types::HEARTBEAT_ACK, Value::Null));
                return;
            }
            message_types::HEARTBEAT_ACK => {
                trace!("heartbeat acknowledged");
                return;
            }
            message_types::ERROR => {
                warn!(payload = %message.payload, "server reported an error");
                self.errors
                    .emit(&TransportFailure::Remote(message.payload.clone()));
                return;
            }
            _ => {}
        }

        let typed = self.by_type.lock().get(&message.kind).cloned();
        if let Some(listeners) = typed {
            listeners.emit(&message);
        }
        self.any_message.emit(&message);
    }
}

fn write(link: &mpsc::UnboundedSender<Frame>, message: &TransportMessage) -> Result<(), TetherError> {
    let text = serde_json::to_string(message)?;
    link.send(Frame::Text(text))
        .map_err(|_| TetherError::transport("link closed"))?;
    metrics::record_message("outbound");
    Ok(())
}

/// Replay buffered messages in order, stopping at the first failed write.
fn flush_outbound(shared: &mut Shared, link: &mpsc::UnboundedSender<Frame>) {
    let mut replayed = 0usize;
    while let Some(message) = shared.outbound.pop_front() {
        if let Err(e) = write(link, &message) {
            warn!(error = %e, remaining = shared.outbound.len() + 1, "replay interrupted");
            shared.outbound.push_front(message);
            break;
        }
        replayed += 1;
    }
    if replayed > 0 {
        debug!(replayed, "buffered messages replayed");
    }
}

fn redact(url: &str) -> String {
    match url.split_once("token=") {
        Some((head, _)) => format!("{head}token=[REDACTED]"),
        None => url.to_string(),
    }
}

/// Wait for the outcome of an attempt started by another caller.
async fn join_attempt(
    mut outcome: watch::Receiver<Option<AttemptOutcome>>,
) -> Result<(), TetherError> {
    match outcome.wait_for(Option::is_some).await {
        Ok(settled) => match settled.clone() {
            Some(outcome) => outcome.into_result(),
            None => Err(TetherError::Internal("connection attempt has no outcome".to_string())),
        },
        Err(_) => Err(TetherError::Cancelled(
            "connection attempt abandoned".to_string(),
        )),
    }
}

async fn read_loop(weak: Weak<Inner>, epoch: u64, mut inbound: mpsc::UnboundedReceiver<LinkEvent>) {
    while let Some(event) = inbound.recv().await {
        let Some(inner) = weak.upgrade() else { return };
        match event {
            LinkEvent::Text(text) => inner.handle_text(epoch, &text),
            LinkEvent::Closed { code, reason } => {
                inner.handle_close(epoch, code, reason);
                return;
            }
        }
    }
    if let Some(inner) = weak.upgrade() {
        inner.handle_close(epoch, CLOSE_ABNORMAL, "link dropped".to_string());
    }
}

async fn heartbeat_loop(weak: Weak<Inner>, epoch: u64, period: Duration) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // Skip the first immediate tick.
    interval.tick().await;

    loop {
        interval.tick().await;
        let Some(inner) = weak.upgrade() else { return };
        if inner.shared.lock().epoch != epoch
            || inner.current_state() != ConnectionState::Connected
        {
            return;
        }
        trace!("sending heartbeat");
        inner.send(OutgoingMessage::new(message_types::HEARTBEAT, Value::Null));
    }
}

async fn reconnect_after(weak: Weak<Inner>, delay: Duration) {
    tokio::time::sleep(delay).await;
    let Some(inner) = weak.upgrade() else { return };
    let attempt = {
        let mut shared = inner.shared.lock();
        if shared.manual_close {
            return;
        }
        shared.reconnect_attempts += 1;
        // This task is the one stored there; it is finishing on its own.
        shared.reconnect_task = None;
        shared.reconnect_attempts
    };
    metrics::record_reconnect();
    info!(attempt, "reconnecting");
    if let Err(e) = inner.establish(Origin::Reconnect).await {
        debug!(error = %e, attempt, "reconnect attempt did not succeed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_follow_config() {
        let config = TransportConfig {
            endpoint: "https://rt.example.com/ws".to_string(),
            auth_token: Some("secret".to_string()),
            reconnect_interval_ms: 500,
            max_reconnect_attempts: 7,
            heartbeat_interval_secs: 10,
            outbound_capacity: 3,
        };
        let settings = TransportSettings::from(&config);
        assert_eq!(settings.reconnect_interval, Duration::from_millis(500));
        assert_eq!(settings.max_reconnect_attempts, 7);
        assert_eq!(settings.heartbeat_interval, Duration::from_secs(10));
        assert_eq!(settings.outbound_capacity, 3);
        assert!(!format!("{settings:?}").contains("secret"));
    }

    #[test]
    fn token_is_redacted_in_logs() {
        assert_eq!(
            redact("wss://h/ws?token=abc"),
            "wss://h/ws?token=[REDACTED]"
        );
        assert_eq!(redact("ws://h/ws"), "ws://h/ws");
    }
}
