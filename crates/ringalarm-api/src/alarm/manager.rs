// ── Alarm connection manager ──
//
// At most one socket per location. A location moves
// Absent → Connecting → Connected → Absent; every transition happens
// under one lock, and every socket carries an epoch so events from a
// socket that has already been replaced or closed are ignored.
//
// Pending one-shot responses live on the socket and die with it.
// Durable subscriptions live on the location and are replayed onto each
// new socket.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde_json::{Map, Value};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::registry::{self, AlarmCallback, Subscriptions};
use super::socket::{self, Inbound, Outbound};
use crate::config::ReconnectConfig;
use crate::error::Error;
use crate::http::ApiRequest;
use crate::models::{AlarmMessage, ConnectionTicket};
use crate::queue::PendingQueue;
use crate::session::Session;
use crate::socketio;

type Responder = oneshot::Sender<Result<AlarmMessage, Error>>;

/// Observable per-location connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Absent,
    Connecting,
    Connected,
}

struct LiveSocket {
    epoch: u64,
    outbound: mpsc::UnboundedSender<Outbound>,
    /// One-shot responders keyed by sequence number.
    pending: HashMap<u64, Responder>,
    /// Listeners attached to this socket (replayed from durable subscriptions).
    listeners: Subscriptions,
    cancel: CancellationToken,
}

enum Link {
    Absent,
    Connecting {
        epoch: u64,
        waiters: PendingQueue<Result<(), String>>,
    },
    Connected(LiveSocket),
}

struct LocationSlot {
    link: Link,
    subscriptions: Subscriptions,
    /// A reconnect loop is running for this location.
    supervised: bool,
    /// Closed by the caller; supervision must not revive it.
    suspended: bool,
}

impl Default for LocationSlot {
    fn default() -> Self {
        Self {
            link: Link::Absent,
            subscriptions: Subscriptions::default(),
            supervised: false,
            suspended: false,
        }
    }
}

/// How a connection attempt ended, from the manager's point of view.
enum AttemptFailure {
    /// Ticket request failed; nothing was dialed.
    Ticket(String),
    /// Dial or handshake failed; treated as a connection loss.
    Socket(String),
}

/// Owns every alarm socket for one session.
pub struct AlarmManager {
    session: Arc<Session>,
    slots: Mutex<HashMap<String, LocationSlot>>,
    epochs: AtomicU64,
    cancel: CancellationToken,
}

impl std::fmt::Debug for AlarmManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlarmManager")
            .field("locations", &self.lock().len())
            .finish_non_exhaustive()
    }
}

impl AlarmManager {
    pub fn new(session: Arc<Session>) -> Arc<Self> {
        Arc::new(Self {
            session,
            slots: Mutex::new(HashMap::new()),
            epochs: AtomicU64::new(1),
            cancel: CancellationToken::new(),
        })
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, LocationSlot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn connection_state(&self, location: &str) -> ConnectionState {
        match self.lock().get(location).map(|slot| &slot.link) {
            Some(Link::Connected(_)) => ConnectionState::Connected,
            Some(Link::Connecting { .. }) => ConnectionState::Connecting,
            Some(Link::Absent) | None => ConnectionState::Absent,
        }
    }

    /// Number of one-shot responses still outstanding on a location's socket.
    pub fn pending_responses(&self, location: &str) -> usize {
        match self.lock().get(location).map(|slot| &slot.link) {
            Some(Link::Connected(live)) => live.pending.len(),
            _ => 0,
        }
    }

    /// Number of durable subscriptions recorded for a location.
    pub fn subscription_count(&self, location: &str) -> usize {
        self.lock()
            .get(location)
            .map_or(0, |slot| slot.subscriptions.len())
    }

    // ── Connection lifecycle ─────────────────────────────────────────

    /// Make sure a live socket exists for `location`. Idempotent.
    ///
    /// Concurrent callers during a connection attempt share that attempt.
    pub async fn ensure_connection(self: &Arc<Self>, location: &str) -> Result<(), Error> {
        self.connect(location, true).await
    }

    /// `revive` clears a prior close; the reconnect loop passes `false` so
    /// a close issued between attempts is honored.
    async fn connect(self: &Arc<Self>, location: &str, revive: bool) -> Result<(), Error> {
        let rx = {
            let mut slots = self.lock();
            let slot = slots.entry(location.to_owned()).or_default();
            if revive {
                slot.suspended = false;
            } else if slot.suspended {
                return Err(Error::ConnectionClosed {
                    location: location.to_owned(),
                });
            }
            match &mut slot.link {
                Link::Connected(_) => return Ok(()),
                Link::Connecting { waiters, .. } => {
                    let rx = waiters.enqueue();
                    debug!(location, queued = waiters.len(), "connection in progress, queuing caller");
                    rx
                }
                Link::Absent => {
                    let epoch = self.epochs.fetch_add(1, Ordering::Relaxed);
                    let mut waiters = PendingQueue::new();
                    let rx = waiters.enqueue();
                    slot.link = Link::Connecting { epoch, waiters };
                    self.spawn_attempt(location.to_owned(), epoch);
                    rx
                }
            }
        };

        match rx.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(reason)) => Err(Error::ConnectFailed {
                location: location.to_owned(),
                reason,
            }),
            Err(_) => Err(Error::ConnectFailed {
                location: location.to_owned(),
                reason: "connection attempt abandoned".into(),
            }),
        }
    }

    fn spawn_attempt(self: &Arc<Self>, location: String, epoch: u64) {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let cancel = manager.cancel.child_token();
            match manager.dial(&location, cancel.clone()).await {
                Ok(channels) => manager.connected(location, epoch, channels, cancel),
                Err(failure) => manager.attempt_failed(&location, epoch, failure),
            }
        });
    }

    async fn dial(&self, location: &str, cancel: CancellationToken) -> Result<socket::SocketChannels, AttemptFailure> {
        let ticket = self
            .fetch_ticket(location)
            .await
            .map_err(|e| AttemptFailure::Ticket(e.to_string()))?;

        let config = self.session.config();
        let url = socket::socket_url(&config.endpoints.socket_scheme, &ticket.server, &ticket.auth_code)
            .map_err(|e| AttemptFailure::Ticket(e.to_string()))?;

        socket::open(&url, config.handshake_timeout, cancel)
            .await
            .map_err(|e| AttemptFailure::Socket(e.to_string()))
    }

    async fn fetch_ticket(&self, location: &str) -> Result<ConnectionTicket, Error> {
        let request = ApiRequest::post(self.session.config().endpoints.connections.as_str())
            .form_field("accountId", location);
        let response = self.session.request(&request).await?;
        response.body.decode_into()
    }

    /// Register the new socket, replay durable subscriptions, release waiters.
    fn connected(
        self: &Arc<Self>,
        location: String,
        epoch: u64,
        channels: socket::SocketChannels,
        cancel: CancellationToken,
    ) {
        let mut slots = self.lock();
        let Some(slot) = slots.get_mut(&location) else {
            cancel.cancel();
            return;
        };
        let mut waiters = match std::mem::replace(&mut slot.link, Link::Absent) {
            Link::Connecting { epoch: current, waiters } if current == epoch => waiters,
            other => {
                // Closed (or superseded) while dialing.
                slot.link = other;
                let _ = channels.outbound.send(Outbound::Terminate);
                debug!(location, epoch, "discarding socket for a cancelled attempt");
                return;
            }
        };

        let listeners = slot.subscriptions.replay();
        slot.link = Link::Connected(LiveSocket {
            epoch,
            outbound: channels.outbound,
            pending: HashMap::new(),
            listeners,
            cancel,
        });
        let released = waiters.drain(&Ok(()));
        drop(slots);

        info!(location, epoch, released, "alarm connection established");
        self.spawn_router(location, epoch, channels.inbound);
    }

    fn attempt_failed(self: &Arc<Self>, location: &str, epoch: u64, failure: AttemptFailure) {
        let (reason, socket_level) = match failure {
            AttemptFailure::Ticket(reason) => (reason, false),
            AttemptFailure::Socket(reason) => (reason, true),
        };

        let supervise = {
            let mut slots = self.lock();
            let Some(slot) = slots.get_mut(location) else {
                return;
            };
            match std::mem::replace(&mut slot.link, Link::Absent) {
                Link::Connecting { epoch: current, mut waiters } if current == epoch => {
                    waiters.drain(&Err(reason.clone()));
                }
                other => {
                    slot.link = other;
                    return;
                }
            }
            let supervise = socket_level && !slot.supervised && !slot.suspended;
            if supervise {
                slot.supervised = true;
            }
            supervise
        };

        warn!(location, %reason, "alarm connection attempt failed");
        if socket_level {
            self.session.invalidate_token();
        }
        if supervise {
            self.spawn_supervisor(location.to_owned());
        }
    }

    fn spawn_router(self: &Arc<Self>, location: String, epoch: u64, mut inbound: mpsc::UnboundedReceiver<Inbound>) {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(event) = inbound.recv().await {
                match event {
                    Inbound::Event { name, payload } => manager.deliver(&location, epoch, name, payload),
                    Inbound::Lost(reason) => {
                        manager.connection_lost(&location, epoch, &reason);
                        return;
                    }
                }
            }
            manager.connection_lost(&location, epoch, "socket task ended");
        });
    }

    /// Route one inbound event: to its one-shot responder (by `seq`), then
    /// to every listener attached for its event name.
    fn deliver(&self, location: &str, epoch: u64, name: String, payload: Value) {
        let message = AlarmMessage {
            location_id: location.to_owned(),
            event: name,
            payload,
        };

        let (responder, listeners) = {
            let mut slots = self.lock();
            let Some(LocationSlot {
                link: Link::Connected(live),
                ..
            }) = slots.get_mut(location)
            else {
                return;
            };
            if live.epoch != epoch {
                return;
            }
            let responder = if message.event == "message" {
                message.seq().and_then(|seq| live.pending.remove(&seq))
            } else {
                None
            };
            (responder, live.listeners.get(&message.event))
        };

        debug!(
            location,
            event = %message.event,
            msg = message.msg().unwrap_or_default(),
            datatype = message.datatype().unwrap_or_default(),
            seq = message.seq(),
            "response"
        );

        if let Some(responder) = responder {
            let _ = responder.send(Ok(message.clone()));
        }
        registry::dispatch(&listeners, &message);
    }

    /// Tear down a dropped socket: fail its pending responses, drop the
    /// session token, and start reconnect supervision.
    fn connection_lost(self: &Arc<Self>, location: &str, epoch: u64, reason: &str) {
        let (pending, supervise) = {
            let mut slots = self.lock();
            let Some(slot) = slots.get_mut(location) else {
                return;
            };
            let live = match std::mem::replace(&mut slot.link, Link::Absent) {
                Link::Connected(live) if live.epoch == epoch => live,
                other => {
                    slot.link = other;
                    return;
                }
            };
            live.cancel.cancel();
            let supervise = !slot.supervised && !slot.suspended;
            if supervise {
                slot.supervised = true;
            }
            (live.pending, supervise)
        };

        warn!(location, %reason, outstanding = pending.len(), "websocket disconnect detected");
        // The service may reject the old token after a socket failure.
        self.session.invalidate_token();
        fail_pending(pending, || Error::ConnectionLost {
            location: location.to_owned(),
            reason: reason.to_owned(),
        });

        if supervise {
            info!(location, "attempting to reconnect");
            self.spawn_supervisor(location.to_owned());
        }
    }

    fn spawn_supervisor(self: &Arc<Self>, location: String) {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            manager.supervise(&location).await;
            if let Some(slot) = manager.lock().get_mut(&location) {
                slot.supervised = false;
            }
        });
    }

    /// Reconnect loop: first attempt immediately, then exponential backoff.
    async fn supervise(self: &Arc<Self>, location: &str) {
        let reconnect = self.session.config().reconnect.clone();
        let mut attempt: u32 = 0;

        loop {
            let suspended = self.lock().get(location).is_none_or(|slot| slot.suspended);
            if suspended || self.cancel.is_cancelled() {
                debug!(location, "reconnect supervision stopped");
                return;
            }

            match self.connect(location, false).await {
                Ok(()) => {
                    info!(location, attempt, "alarm connection re-established");
                    return;
                }
                // Closed by the caller while we were dialling.
                Err(e) if e.is_connection_loss() && !e.is_transient() => return,
                Err(e) => {
                    if e.is_transient() {
                        warn!(location, attempt, error = %e, "reconnect attempt failed");
                    } else {
                        error!(location, attempt, error = %e, "reconnect attempt failed");
                    }
                    if reconnect.max_retries.is_some_and(|max| attempt >= max) {
                        error!(location, "reconnection limit reached, giving up");
                        return;
                    }
                }
            }

            let delay = calculate_backoff(attempt, &reconnect);
            debug!(location, delay_ms = delay.as_millis(), attempt, "waiting before reconnect");
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => return,
                () = tokio::time::sleep(delay) => {}
            }
            attempt += 1;
        }
    }

    /// Close a location's socket. Durable subscriptions are kept and
    /// replayed if the location is used again.
    pub fn close_connection(&self, location: &str) -> bool {
        let closed = {
            let mut slots = self.lock();
            let Some(slot) = slots.get_mut(location) else {
                return false;
            };
            slot.suspended = true;
            match std::mem::replace(&mut slot.link, Link::Absent) {
                Link::Absent => None,
                Link::Connecting { mut waiters, .. } => {
                    waiters.drain(&Err("connection closed before it was established".into()));
                    Some(HashMap::new())
                }
                Link::Connected(live) => {
                    let _ = live.outbound.send(Outbound::Terminate);
                    Some(live.pending)
                }
            }
        };

        let Some(pending) = closed else {
            return false;
        };
        info!(location, outstanding = pending.len(), "closing alarm connection");
        fail_pending(pending, || Error::ConnectionClosed {
            location: location.to_owned(),
        });
        true
    }

    /// Close every socket and stop all supervision.
    pub fn shutdown(&self) {
        let locations: Vec<String> = self.lock().keys().cloned().collect();
        for location in locations {
            self.close_connection(&location);
        }
        self.cancel.cancel();
    }

    // ── Correlation & subscriptions ──────────────────────────────────

    /// Send an event whose response is correlated by sequence number.
    ///
    /// The next session sequence number is written into `body.seq`. The
    /// returned future resolves with the matching response, or with an
    /// error if the socket is lost or closed first.
    pub async fn send_command(
        self: &Arc<Self>,
        location: &str,
        event: &str,
        mut body: Map<String, Value>,
    ) -> Result<AlarmMessage, Error> {
        self.ensure_connection(location).await?;

        let rx = {
            let mut slots = self.lock();
            let Some(LocationSlot {
                link: Link::Connected(live),
                ..
            }) = slots.get_mut(location)
            else {
                return Err(Error::ConnectionLost {
                    location: location.to_owned(),
                    reason: "connection dropped before the command was sent".into(),
                });
            };

            let seq = self.session.next_seq();
            body.insert("seq".into(), seq.into());
            let msg = body.get("msg").and_then(Value::as_str).unwrap_or_default().to_owned();
            let frame = socketio::encode_event(event, &Value::Object(body));

            let (tx, rx) = oneshot::channel();
            live.pending.insert(seq, tx);
            if live.outbound.send(Outbound::Emit(frame)).is_err() {
                live.pending.remove(&seq);
                return Err(Error::ConnectionLost {
                    location: location.to_owned(),
                    reason: "socket task is gone".into(),
                });
            }
            debug!(location, event, %msg, seq, "transmit");
            rx
        };

        rx.await.unwrap_or_else(|_| {
            Err(Error::ConnectionLost {
                location: location.to_owned(),
                reason: "response channel dropped".into(),
            })
        })
    }

    /// Register a durable callback for every `event` on `location`.
    ///
    /// Registering the same callback twice for the same event is a no-op.
    /// The callback is attached to the current socket immediately and to
    /// every future socket for the location.
    pub async fn subscribe(self: &Arc<Self>, location: &str, event: &str, callback: AlarmCallback) -> Result<(), Error> {
        self.ensure_connection(location).await?;

        let mut slots = self.lock();
        let slot = slots.entry(location.to_owned()).or_default();
        if slot.subscriptions.add(event, &callback) {
            debug!(location, event, "registered callback for message type");
        } else {
            debug!(location, event, "callback for message type already exists");
        }
        if let Link::Connected(live) = &mut slot.link {
            live.listeners.add(event, &callback);
        }
        Ok(())
    }
}

impl Drop for AlarmManager {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Fail every outstanding responder, lowest sequence number first.
fn fail_pending(pending: HashMap<u64, Responder>, error: impl Fn() -> Error) {
    let ordered: BTreeMap<u64, Responder> = pending.into_iter().collect();
    for (seq, responder) in ordered {
        debug!(seq, "cleanup");
        let _ = responder.send(Err(error()));
    }
}

// ── Backoff calculation ──────────────────────────────────────────────

/// Exponential backoff with jitter.
///
/// `delay = min(initial * 2^attempt, max) + jitter`
///
/// Jitter is +-25% to spread out reconnection storms from multiple clients.
fn calculate_backoff(attempt: u32, config: &ReconnectConfig) -> Duration {
    let exponent = i32::try_from(attempt.min(31)).unwrap_or(31);
    let base = config.initial_delay.as_secs_f64() * 2.0_f64.powi(exponent);
    let capped = base.min(config.max_delay.as_secs_f64());

    // Deterministic "jitter" seeded from the attempt number.
    let jitter_factor = 1.0 + 0.25 * (f64::from(attempt) * 7.3).sin();
    let with_jitter = (capped * jitter_factor).max(0.0);

    Duration::from_secs_f64(with_jitter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_increases_exponentially() {
        let config = ReconnectConfig::default();

        let d0 = calculate_backoff(0, &config);
        let d1 = calculate_backoff(1, &config);
        let d2 = calculate_backoff(2, &config);

        assert!(d1 > d0, "d1 ({d1:?}) should be greater than d0 ({d0:?})");
        assert!(d2 > d1, "d2 ({d2:?}) should be greater than d1 ({d1:?})");
    }

    #[test]
    fn backoff_caps_at_max_delay() {
        let config = ReconnectConfig {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            max_retries: None,
        };

        let d10 = calculate_backoff(10, &config);
        // With jitter factor up to 1.25, max effective is 12.5s
        assert!(
            d10 <= Duration::from_secs(13),
            "delay at attempt 10 ({d10:?}) should be capped near max_delay"
        );
        assert!(calculate_backoff(u32::MAX, &config) <= Duration::from_secs(13));
    }

    #[tokio::test]
    async fn fail_pending_reaches_every_responder() {
        let mut pending = HashMap::new();
        let mut receivers = Vec::new();
        for seq in [3_u64, 1, 2] {
            let (tx, rx) = oneshot::channel();
            pending.insert(seq, tx);
            receivers.push(rx);
        }

        fail_pending(pending, || Error::ConnectionClosed {
            location: "loc".into(),
        });

        for rx in receivers {
            assert!(matches!(rx.await.unwrap(), Err(Error::ConnectionClosed { .. })));
        }
    }
}
