// Shared fixtures: wiremock for the REST side, an in-process Socket.IO
// server for the alarm socket.
#![allow(dead_code, clippy::unwrap_used)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use secrecy::SecretString;
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use ringalarm_api::socketio::{self, Frame, Packet};
use ringalarm_api::{Endpoints, ReconnectConfig, SessionConfig};

pub const PANEL_ID: &str = "5f3c2a10-8b7e-4c1d-9a2b-0123456789ab";

// ── REST fixtures ───────────────────────────────────────────────────

pub fn session_config(server: &MockServer) -> SessionConfig {
    let base = Url::parse(&server.uri()).unwrap();
    let mut config = SessionConfig::new("user@example.com", SecretString::from("hunter2"))
        .with_endpoints(Endpoints::rooted_at(&base).unwrap())
        .with_retry_delay(Duration::from_millis(10))
        .with_reconnect(ReconnectConfig {
            initial_delay: Duration::from_millis(20),
            max_delay: Duration::from_millis(100),
            max_retries: None,
        });
    config.handshake_timeout = Duration::from_secs(5);
    config
}

pub fn token_body(access: &str) -> Value {
    json!({
        "access_token": access,
        "refresh_token": format!("refresh-{access}"),
        "expires_in": 3600,
        "token_type": "bearer",
    })
}

/// Token endpoint answering every grant with `access`.
pub async fn mount_oauth(server: &MockServer, access: &str) {
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body(access)))
        .mount(server)
        .await;
}

/// Ticket endpoint pointing at the fake alarm server.
pub async fn mount_ticket(server: &MockServer, alarm: &FakeAlarmServer) {
    Mock::given(method("POST"))
        .and(path("/api/v1/rs/connections"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "server": alarm.addr.to_string(),
            "authCode": "one-time-code",
        })))
        .mount(server)
        .await;
}

pub async fn requests_to(server: &MockServer, route: &str) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.url.path() == route)
        .count()
}

// ── Fake alarm socket server ────────────────────────────────────────

/// Something the test wants the server to do on the current connection.
#[derive(Debug)]
pub enum Action {
    Emit { name: String, payload: Value },
    Drop,
}

/// Event received from a client.
#[derive(Debug, Clone)]
pub struct Received {
    pub connection: usize,
    pub name: String,
    pub payload: Value,
}

pub struct FakeAlarmServer {
    pub addr: SocketAddr,
    accepted: Arc<AtomicUsize>,
    current: Arc<Mutex<Option<mpsc::UnboundedSender<Action>>>>,
    received: mpsc::UnboundedReceiver<Received>,
}

impl FakeAlarmServer {
    pub async fn start() -> Self {
        Self::with_heartbeat(25_000, 5_000).await
    }

    /// Server advertising the given Engine.IO ping interval and timeout.
    /// It never answers pings, so a short pair makes it look dead.
    pub async fn with_heartbeat(ping_interval_ms: u64, ping_timeout_ms: u64) -> Self {
        let open = format!(
            r#"0{{"sid":"fake-sid","upgrades":[],"pingInterval":{ping_interval_ms},"pingTimeout":{ping_timeout_ms}}}"#
        );
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accepted = Arc::new(AtomicUsize::new(0));
        let current = Arc::new(Mutex::new(None));
        let (received_tx, received) = mpsc::unbounded_channel();

        let counter = Arc::clone(&accepted);
        let slot = Arc::clone(&current);
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let connection = counter.fetch_add(1, Ordering::SeqCst) + 1;
                let (tx, rx) = mpsc::unbounded_channel();
                *slot.lock().unwrap() = Some(tx);
                tokio::spawn(serve(stream, connection, open.clone(), rx, received_tx.clone()));
            }
        });

        Self {
            addr,
            accepted,
            current,
            received,
        }
    }

    pub fn connections(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    pub fn emit(&self, name: &str, payload: Value) {
        self.act(Action::Emit {
            name: name.into(),
            payload,
        });
    }

    /// Close the current connection from the server side.
    pub fn drop_connection(&self) {
        self.act(Action::Drop);
    }

    fn act(&self, action: Action) {
        let current = self.current.lock().unwrap();
        current.as_ref().expect("no client connected").send(action).unwrap();
    }

    /// Next event a client sent, with a timeout so a broken test fails
    /// instead of hanging.
    pub async fn next_event(&mut self) -> Received {
        tokio::time::timeout(Duration::from_secs(5), self.received.recv())
            .await
            .expect("timed out waiting for a client event")
            .expect("server stopped")
    }

    /// Wait until `n` connections have been accepted.
    pub async fn wait_for_connections(&self, n: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.connections() < n {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("timed out waiting for a reconnect");
    }
}

async fn serve(
    stream: TcpStream,
    connection: usize,
    open: String,
    mut actions: mpsc::UnboundedReceiver<Action>,
    received: mpsc::UnboundedSender<Received>,
) {
    let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
        return;
    };
    if ws.send(Message::text(open)).await.is_err() || ws.send(Message::text("40")).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            action = actions.recv() => match action {
                Some(Action::Emit { name, payload }) => {
                    let frame = socketio::encode_event(&name, &payload);
                    if ws.send(Message::text(frame)).await.is_err() {
                        return;
                    }
                }
                Some(Action::Drop) | None => {
                    let _ = ws.close(None).await;
                    return;
                }
            },
            frame = ws.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    if let Ok(Frame::Message(Packet::Event { name, payload })) = socketio::decode(&text) {
                        let _ = received.send(Received { connection, name, payload });
                    }
                }
                Some(Ok(Message::Close(_)) | Err(_)) | None => return,
                Some(Ok(_)) => {}
            },
        }
    }
}
