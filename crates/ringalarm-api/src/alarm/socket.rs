// Single alarm socket lifecycle.
//
// `open` dials the websocket, waits for the Engine.IO open packet and the
// Socket.IO connect packet, then hands the stream to a pump task. The
// pump owns both halves: it writes outbound frames, keeps the Engine.IO
// heartbeat, and forwards inbound events. A peer silent for longer than
// the advertised ping interval plus ping timeout is treated as gone. The
// pump never reconnects; loss is
// reported once on the inbound channel and the manager decides what next.

use std::time::Duration;

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{self, ClientRequestBuilder, Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use url::Url;

use crate::error::Error;
use crate::socketio::{self, Frame, Handshake, Packet};

/// Instructions for the pump.
#[derive(Debug)]
pub(crate) enum Outbound {
    /// A pre-encoded Socket.IO event frame.
    Emit(String),
    /// Send `terminate`, disconnect from the namespace, close the socket.
    Terminate,
}

/// What the pump reports back.
#[derive(Debug)]
pub(crate) enum Inbound {
    Event { name: String, payload: Value },
    Lost(String),
}

pub(crate) struct SocketChannels {
    pub(crate) outbound: mpsc::UnboundedSender<Outbound>,
    pub(crate) inbound: mpsc::UnboundedReceiver<Inbound>,
}

/// Build `<scheme>://<server>/socket.io/?authcode=..&EIO=3&transport=websocket`.
pub(crate) fn socket_url(scheme: &str, server: &str, auth_code: &str) -> Result<Url, Error> {
    let mut url = Url::parse(&format!("{scheme}://{server}/socket.io/"))?;
    url.query_pairs_mut()
        .append_pair("authcode", auth_code)
        .append_pair("EIO", "3")
        .append_pair("transport", "websocket");
    Ok(url)
}

/// Dial, complete the Socket.IO handshake, and start the pump.
pub(crate) async fn open(
    url: &Url,
    handshake_timeout: Duration,
    cancel: CancellationToken,
) -> Result<SocketChannels, Error> {
    // Log without the query string: it carries the one-time auth code.
    debug!(host = url.host_str().unwrap_or_default(), "connecting to websocket");

    let uri: tungstenite::http::Uri = url
        .as_str()
        .parse()
        .map_err(|e: tungstenite::http::uri::InvalidUri| Error::Protocol(e.to_string()))?;

    let dial = tokio_tungstenite::connect_async(ClientRequestBuilder::new(uri));
    let (ws_stream, _response) = tokio::time::timeout(handshake_timeout, dial)
        .await
        .map_err(|_| Error::Protocol("connect timeout".into()))?
        .map_err(|e| Error::Protocol(format!("connect error: {e}")))?;

    let (mut write, mut read) = ws_stream.split();

    let handshake = tokio::time::timeout(handshake_timeout, await_connect(&mut write, &mut read))
        .await
        .map_err(|_| Error::Protocol("connect timeout".into()))??;

    info!(sid = %handshake.sid, "connected to websocket");

    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    tokio::spawn(pump(
        write,
        read,
        handshake.ping_interval(),
        handshake.liveness_window(),
        outbound_rx,
        inbound_tx,
        cancel,
    ));

    Ok(SocketChannels {
        outbound: outbound_tx,
        inbound: inbound_rx,
    })
}

/// Read until the namespace connect packet arrives.
async fn await_connect<W, R>(write: &mut W, read: &mut R) -> Result<Handshake, Error>
where
    W: Sink<Message, Error = tungstenite::Error> + Unpin,
    R: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    let mut handshake = Handshake::default();
    loop {
        let text = match read.next().await {
            Some(Ok(Message::Text(text))) => text,
            Some(Ok(Message::Close(_))) | None => {
                return Err(Error::Protocol("socket closed during handshake".into()));
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(Error::Protocol(format!("connect error: {e}"))),
        };

        match socketio::decode(&text)? {
            Frame::Open(open) => handshake = open,
            Frame::Message(Packet::Connect) => return Ok(handshake),
            Frame::Message(Packet::Error(reason)) => {
                return Err(Error::Protocol(format!("connect rejected: {reason}")));
            }
            Frame::Ping(data) => {
                write
                    .send(Message::text(format!("{}{data}", socketio::PONG)))
                    .await
                    .map_err(|e| Error::Protocol(e.to_string()))?;
            }
            other => trace!(?other, "ignoring frame during handshake"),
        }
    }
}

async fn pump<W, R>(
    mut write: W,
    mut read: R,
    ping_interval: Duration,
    liveness_window: Duration,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    inbound: mpsc::UnboundedSender<Inbound>,
    cancel: CancellationToken,
) where
    W: Sink<Message, Error = tungstenite::Error> + Unpin,
    R: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    let mut heartbeat =
        tokio::time::interval_at(tokio::time::Instant::now() + ping_interval, ping_interval);
    let liveness = tokio::time::sleep(liveness_window);
    tokio::pin!(liveness);

    let reason = loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                let _ = write.send(Message::Close(None)).await;
                return;
            }
            command = outbound.recv() => match command {
                Some(Outbound::Emit(frame)) => {
                    if let Err(e) = write.send(Message::text(frame)).await {
                        break format!("send failed: {e}");
                    }
                }
                Some(Outbound::Terminate) | None => {
                    terminate(&mut write).await;
                    return;
                }
            },
            _ = heartbeat.tick() => {
                if let Err(e) = write.send(Message::text(socketio::PING)).await {
                    break format!("heartbeat failed: {e}");
                }
            }
            () = &mut liveness => break "ping timeout".to_owned(),
            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    liveness
                        .as_mut()
                        .reset(tokio::time::Instant::now() + liveness_window);
                    match socketio::decode(&text) {
                        Ok(Frame::Message(Packet::Event { name, payload })) => {
                            if inbound.send(Inbound::Event { name, payload }).is_err() {
                                // Manager gone; nobody left to deliver to.
                                terminate(&mut write).await;
                                return;
                            }
                        }
                        Ok(Frame::Ping(data)) => {
                            let _ = write.send(Message::text(format!("{}{data}", socketio::PONG))).await;
                        }
                        Ok(Frame::Message(Packet::Disconnect) | Frame::Close) => {
                            break "server disconnect".to_owned();
                        }
                        Ok(Frame::Message(Packet::Error(reason))) => {
                            break format!("server error: {reason}");
                        }
                        Ok(other) => trace!(?other, "ignoring frame"),
                        Err(e) => debug!(error = %e, "unparseable socket frame"),
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    break frame.map_or_else(
                        || "websocket closed".to_owned(),
                        |cf| format!("websocket closed (code {}): {}", cf.code, cf.reason),
                    );
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => break format!("transport error: {e}"),
                None => break "websocket closed".to_owned(),
            }
        }
    };

    warn!(%reason, "alarm socket lost");
    let _ = inbound.send(Inbound::Lost(reason));
}

async fn terminate<W>(write: &mut W)
where
    W: Sink<Message, Error = tungstenite::Error> + Unpin,
{
    let frames = [
        socketio::encode_event("terminate", &json!({})),
        socketio::DISCONNECT.to_owned(),
    ];
    for frame in frames {
        if write.send(Message::text(frame)).await.is_err() {
            return;
        }
    }
    let _ = write.send(Message::Close(None)).await;
    debug!("alarm socket terminated");
}
