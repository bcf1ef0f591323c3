//! Authenticated, reconnecting, full-duplex socket RPC multiplexer (§4.1).
//!
//! One background task owns the socket for the lifetime of the client.
//! Callers correlate replies to requests purely by `requestId`, the same
//! `Op` + `oneshot` handoff `reconnecting_rpc_client`'s `Client` uses;
//! unlike that client this one carries no subscription concept — inbound
//! packets that are not a `response`/`processingError` are republished on a
//! broadcast channel for `StreamingConnection` to consume.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use rand::distr::Alphanumeric;
use rand::Rng;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, oneshot, Notify};
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use crate::config::TransportConfig;
use crate::error::SdkError;

use super::codec::rehydrate_timestamps;
use super::packets::{build_request_payload, event_type, packet_request_id, packet_type};
use super::reconnect::ReconnectPolicy;

/// Capacity of the broadcast channel carrying decoded event packets.
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// A decoded inbound packet that was not a `response`/`processingError` —
/// i.e. an event, republished to every subscriber.
pub type InboundEvent = Value;

fn generate_request_id() -> String {
    rand::rng().sample_iter(Alphanumeric).take(32).map(char::from).collect()
}

enum Op {
    Request {
        packet_type: String,
        account_id: String,
        payload: Value,
        reply: oneshot::Sender<Result<Value, SdkError>>,
    },
}

/// The reconnecting socket multiplexer (§4.1).
pub struct TransportClient {
    config: TransportConfig,
    op_tx: mpsc::UnboundedSender<Op>,
    op_rx: Mutex<Option<mpsc::UnboundedReceiver<Op>>>,
    event_tx: broadcast::Sender<InboundEvent>,
    connected: Arc<Notify>,
    is_connected: Arc<AtomicBool>,
    started: AtomicBool,
    cancel: CancellationToken,
}

impl TransportClient {
    /// Build a client. No socket is opened until [`Self::connect`] is
    /// called.
    #[must_use]
    pub fn new(config: TransportConfig) -> Self {
        let (op_tx, op_rx) = mpsc::unbounded_channel();
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            config,
            op_tx,
            op_rx: Mutex::new(Some(op_rx)),
            event_tx,
            connected: Arc::new(Notify::new()),
            is_connected: Arc::new(AtomicBool::new(false)),
            started: AtomicBool::new(false),
            cancel: CancellationToken::new(),
        }
    }

    /// Open the channel. Resolves on first successful handshake;
    /// subsequent calls are idempotent no-ops (§4.1).
    pub async fn connect(&self) -> Result<(), SdkError> {
        if self.started.swap(true, Ordering::SeqCst) {
            let notified = self.connected.notified();
            if self.is_connected.load(Ordering::SeqCst) {
                return Ok(());
            }
            notified.await;
            return Ok(());
        }

        let op_rx = self
            .op_rx
            .lock()
            .take()
            .expect("connect() only takes the receiver once, guarded by `started`");

        let notified = self.connected.notified();

        tokio::spawn(background_task(
            self.config.clone(),
            op_rx,
            self.event_tx.clone(),
            Arc::clone(&self.connected),
            Arc::clone(&self.is_connected),
            self.cancel.clone(),
        ));

        notified.await;
        Ok(())
    }

    /// Stop the reconnect loop and reject every outstanding request future.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    /// Whether the socket is currently connected (not merely desired).
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.is_connected.load(Ordering::SeqCst)
    }

    /// Subscribe to decoded event packets (everything except
    /// `response`/`processingError`, which are routed directly to
    /// [`Self::request`] callers).
    #[must_use]
    pub fn events(&self) -> broadcast::Receiver<InboundEvent> {
        self.event_tx.subscribe()
    }

    /// Send a request packet and await its correlated reply (§4.1).
    ///
    /// # Errors
    ///
    /// Returns [`SdkError::Timeout`] if no reply arrives within the
    /// configured request timeout, [`SdkError::NotConnected`] if the
    /// client has been closed, or whatever typed error the server reports
    /// on a `processingError` packet.
    pub async fn request(&self, packet_type: &str, account_id: &str, payload: Value) -> Result<Value, SdkError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.op_tx
            .send(Op::Request {
                packet_type: packet_type.to_string(),
                account_id: account_id.to_string(),
                payload,
                reply: reply_tx,
            })
            .map_err(|_| SdkError::NotConnected {
                message: "transport is closed".to_string(),
            })?;

        match timeout(self.config.request_timeout, reply_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(SdkError::NotConnected {
                message: "connection closed before a reply arrived".to_string(),
            }),
            Err(_) => Err(SdkError::Timeout {
                message: format!("request timed out after {:?}", self.config.request_timeout),
            }),
        }
    }
}

#[allow(clippy::too_many_lines)]
async fn background_task(
    config: TransportConfig,
    mut op_rx: mpsc::UnboundedReceiver<Op>,
    event_tx: broadcast::Sender<InboundEvent>,
    connected: Arc<Notify>,
    is_connected: Arc<AtomicBool>,
    cancel: CancellationToken,
) {
    let mut reconnect = ReconnectPolicy::new(config.reconnect);
    let mut pending: HashMap<String, oneshot::Sender<Result<Value, SdkError>>> = HashMap::new();

    loop {
        if cancel.is_cancelled() {
            break;
        }

        let url = config.socket_url();
        let stream = match connect_async(url).await {
            Ok((stream, _)) => stream,
            Err(err) => {
                tracing::warn!(error = %err, "transport connect failed");
                is_connected.store(false, Ordering::SeqCst);
                match reconnect.next_backoff() {
                    Some(backoff) => {
                        tokio::select! {
                            () = tokio::time::sleep(backoff) => continue,
                            () = cancel.cancelled() => break,
                        }
                    }
                    None => break,
                }
            }
        };

        reconnect.reset();
        is_connected.store(true, Ordering::SeqCst);
        connected.notify_one();
        tracing::info!("transport connected");

        let (mut write, mut read) = stream.split();

        loop {
            tokio::select! {
                op = op_rx.recv() => {
                    match op {
                        Some(Op::Request { packet_type, account_id, payload, reply }) => {
                            let request_id = generate_request_id();
                            let outbound = build_request_payload(&packet_type, &request_id, &account_id, payload);
                            pending.insert(request_id, reply);
                            if let Err(err) = write.send(Message::Text(outbound.to_string().into())).await {
                                tracing::warn!(error = %err, "transport send failed");
                                break;
                            }
                        }
                        None => {
                            cancel.cancel();
                            break;
                        }
                    }
                }
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            match serde_json::from_str::<Value>(&text) {
                                Ok(mut value) => {
                                    rehydrate_timestamps(&mut value);
                                    if dispatch_inbound(&value, &mut pending, &event_tx) {
                                        tracing::warn!("unauthorized error received, tearing down transport");
                                        cancel.cancel();
                                        let _ = write.send(Message::Close(None)).await;
                                        break;
                                    }
                                }
                                Err(err) => tracing::warn!(error = %err, "malformed packet"),
                            }
                        }
                        Some(Ok(Message::Ping(data))) => {
                            let _ = write.send(Message::Pong(data)).await;
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            tracing::info!("transport connection closed by peer");
                            break;
                        }
                        Some(Err(err)) => {
                            tracing::warn!(error = %err, "transport read failed");
                            break;
                        }
                        _ => {}
                    }
                }
                () = cancel.cancelled() => {
                    let _ = write.send(Message::Close(None)).await;
                    break;
                }
            }
        }

        is_connected.store(false, Ordering::SeqCst);

        if cancel.is_cancelled() {
            break;
        }
    }

    for (_, reply) in pending.drain() {
        let _ = reply.send(Err(SdkError::NotConnected {
            message: "connection closed".to_string(),
        }));
    }
}

/// Decodes one inbound packet, routing it to its correlated request future or
/// republishing it as an event. Returns `true` if the packet carried a fatal
/// error ([`SdkError::is_fatal`]) and the caller should tear down the socket
/// (§7: `UnauthorizedError` both surfaces to the caller and closes the
/// transport).
fn dispatch_inbound(
    value: &Value,
    pending: &mut HashMap<String, oneshot::Sender<Result<Value, SdkError>>>,
    event_tx: &broadcast::Sender<InboundEvent>,
) -> bool {
    let Some(kind) = packet_type(value) else {
        return false;
    };

    match kind {
        event_type::RESPONSE => {
            if let Some(request_id) = packet_request_id(value) {
                if let Some(reply) = pending.remove(request_id) {
                    let _ = reply.send(Ok(value.clone()));
                }
            }
            false
        }
        event_type::PROCESSING_ERROR => {
            let name = value.get("error").and_then(Value::as_str).unwrap_or("ApiError");
            let message = value.get("message").and_then(Value::as_str).unwrap_or_default();
            let error = SdkError::from_server(name, message);
            let fatal = error.is_fatal();
            if let Some(request_id) = packet_request_id(value) {
                if let Some(reply) = pending.remove(request_id) {
                    let _ = reply.send(Err(error));
                }
            }
            fatal
        }
        _ => {
            let _ = event_tx.send(value.clone());
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn generate_request_id_is_32_alphanumeric_chars() {
        let id = generate_request_id();
        assert_eq!(id.len(), 32);
        assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn generate_request_id_is_not_constant() {
        assert_ne!(generate_request_id(), generate_request_id());
    }

    #[test]
    fn dispatch_inbound_resolves_matching_response() {
        let mut pending = HashMap::new();
        let (tx, rx) = oneshot::channel();
        pending.insert("req1".to_string(), tx);
        let (event_tx, _) = broadcast::channel(8);

        let packet = json!({"type": "response", "requestId": "req1", "accountInformation": {}});
        dispatch_inbound(&packet, &mut pending, &event_tx);

        assert!(pending.is_empty());
        assert!(rx.try_recv().unwrap().is_ok());
    }

    #[test]
    fn dispatch_inbound_converts_processing_error_to_typed_error() {
        let mut pending = HashMap::new();
        let (tx, rx) = oneshot::channel();
        pending.insert("req1".to_string(), tx);
        let (event_tx, _) = broadcast::channel(8);

        let packet = json!({
            "type": "processingError",
            "requestId": "req1",
            "error": "NotFoundError",
            "message": "no such order",
        });
        let fatal = dispatch_inbound(&packet, &mut pending, &event_tx);

        assert!(!fatal);
        let result = rx.try_recv().unwrap();
        assert!(matches!(result, Err(SdkError::NotFound { .. })));
    }

    #[test]
    fn dispatch_inbound_flags_unauthorized_as_fatal() {
        let mut pending = HashMap::new();
        let (tx, rx) = oneshot::channel();
        pending.insert("req1".to_string(), tx);
        let (event_tx, _) = broadcast::channel(8);

        let packet = json!({
            "type": "processingError",
            "requestId": "req1",
            "error": "UnauthorizedError",
            "message": "bad token",
        });
        let fatal = dispatch_inbound(&packet, &mut pending, &event_tx);

        assert!(fatal);
        let result = rx.try_recv().unwrap();
        assert!(matches!(result, Err(SdkError::Unauthorized { .. })));
    }

    #[test]
    fn dispatch_inbound_republishes_events_to_broadcast_channel() {
        let mut pending = HashMap::new();
        let (event_tx, mut event_rx) = broadcast::channel(8);

        let packet = json!({"type": "accountInformation", "accountInformation": {}});
        dispatch_inbound(&packet, &mut pending, &event_tx);

        let received = event_rx.try_recv().unwrap();
        assert_eq!(received["type"], "accountInformation");
    }

    #[test]
    fn dispatch_inbound_ignores_unmatched_request_id() {
        let mut pending = HashMap::new();
        let (event_tx, mut event_rx) = broadcast::channel(8);

        let packet = json!({"type": "response", "requestId": "unknown"});
        dispatch_inbound(&packet, &mut pending, &event_tx);

        assert!(pending.is_empty());
        assert!(event_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn request_times_out_when_nothing_ever_replies() {
        let mut config = TransportConfig::new("example.invalid", "token");
        config.request_timeout = std::time::Duration::from_millis(50);
        // `connect()` is deliberately never called: the request is queued
        // on the internal channel but nothing drains it, so the timeout
        // is what ends the wait, exactly as it would if the socket were
        // stuck reconnecting.
        let client = TransportClient::new(config);

        let result = client.request("getAccountInformation", "acct", Value::Null).await;
        assert!(matches!(result, Err(SdkError::Timeout { .. })));
    }
}
