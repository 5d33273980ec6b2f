use std::{sync::Arc, time::Duration};

use futures::{SinkExt, StreamExt};
use parking_lot::RwLock;
use serde_json::Value;
use tokio::{
    sync::{broadcast, mpsc, watch},
    task::JoinHandle,
};
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    common::{errors::ControlResult, types::RequestId},
    configs::MixerConfig,
    gateway::constants::{EVENT_CHANNEL_CAPACITY, WRITE_TASK_SHUTDOWN_MS},
    protocol::{Envelope, MixerEvent, MixerOp, Request},
};

pub mod handler;
pub mod pending;
pub mod types;

use self::{
    handler::SessionHandler,
    types::{ConnectionState, ConnectionStatus, SessionOutcome, map_ws_err},
};

pub(crate) struct MixerInner {
    pub(crate) config: MixerConfig,
    pub(crate) status_tx: watch::Sender<ConnectionStatus>,
    pub(crate) events_tx: broadcast::Sender<MixerEvent>,
    pub(crate) link: RwLock<Option<ConnectionState>>,
    cancel_token: CancellationToken,
}

impl MixerInner {
    pub(crate) fn set_status(&self, status: ConnectionStatus) {
        self.status_tx.send_if_modified(|current| {
            if *current == status {
                return false;
            }
            debug!("Mixer status {} -> {}", current, status);
            *current = status;
            true
        });
    }
}

/// Handle to the video mixer connection. Cheap to clone; every clone talks
/// to the same socket.
#[derive(Clone)]
pub struct MixerClient {
    pub(crate) inner: Arc<MixerInner>,
}

impl MixerClient {
    pub fn new(config: MixerConfig) -> Self {
        let (status_tx, _) = watch::channel(ConnectionStatus::Disconnected);
        let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(MixerInner {
                config,
                status_tx,
                events_tx,
                link: RwLock::new(None),
                cancel_token: CancellationToken::new(),
            }),
        }
    }

    /// Starts the connect/reconnect loop on the runtime.
    pub fn spawn(&self) -> JoinHandle<()> {
        let client = self.clone();
        tokio::spawn(async move { client.run().await })
    }

    /// Stops the connection loop and closes the socket.
    pub fn shutdown(&self) {
        self.inner.cancel_token.cancel();
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.inner.status_tx.borrow()
    }

    pub fn status_changes(&self) -> watch::Receiver<ConnectionStatus> {
        self.inner.status_tx.subscribe()
    }

    /// Resolves once the client is identified. Returns immediately when it
    /// already is.
    pub async fn ready(&self) {
        let mut rx = self.status_changes();
        let _ = rx.wait_for(|s| *s == ConnectionStatus::Ready).await;
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MixerEvent> {
        self.inner.events_tx.subscribe()
    }

    pub fn response_timeout(&self) -> Duration {
        self.inner.config.response_timeout()
    }

    /// Sends a request and waits for its response data.
    ///
    /// `None` means unknown or failed: not ready, rejected by the mixer, no
    /// reply within the response timeout, or the socket dropped first.
    pub async fn request(&self, request_type: &str, request_data: Option<Value>) -> Option<Value> {
        let (tx, pending) = {
            let link = self.inner.link.read();
            match link.as_ref() {
                Some(state) if state.identified => (state.tx.clone(), state.pending.clone()),
                _ => {
                    debug!("Mixer not ready, {} resolves empty", request_type);
                    return None;
                }
            }
        };

        let request = Request {
            request_type: request_type.to_owned(),
            request_id: RequestId::generate(),
            request_data,
        };
        let guard = pending.register(request.request_id.clone(), request_type);

        let json = match Envelope::new(MixerOp::Request, &request).and_then(|e| e.to_json()) {
            Ok(json) => json,
            Err(e) => {
                warn!("Failed to encode {}: {}", request_type, e);
                return None;
            }
        };

        debug!("-> {} ({})", request_type, guard.id());
        if tx.send(Message::Text(json.into())).is_err() {
            debug!("Mixer writer gone, {} resolves empty", request_type);
            return None;
        }

        guard.wait(self.response_timeout()).await
    }

    async fn run(self) {
        let delay = self.inner.config.reconnect_delay();
        let url = self.inner.config.url();

        loop {
            if self.inner.cancel_token.is_cancelled() {
                break;
            }

            self.inner.set_status(ConnectionStatus::Connecting);
            let outcome = self.connect(&url).await;

            self.inner.link.write().take();
            self.inner.set_status(ConnectionStatus::Disconnected);

            match outcome {
                Ok(SessionOutcome::Shutdown) => {
                    debug!("Mixer connection shutting down cleanly");
                    break;
                }
                Ok(SessionOutcome::Reconnect) => {
                    info!("Mixer connection lost, reconnecting in {:?}", delay);
                }
                Err(e) => {
                    warn!("Mixer {}: {}. Retrying in {:?}", url, e, delay);
                }
            }

            tokio::select! {
                _ = self.inner.cancel_token.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.inner.set_status(ConnectionStatus::Disconnected);
    }

    async fn connect(&self, url: &str) -> ControlResult<SessionOutcome> {
        debug!("Connecting to mixer: {}", url);

        let (ws_stream, _) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(map_ws_err)?;
        let (mut write, mut read) = ws_stream.split();
        info!("Connected to mixer at {}", url);

        let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
        *self.inner.link.write() = Some(ConnectionState::new(tx.clone()));

        let session_token = self.inner.cancel_token.child_token();
        let writer_token = session_token.clone();
        let write_task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = writer_token.cancelled() => break,
                    msg = rx.recv() => {
                        let Some(msg) = msg else { break };
                        if let Err(e) = write.send(msg).await {
                            warn!("Mixer WS write error: {}", e);
                            break;
                        }
                    }
                }
            }
            let _ = write.close().await;
        });

        let mut handler = SessionHandler::new(&self.inner, tx.clone());

        let outcome = loop {
            tokio::select! {
                _ = self.inner.cancel_token.cancelled() => {
                    break SessionOutcome::Shutdown;
                }
                msg = read.next() => {
                    let msg = match msg {
                        Some(Ok(msg)) => msg,
                        Some(Err(e)) => {
                            warn!("Mixer WS read error: {}", e);
                            break SessionOutcome::Reconnect;
                        }
                        None => {
                            debug!("Mixer WS stream ended");
                            break SessionOutcome::Reconnect;
                        }
                    };

                    match msg {
                        Message::Text(text) => handler.handle_text(text.as_str()),
                        Message::Close(frame) => {
                            let (code, reason) = frame
                                .map(|cf| (u16::from(cf.code), cf.reason.to_string()))
                                .unwrap_or((1000, "No reason".into()));
                            info!("Mixer WS closed: code={}, reason='{}'", code, reason);
                            break SessionOutcome::Reconnect;
                        }
                        _ => {}
                    }
                }
            }
        };

        session_token.cancel();
        drop(handler);
        drop(tx);
        let _ = tokio::time::timeout(Duration::from_millis(WRITE_TASK_SHUTDOWN_MS), write_task).await;

        Ok(outcome)
    }
}

impl Drop for MixerInner {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::gateway::auth::create_auth_string;
    use serde_json::json;
    use tokio::net::{TcpListener, TcpStream};
    use tokio_tungstenite::{WebSocketStream, accept_async};

    pub(crate) type ServerSocket = WebSocketStream<TcpStream>;

    pub(crate) fn test_config(port: u16, password: &str) -> MixerConfig {
        MixerConfig {
            enabled: true,
            host: "127.0.0.1".into(),
            port,
            password: password.into(),
            reconnect_delay_ms: 50,
            response_timeout_ms: 200,
        }
    }

    pub(crate) async fn send(ws: &mut ServerSocket, value: Value) {
        ws.send(Message::Text(value.to_string().into())).await.unwrap();
    }

    pub(crate) async fn recv(ws: &mut ServerSocket) -> Value {
        loop {
            match ws.next().await.unwrap().unwrap() {
                Message::Text(text) => return serde_json::from_str(text.as_str()).unwrap(),
                Message::Close(_) => panic!("client closed"),
                _ => continue,
            }
        }
    }

    /// Accepts one client and runs the hello/identify exchange.
    pub(crate) async fn accept_identified(listener: &TcpListener) -> ServerSocket {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        send(&mut ws, json!({"op": 0, "d": {"rpcVersion": 1}})).await;
        let identify = recv(&mut ws).await;
        assert_eq!(identify["op"], 1);
        send(&mut ws, json!({"op": 2, "d": {"negotiatedRpcVersion": 1}})).await;
        ws
    }

    /// Replies to the next request with `data`, returning the request.
    pub(crate) async fn answer(ws: &mut ServerSocket, ok: bool, data: Value) -> Value {
        let request = recv(ws).await;
        assert_eq!(request["op"], 6);
        send(
            ws,
            json!({"op": 7, "d": {
                "requestType": request["d"]["requestType"],
                "requestId": request["d"]["requestId"],
                "requestStatus": {"result": ok, "code": if ok { 100 } else { 600 }},
                "responseData": data
            }}),
        )
        .await;
        request
    }

    pub(crate) async fn connected_pair() -> (MixerClient, ServerSocket) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let client = MixerClient::new(test_config(port, ""));
        client.spawn();
        let ws = accept_identified(&listener).await;
        tokio::time::timeout(Duration::from_secs(2), client.ready())
            .await
            .unwrap();
        (client, ws)
    }

    #[tokio::test]
    async fn authenticates_with_challenge() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let client = MixerClient::new(test_config(port, "abc"));
        client.spawn();

        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        send(
            &mut ws,
            json!({"op": 0, "d": {"rpcVersion": 1,
                "authentication": {"challenge": "C456", "salt": "S123"}}}),
        )
        .await;

        let identify = recv(&mut ws).await;
        assert_eq!(identify["op"], 1);
        assert_eq!(identify["d"]["rpcVersion"], 1);
        assert_eq!(identify["d"]["eventSubscriptions"], 2047);
        assert_eq!(
            identify["d"]["authentication"],
            create_auth_string("abc", "S123", "C456")
        );
        assert_eq!(client.status(), ConnectionStatus::Authenticating);

        send(&mut ws, json!({"op": 2, "d": {"negotiatedRpcVersion": 1}})).await;
        tokio::time::timeout(Duration::from_secs(2), client.ready())
            .await
            .unwrap();
        assert_eq!(client.status(), ConnectionStatus::Ready);
        client.shutdown();
    }

    #[tokio::test]
    async fn request_not_ready_resolves_empty() {
        let client = MixerClient::new(test_config(1, ""));
        assert_eq!(client.status(), ConnectionStatus::Disconnected);
        assert!(client.request("GetSceneList", None).await.is_none());
    }

    #[tokio::test]
    async fn request_correlates_response() {
        let (client, mut ws) = connected_pair().await;

        let pending = tokio::spawn({
            let client = client.clone();
            async move { client.request("GetCurrentProgramScene", None).await }
        });
        let request = answer(&mut ws, true, json!({"sceneName": "Stage"})).await;
        assert_eq!(request["d"]["requestType"], "GetCurrentProgramScene");
        assert!(request["d"]["requestId"].as_str().is_some_and(|id| !id.is_empty()));

        assert_eq!(pending.await.unwrap(), Some(json!({"sceneName": "Stage"})));
        client.shutdown();
    }

    #[tokio::test]
    async fn failed_and_unanswered_requests_resolve_empty() {
        let (client, mut ws) = connected_pair().await;

        let failed = tokio::spawn({
            let client = client.clone();
            async move { client.request("GetMediaInputStatus", None).await }
        });
        answer(&mut ws, false, Value::Null).await;
        assert_eq!(failed.await.unwrap(), None);

        let started = tokio::time::Instant::now();
        let unanswered = tokio::spawn({
            let client = client.clone();
            async move { client.request("GetSceneList", None).await }
        });
        let _ = recv(&mut ws).await;
        assert_eq!(unanswered.await.unwrap(), None);
        assert!(started.elapsed() >= Duration::from_millis(200));

        let link = client.inner.link.read();
        assert!(link.as_ref().unwrap().pending.is_empty());
        drop(link);
        client.shutdown();
    }

    #[tokio::test]
    async fn untracked_response_is_ignored() {
        let (client, mut ws) = connected_pair().await;
        send(
            &mut ws,
            json!({"op": 7, "d": {"requestType": "X", "requestId": "nobody",
                "requestStatus": {"result": true, "code": 100}}}),
        )
        .await;
        send(&mut ws, json!({"op": 9, "d": {"requestId": "batch", "results": []}})).await;

        let pending = tokio::spawn({
            let client = client.clone();
            async move { client.request("GetVersion", None).await }
        });
        answer(&mut ws, true, json!({"v": 1})).await;
        assert_eq!(pending.await.unwrap(), Some(json!({"v": 1})));
        client.shutdown();
    }

    #[tokio::test]
    async fn events_fan_out_to_subscribers() {
        let (client, mut ws) = connected_pair().await;
        let mut a = client.subscribe();
        let mut b = client.subscribe();

        send(
            &mut ws,
            json!({"op": 5, "d": {"eventType": "MediaInputPlaybackStarted",
                "eventIntent": 256, "eventData": {"inputName": "Intro"}}}),
        )
        .await;

        for rx in [&mut a, &mut b] {
            let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
                .await
                .unwrap()
                .unwrap();
            assert_eq!(event.event_type, "MediaInputPlaybackStarted");
            assert_eq!(event.input_name(), Some("Intro"));
        }
        client.shutdown();
    }

    #[tokio::test]
    async fn reconnects_after_close_and_orphans_requests() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let mut config = test_config(port, "");
        config.response_timeout_ms = 5_000;
        let client = MixerClient::new(config);
        client.spawn();

        let mut ws = accept_identified(&listener).await;
        tokio::time::timeout(Duration::from_secs(2), client.ready())
            .await
            .unwrap();

        let orphan = tokio::spawn({
            let client = client.clone();
            async move { client.request("GetSceneList", None).await }
        });
        let _ = recv(&mut ws).await;
        let started = tokio::time::Instant::now();
        drop(ws);

        assert_eq!(orphan.await.unwrap(), None);
        assert!(started.elapsed() < Duration::from_secs(5));

        let _ws = tokio::time::timeout(Duration::from_secs(2), accept_identified(&listener))
            .await
            .unwrap();
        tokio::time::timeout(Duration::from_secs(2), client.ready())
            .await
            .unwrap();
        client.shutdown();
    }

    #[tokio::test]
    async fn keeps_retrying_after_failed_handshakes() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let client = MixerClient::new(test_config(port, ""));
        let handle = client.spawn();

        let mut last = None;
        for _ in 0..4 {
            let (stream, _) = tokio::time::timeout(Duration::from_secs(2), listener.accept())
                .await
                .unwrap()
                .unwrap();
            drop(stream);
            if let Some(prev) = last.replace(tokio::time::Instant::now()) {
                assert!(prev.elapsed() >= Duration::from_millis(50));
            }
        }
        assert!(!handle.is_finished());
        assert_ne!(client.status(), ConnectionStatus::Ready);
        client.shutdown();
    }
}
