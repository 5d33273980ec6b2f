//! Lighting console link: OSC over a persistent TCP connection.

use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use futures::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use tokio::{
    net::TcpStream,
    sync::{mpsc, watch},
    task::JoinHandle,
};
use tokio_util::{codec::Framed, sync::CancellationToken};
use tracing::{debug, info, warn};

use crate::{
    common::{
        errors::{ControlError, ControlResult},
        multimap::MultiMap,
        types::CueNumber,
    },
    configs::LightingConfig,
    gateway::{ConnectionStatus, session::types::SessionOutcome},
    protocol::{OscArg, OscCodec, OscMessage},
};

pub mod address;
pub mod constants;

pub use address::Target;

/// Invoked with the fired cue and the list it belongs to.
pub type CueCallback = Arc<dyn Fn(&CueNumber, u32) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct CueSubscription {
    id: SubscriptionId,
    callback: CueCallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CueListFilter {
    list: u32,
    enabled: bool,
}

pub(crate) struct LinkState {
    tx: mpsc::UnboundedSender<OscMessage>,
}

struct LightingInner {
    config: LightingConfig,
    filter: RwLock<CueListFilter>,
    status_tx: watch::Sender<ConnectionStatus>,
    link: RwLock<Option<LinkState>>,
    callbacks: Mutex<MultiMap<CueNumber, CueSubscription>>,
    next_subscription: AtomicU64,
    cancel_token: CancellationToken,
}

impl Drop for LightingInner {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

/// Handle to the lighting console. Cheap to clone.
#[derive(Clone)]
pub struct LightingClient {
    inner: Arc<LightingInner>,
}

impl LightingClient {
    pub fn new(config: LightingConfig) -> Self {
        let (status_tx, _) = watch::channel(ConnectionStatus::Disconnected);
        let filter = CueListFilter {
            list: config.cue_list,
            enabled: config.filter_cue_list,
        };
        Self {
            inner: Arc::new(LightingInner {
                config,
                filter: RwLock::new(filter),
                status_tx,
                link: RwLock::new(None),
                callbacks: Mutex::new(MultiMap::new()),
                next_subscription: AtomicU64::new(1),
                cancel_token: CancellationToken::new(),
            }),
        }
    }

    pub fn spawn(&self) -> JoinHandle<()> {
        let client = self.clone();
        tokio::spawn(async move { client.run().await })
    }

    pub fn shutdown(&self) {
        self.inner.cancel_token.cancel();
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.inner.status_tx.borrow()
    }

    pub fn status_changes(&self) -> watch::Receiver<ConnectionStatus> {
        self.inner.status_tx.subscribe()
    }

    pub async fn ready(&self) {
        let mut rx = self.status_changes();
        let _ = rx.wait_for(|s| *s == ConnectionStatus::Ready).await;
    }

    pub fn cue_list(&self) -> u32 {
        self.inner.filter.read().list
    }

    /// Changes the list fires target and, when `filter` is set, the only
    /// list whose cue notifications are dispatched.
    pub fn set_cue_list(&self, list: u32, filter: bool) {
        *self.inner.filter.write() = CueListFilter {
            list,
            enabled: filter,
        };
        info!("Cue list set to {} (filtering: {})", list, filter);
    }

    /// Registers `callback` for every fire of `cue`. Callbacks for the same
    /// cue run in registration order.
    pub fn on_cue<F>(&self, cue: CueNumber, callback: F) -> SubscriptionId
    where
        F: Fn(&CueNumber, u32) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.inner.next_subscription.fetch_add(1, Ordering::Relaxed));
        self.inner.callbacks.lock().insert(
            cue,
            CueSubscription {
                id,
                callback: Arc::new(callback),
            },
        );
        id
    }

    pub fn off_cue(&self, id: SubscriptionId) -> bool {
        self.inner.callbacks.lock().retire(|s| s.id == id) > 0
    }

    /// Sends a message as-is. Fails when the console is not connected;
    /// nothing is queued for later.
    pub fn send(&self, message: OscMessage) -> ControlResult<()> {
        let link = self.inner.link.read();
        let Some(state) = link.as_ref() else {
            return Err(ControlError::connection(format!(
                "lighting console offline, dropped {}",
                message.address
            )));
        };
        debug!("-> {} {:?}", message.address, message.args);
        state
            .tx
            .send(message)
            .map_err(|e| ControlError::connection(format!("writer closed, dropped {}", e.0.address)))
    }

    /// Sends to `address`, rooted at `/eos` when it is not already.
    pub fn command(&self, address: &str, args: Vec<OscArg>) -> ControlResult<()> {
        self.send(OscMessage::new(address::with_prefix(address), args))
    }

    pub fn fire_cue(&self, cue: &CueNumber) -> ControlResult<()> {
        info!("Firing cue {}", cue);
        self.send(OscMessage::new(
            address::fire_address(self.cue_list(), cue),
            vec![],
        ))
    }

    pub fn record_cue(&self, cue: &CueNumber, label: Option<&str>) -> ControlResult<()> {
        info!("Recording cue {}", cue);
        self.command(
            "/cmd",
            vec![OscArg::Str(address::record_command(cue, label))],
        )
    }

    /// Sets a channel's intensity, 0 to 100.
    pub fn intensity(&self, channel: u32, level: i32) -> ControlResult<()> {
        self.send(OscMessage::new(
            address::intensity_address(channel),
            vec![OscArg::Int(level)],
        ))
    }

    /// Sets RGB as percentages, 0 to 100 each.
    pub fn color(&self, target: Target, red: i32, green: i32, blue: i32) -> ControlResult<()> {
        self.send(OscMessage::new(
            address::color_address(target),
            vec![OscArg::Int(red), OscArg::Int(green), OscArg::Int(blue)],
        ))
    }

    pub fn param(&self, target: Target, param: &str, value: impl Into<OscArg>) -> ControlResult<()> {
        self.send(OscMessage::new(
            address::param_address(target, param),
            vec![value.into()],
        ))
    }

    fn dispatch(&self, message: &OscMessage) {
        let Some((list, cue)) = address::parse_cue_fire(&message.address) else {
            debug!("<- {} {:?}", message.address, message.args);
            return;
        };

        let filter = *self.inner.filter.read();
        if filter.enabled && list != filter.list {
            debug!("Ignoring cue {} on list {}", cue, list);
            return;
        }

        let callbacks: Vec<CueCallback> = self
            .inner
            .callbacks
            .lock()
            .get(&cue)
            .iter()
            .map(|s| s.callback.clone())
            .collect();

        info!("Cue {}/{} fired ({} listeners)", list, cue, callbacks.len());
        for callback in callbacks {
            callback(&cue, list);
        }
    }

    async fn run(self) {
        let delay = self.inner.config.reconnect_delay();
        let addr = self.inner.config.addr();

        loop {
            if self.inner.cancel_token.is_cancelled() {
                break;
            }

            self.inner.status_tx.send_replace(ConnectionStatus::Connecting);
            let outcome = self.connect(&addr).await;

            self.inner.link.write().take();
            self.inner.status_tx.send_replace(ConnectionStatus::Disconnected);

            match outcome {
                Ok(SessionOutcome::Shutdown) => break,
                Ok(SessionOutcome::Reconnect) => {
                    info!("Lighting console connection lost, reconnecting in {:?}", delay);
                }
                Err(e) => {
                    warn!("Lighting console {}: {}. Retrying in {:?}", addr, e, delay);
                }
            }

            tokio::select! {
                _ = self.inner.cancel_token.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn connect(&self, addr: &str) -> ControlResult<SessionOutcome> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| ControlError::connection(e.to_string()))?;
        let _ = stream.set_nodelay(true);
        info!("Connected to lighting console at {}", addr);

        let (mut sink, mut frames) = Framed::new(stream, OscCodec).split();
        let (tx, mut rx) = mpsc::unbounded_channel::<OscMessage>();
        *self.inner.link.write() = Some(LinkState { tx });
        self.inner.status_tx.send_replace(ConnectionStatus::Ready);

        let writer_token = self.inner.cancel_token.child_token();
        let write_task = tokio::spawn({
            let token = writer_token.clone();
            async move {
                loop {
                    tokio::select! {
                        _ = token.cancelled() => break,
                        msg = rx.recv() => {
                            let Some(msg) = msg else { break };
                            if let Err(e) = sink.send(msg).await {
                                warn!("Lighting console write error: {}", e);
                                break;
                            }
                        }
                    }
                }
                token.cancel();
            }
        });

        let outcome = loop {
            tokio::select! {
                _ = self.inner.cancel_token.cancelled() => break SessionOutcome::Shutdown,
                frame = frames.next() => match frame {
                    Some(Ok(Ok(message))) => self.dispatch(&message),
                    Some(Ok(Err(e))) => warn!("Dropping malformed console frame: {}", e),
                    Some(Err(e)) => {
                        warn!("Lighting console stream error: {}", e);
                        break SessionOutcome::Reconnect;
                    }
                    None => {
                        debug!("Lighting console closed the stream");
                        break SessionOutcome::Reconnect;
                    }
                },
                _ = writer_token.cancelled() => break SessionOutcome::Reconnect,
            }
        };

        writer_token.cancel();
        let _ = tokio::time::timeout(Duration::from_millis(500), write_task).await;
        Ok(outcome)
    }
}
