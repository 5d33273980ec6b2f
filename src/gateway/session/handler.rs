use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc::UnboundedSender;
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::{debug, info, warn};

use super::{MixerInner, types::ConnectionStatus};
use crate::{
    gateway::auth::create_auth_string,
    protocol::{
        EVENT_SUBSCRIPTION_ALL, Envelope, EventMessage, Hello, Identified, Identify, MixerEvent,
        MixerOp, RequestResponse,
    },
};

/// Per-socket message handling for the mixer connection.
pub struct SessionHandler<'a> {
    inner: &'a MixerInner,
    tx: UnboundedSender<Message>,
}

impl<'a> SessionHandler<'a> {
    pub(crate) fn new(inner: &'a MixerInner, tx: UnboundedSender<Message>) -> Self {
        Self { inner, tx }
    }

    pub fn handle_text(&mut self, text: &str) {
        let envelope = match Envelope::parse(text) {
            Ok(e) => e,
            Err(e) => {
                warn!("Dropping mixer message: {} - Text: {}", e, text);
                return;
            }
        };

        let op = match MixerOp::try_from(envelope.op) {
            Ok(op) => op,
            Err(code) => {
                debug!("Ignoring mixer op {}", code);
                return;
            }
        };

        let handled = match op {
            MixerOp::Hello => envelope
                .payload::<Hello>()
                .map(|hello| self.handle_hello(hello)),
            MixerOp::Identified => envelope
                .payload::<Identified>()
                .map(|identified| self.handle_identified(identified)),
            MixerOp::Event => envelope
                .payload::<EventMessage>()
                .map(|event| self.handle_event(event)),
            MixerOp::RequestResponse => envelope
                .payload::<RequestResponse>()
                .map(|response| self.handle_response(response)),
            MixerOp::RequestBatchResponse => {
                debug!("Discarding batch response: {}", envelope.d);
                Ok(())
            }
            other => {
                debug!("Unexpected mixer op {}", other);
                Ok(())
            }
        };

        if let Err(e) = handled {
            warn!("Dropping malformed {} payload: {}", op.as_str(), e);
        }
    }

    fn handle_hello(&mut self, hello: Hello) {
        self.inner.set_status(ConnectionStatus::Authenticating);

        let authentication = hello.authentication.map(|auth| {
            if self.inner.config.password.is_empty() {
                warn!("Mixer requires a password but none is configured");
            }
            create_auth_string(&self.inner.config.password, &auth.salt, &auth.challenge)
        });

        debug!(
            "Hello from mixer {} (rpc {}), auth required: {}",
            hello.obs_web_socket_version.as_deref().unwrap_or("?"),
            hello.rpc_version,
            authentication.is_some()
        );

        self.send(
            MixerOp::Identify,
            &Identify {
                rpc_version: hello.rpc_version,
                authentication,
                event_subscriptions: EVENT_SUBSCRIPTION_ALL,
            },
        );
    }

    fn handle_identified(&mut self, identified: Identified) {
        if let Some(state) = self.inner.link.write().as_mut() {
            state.identified = true;
        }
        info!(
            "Identified with mixer (rpc {})",
            identified.negotiated_rpc_version
        );
        self.inner.set_status(ConnectionStatus::Ready);
    }

    fn handle_event(&mut self, event: EventMessage) {
        debug!("<- event {}", event.event_type);
        let _ = self.inner.events_tx.send(MixerEvent {
            event_type: event.event_type,
            event_data: event
                .event_data
                .unwrap_or_else(|| Value::Object(Default::default())),
        });
    }

    fn handle_response(&mut self, response: RequestResponse) {
        let pending = match self.inner.link.read().as_ref() {
            Some(state) => state.pending.clone(),
            None => return,
        };

        let id = response.request_id.clone();
        let request_type = response.request_type.clone();
        if !response.request_status.result {
            debug!(
                "{} failed: {} {}",
                request_type,
                response.request_status.code,
                response.request_status.comment.as_deref().unwrap_or("")
            );
        }

        if !pending.resolve(&id, response.into_result()) {
            debug!("Dropping response for untracked {} ({})", request_type, id);
        }
    }

    fn send<T: Serialize>(&self, op: MixerOp, payload: &T) {
        match Envelope::new(op, payload).and_then(|e| e.to_json()) {
            Ok(json) => {
                if self.tx.send(Message::Text(json.into())).is_err() {
                    debug!("Mixer writer closed before {} was sent", op.as_str());
                }
            }
            Err(e) => warn!("Failed to encode {}: {}", op.as_str(), e),
        }
    }
}
