use std::sync::Arc;

use engine_logging::{engine_info, engine_warn};
use stream_core::{Effect, Msg, StartMode, TargetId, Vocabulary};
use stream_engine::{forward_session, SessionController, StreamRequest};
use tokio::sync::mpsc;

/// Builds the stream request for a target each time one is opened.
pub type RequestFactory = Box<dyn Fn(&TargetId) -> StreamRequest + Send + Sync>;

/// Carries out state machine effects against the session controller and
/// feeds session items back as messages.
pub struct EffectRunner<V: Vocabulary> {
    controller: Arc<SessionController<V>>,
    requests: RequestFactory,
    msg_tx: mpsc::UnboundedSender<Msg<V>>,
}

impl<V: Vocabulary> EffectRunner<V> {
    pub fn new(
        controller: Arc<SessionController<V>>,
        requests: RequestFactory,
        msg_tx: mpsc::UnboundedSender<Msg<V>>,
    ) -> Self {
        Self {
            controller,
            requests,
            msg_tx,
        }
    }

    /// Must be called from within the tokio runtime.
    pub fn run(&self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::OpenStream { entity_id, target } => {
                    let request = (self.requests)(&target);
                    engine_info!("OpenStream entity={} target={}", entity_id, target);
                    // Replacement was already decided by the state machine,
                    // which emits the abort ahead of this open.
                    match self.controller.start(target, request, StartMode::Reject) {
                        Ok(handle) => {
                            tokio::spawn(forward_session(handle, entity_id, self.msg_tx.clone()));
                        }
                        Err(err) => {
                            engine_warn!("Could not open stream for entity {}: {}", entity_id, err);
                            let _ = self.msg_tx.send(Msg::TransportFailed {
                                entity_id,
                                message: err.to_string(),
                            });
                        }
                    }
                }
                Effect::AbortStream { entity_id, target } => {
                    engine_info!("AbortStream entity={} target={}", entity_id, target);
                    self.controller.cancel(&target);
                }
            }
        }
    }
}
