use tokio::sync::mpsc;

use stream_core::{EntityId, Msg, Vocabulary};

use crate::{SessionEvent, SessionHandle};

impl<E> SessionEvent<E> {
    /// Translates a session item into the state machine message for `entity_id`.
    pub fn into_msg<V: Vocabulary<Event = E>>(self, entity_id: EntityId) -> Msg<V> {
        match self {
            SessionEvent::Event(event) => Msg::Event { entity_id, event },
            SessionEvent::Closed { graceful } => Msg::TransportClosed {
                entity_id,
                graceful,
            },
            SessionEvent::Failed(err) => Msg::TransportFailed {
                entity_id,
                message: err.to_string(),
            },
            SessionEvent::TimedOut => Msg::TimedOut { entity_id },
            SessionEvent::Cancelled => Msg::SessionCancelled { entity_id },
        }
    }
}

/// Drains a session into a message queue, in order, until it ends or the
/// queue is closed.
pub async fn forward_session<V: Vocabulary>(
    mut handle: SessionHandle<V>,
    entity_id: EntityId,
    msg_tx: mpsc::UnboundedSender<Msg<V>>,
) {
    while let Some(event) = handle.next_event().await {
        if msg_tx.send(event.into_msg(entity_id)).is_err() {
            handle.cancel();
            break;
        }
    }
}
