use engine_logging::{engine_debug, engine_info, engine_warn};

use crate::{
    Effect, ErrorInfo, ErrorOrigin, Msg, Outcome, StartMode, StreamState, TargetId, Vocabulary,
};

/// Pure update function: applies a message to state and returns any effects.
pub fn update<V: Vocabulary>(mut state: StreamState<V>, msg: Msg<V>) -> (StreamState<V>, Vec<Effect>) {
    let effects = match msg {
        Msg::StartRequested { target, mode } => start(&mut state, target, mode),
        Msg::CancelRequested { target } => {
            let Some(entity_id) = state.streaming_for(&target).map(|entity| entity.id()) else {
                // Already sealed or never started: cancelling is a no-op.
                return (state, Vec::new());
            };
            state.seal(entity_id, Outcome::Cancelled);
            vec![Effect::AbortStream { entity_id, target }]
        }
        Msg::RetryRequested { entity_id } => {
            let retryable = state
                .entity(entity_id)
                .filter(|entity| matches!(entity.outcome(), Some(Outcome::Error(_))))
                .map(|entity| entity.target().clone());
            let Some(target) = retryable else {
                return (state, Vec::new());
            };
            start(&mut state, target, StartMode::Reject)
        }
        Msg::Event { entity_id, event } => {
            if let Err(err) = state.apply_event(entity_id, &event) {
                engine_debug!("{} discarding event: {}", V::NAME, err);
            }
            Vec::new()
        }
        Msg::TransportClosed {
            entity_id,
            graceful,
        } => {
            let outcome = if graceful {
                Outcome::Done
            } else {
                Outcome::Error(ErrorInfo::new(
                    ErrorOrigin::Transport,
                    "stream closed before completion",
                ))
            };
            state.seal(entity_id, outcome);
            Vec::new()
        }
        Msg::TransportFailed { entity_id, message } => {
            state.seal(
                entity_id,
                Outcome::Error(ErrorInfo::new(ErrorOrigin::Transport, message)),
            );
            Vec::new()
        }
        Msg::TimedOut { entity_id } => {
            state.seal(
                entity_id,
                Outcome::Error(ErrorInfo::new(ErrorOrigin::Timeout, "stream stalled")),
            );
            Vec::new()
        }
        Msg::SessionCancelled { entity_id } => {
            state.seal(entity_id, Outcome::Cancelled);
            Vec::new()
        }
        Msg::CompleteResponse { target, events } => {
            if state.streaming_for(&target).is_some() {
                engine_warn!("{} ignoring complete response for busy target {}", V::NAME, target);
                state.reject(target);
                return (state, Vec::new());
            }
            let entity_id = state.open_entity(target);
            for event in &events {
                if let Err(err) = state.apply_event(entity_id, event) {
                    engine_debug!("{} complete response: {}", V::NAME, err);
                    break;
                }
            }
            state.seal(
                entity_id,
                Outcome::Error(ErrorInfo::new(
                    ErrorOrigin::Transport,
                    "response ended without a terminal event",
                )),
            );
            Vec::new()
        }
        Msg::CompleteFailed { target, message } => {
            if state.streaming_for(&target).is_some() {
                engine_warn!("{} ignoring failed response for busy target {}", V::NAME, target);
                state.reject(target);
                return (state, Vec::new());
            }
            let entity_id = state.open_entity(target);
            state.seal(
                entity_id,
                Outcome::Error(ErrorInfo::new(ErrorOrigin::Transport, message)),
            );
            Vec::new()
        }
        Msg::Tick | Msg::NoOp => Vec::new(),
    };

    (state, effects)
}

fn start<V: Vocabulary>(state: &mut StreamState<V>, target: TargetId, mode: StartMode) -> Vec<Effect> {
    let mut effects = Vec::with_capacity(2);
    if let Some(existing) = state.streaming_for(&target).map(|entity| entity.id()) {
        match mode {
            StartMode::Reject => {
                engine_warn!("{} start rejected: {} already streaming", V::NAME, target);
                state.reject(target);
                return effects;
            }
            StartMode::Replace => {
                engine_info!("{} replacing stream for {}", V::NAME, target);
                state.seal(existing, Outcome::Cancelled);
                effects.push(Effect::AbortStream {
                    entity_id: existing,
                    target: target.clone(),
                });
            }
        }
    }
    let entity_id = state.open_entity(target.clone());
    effects.push(Effect::OpenStream { entity_id, target });
    effects
}
