use std::sync::Arc;

use engine_logging::{engine_info, engine_warn};
use stream_core::{
    update, ErrorOrigin, Msg, Outcome, StartMode, StreamState, TargetId, Vocabulary,
};
use stream_engine::{SessionController, StreamRequest, TransportError};
use tokio::sync::mpsc;

use crate::effects::{EffectRunner, RequestFactory};
use crate::render::Renderer;

/// One console run: a single target, streamed or fetched whole.
pub struct Job {
    pub target: TargetId,
    pub requests: RequestFactory,
    /// Whole-response request used when streaming is off or the stream
    /// fails at the transport.
    pub fallback: Option<StreamRequest>,
    pub stream: bool,
    pub history_capacity: usize,
}

/// Runs `job` to its outcome. Ctrl-C cancels the running stream.
pub async fn run<V: Vocabulary>(
    controller: SessionController<V>,
    job: Job,
) -> anyhow::Result<Option<Outcome>> {
    let controller = Arc::new(controller);
    let (msg_tx, mut msg_rx) = mpsc::unbounded_channel::<Msg<V>>();
    let runner = EffectRunner::new(controller.clone(), job.requests, msg_tx.clone());
    let mut state = StreamState::<V>::with_capacity(job.history_capacity);
    let mut renderer = Renderer::default();
    let mut fallback = job.fallback;

    let first = if job.stream {
        Msg::StartRequested {
            target: job.target.clone(),
            mode: StartMode::Reject,
        }
    } else {
        let Some(request) = fallback.take() else {
            anyhow::bail!("{} has no whole-response endpoint", V::NAME);
        };
        complete_response::<V>(&controller, &job.target, &request).await
    };
    let _ = msg_tx.send(first);

    loop {
        let msg = tokio::select! {
            received = msg_rx.recv() => match received {
                Some(msg) => msg,
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                engine_info!("Interrupted, cancelling {}", job.target);
                Msg::CancelRequested { target: job.target.clone() }
            }
        };

        let (next, effects) = update(state, msg);
        state = next;
        runner.run(effects);
        if state.consume_dirty() {
            renderer.render(&job.target, &state.view());
        }

        if state.streaming_for(&job.target).is_some() {
            continue;
        }
        let outcome = latest_outcome(&state, &job.target);
        if let Some(Outcome::Error(info)) = &outcome {
            if info.origin == ErrorOrigin::Transport {
                if let Some(request) = fallback.take() {
                    engine_warn!("Stream failed ({}), retrying as a whole response", info.message);
                    let msg = complete_response::<V>(&controller, &job.target, &request).await;
                    let _ = msg_tx.send(msg);
                    continue;
                }
            }
        }
        if outcome.is_some() {
            return Ok(outcome);
        }
    }
    Ok(latest_outcome(&state, &job.target))
}

async fn complete_response<V: Vocabulary>(
    controller: &SessionController<V>,
    target: &TargetId,
    request: &StreamRequest,
) -> Msg<V> {
    complete_msg(target, controller.fetch_complete(request).await)
}

/// A failed whole-response request still ends in a sealed entity.
fn complete_msg<V: Vocabulary>(
    target: &TargetId,
    fetched: Result<Vec<V::Event>, TransportError>,
) -> Msg<V> {
    match fetched {
        Ok(events) => Msg::CompleteResponse {
            target: target.clone(),
            events,
        },
        Err(err) => {
            engine_warn!("Whole response for {} failed: {}", target, err);
            Msg::CompleteFailed {
                target: target.clone(),
                message: err.to_string(),
            }
        }
    }
}

fn latest_outcome<V: Vocabulary>(state: &StreamState<V>, target: &TargetId) -> Option<Outcome> {
    state
        .history()
        .iter()
        .filter(|entity| entity.target() == target)
        .last()
        .and_then(|entity| entity.outcome().cloned())
}
