use std::sync::Once;

use pretty_assertions::assert_eq;
use stream_core::{
    update, Chat, ChatEvent, Effect, EntityState, ErrorOrigin, Msg, Outcome, StartMode,
    StreamState, TargetId,
};

fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(engine_logging::initialize_for_tests);
}

fn start(state: StreamState<Chat>, target: &str) -> (StreamState<Chat>, Vec<Effect>) {
    update(
        state,
        Msg::StartRequested {
            target: target.into(),
            mode: StartMode::Reject,
        },
    )
}

fn content(entity_id: u64, text: &str) -> Msg<Chat> {
    Msg::Event {
        entity_id,
        event: ChatEvent::Content {
            text: text.to_string(),
        },
    }
}

#[test]
fn start_inserts_streaming_placeholder_and_opens_stream() {
    init_logging();
    let (mut state, effects) = start(StreamState::new(), "c1");

    assert_eq!(
        effects,
        vec![Effect::OpenStream {
            entity_id: 1,
            target: "c1".into(),
        }]
    );
    let view = state.view();
    assert_eq!(view.entities.len(), 1);
    assert_eq!(view.entities[0].state, EntityState::Streaming);
    assert_eq!(view.entities[0].summary, "");
    assert!(view.entities[0].can_stop);
    assert!(!view.entities[0].can_retry);
    assert_eq!(view.streaming, 1);
    assert!(state.consume_dirty());
    assert!(!state.consume_dirty());
}

#[test]
fn second_start_for_same_target_is_rejected() {
    init_logging();
    let (state, _) = start(StreamState::new(), "c1");
    let (mut state, effects) = start(state, "c1");

    assert!(effects.is_empty());
    assert_eq!(state.view().entities.len(), 1);
    assert_eq!(state.last_rejection(), Some(&TargetId::from("c1")));
    assert!(state.consume_dirty());
}

#[test]
fn different_targets_stream_concurrently() {
    init_logging();
    let (state, _) = start(StreamState::new(), "c1");
    let (state, effects) = start(state, "c2");

    assert_eq!(effects.len(), 1);
    assert_eq!(state.view().streaming, 2);

    let (state, _) = update(state, content(1, "one"));
    let (state, _) = update(state, content(2, "two"));
    let (state, _) = update(state, content(1, "!"));
    assert_eq!(state.entity(1).unwrap().record().content, "one!");
    assert_eq!(state.entity(2).unwrap().record().content, "two");
}

#[test]
fn replace_cancels_existing_then_opens_new() {
    init_logging();
    let (state, _) = start(StreamState::new(), "c1");
    let (state, _) = update(state, content(1, "old"));
    let (state, effects) = update(
        state,
        Msg::StartRequested {
            target: "c1".into(),
            mode: StartMode::Replace,
        },
    );

    assert_eq!(
        effects,
        vec![
            Effect::AbortStream {
                entity_id: 1,
                target: "c1".into(),
            },
            Effect::OpenStream {
                entity_id: 2,
                target: "c1".into(),
            },
        ]
    );
    assert_eq!(state.entity(1).unwrap().outcome(), Some(&Outcome::Cancelled));
    assert_eq!(state.entity(1).unwrap().record().content, "old");

    // Late events from the replaced session must not leak into either entity.
    let (state, _) = update(state, content(1, "late"));
    assert_eq!(state.entity(1).unwrap().record().content, "old");
    assert_eq!(state.entity(2).unwrap().record().content, "");
}

#[test]
fn cancel_emits_abort_once() {
    init_logging();
    let (state, _) = start(StreamState::new(), "c1");
    let (state, effects) = update(
        state,
        Msg::CancelRequested {
            target: "c1".into(),
        },
    );
    assert_eq!(
        effects,
        vec![Effect::AbortStream {
            entity_id: 1,
            target: "c1".into(),
        }]
    );

    let snapshot = state.clone();
    let (state, effects) = update(
        state,
        Msg::CancelRequested {
            target: "c1".into(),
        },
    );
    assert!(effects.is_empty());
    assert_eq!(state, snapshot);
}

#[test]
fn retry_only_offered_and_honoured_for_errors() {
    init_logging();
    let (state, _) = start(StreamState::new(), "c1");
    let (state, _) = update(
        state,
        Msg::TransportFailed {
            entity_id: 1,
            message: "connection reset".to_string(),
        },
    );
    let view = state.view();
    assert!(view.entities[0].can_retry);
    assert!(!view.entities[0].can_stop);
    assert_eq!(view.entities[0].status_text(), "connection error: connection reset");

    let (state, effects) = update(state, Msg::RetryRequested { entity_id: 1 });
    assert_eq!(
        effects,
        vec![Effect::OpenStream {
            entity_id: 2,
            target: "c1".into(),
        }]
    );

    let (state, _) = update(
        state,
        Msg::CancelRequested {
            target: "c1".into(),
        },
    );
    let (_, effects) = update(state, Msg::RetryRequested { entity_id: 2 });
    assert!(effects.is_empty());
}

#[test]
fn timeout_is_reported_as_error_not_cancellation() {
    init_logging();
    let (state, _) = start(StreamState::new(), "c1");
    let (state, _) = update(state, content(1, "par"));
    let (state, _) = update(state, Msg::TimedOut { entity_id: 1 });

    let entity = state.entity(1).unwrap();
    match entity.outcome() {
        Some(Outcome::Error(info)) => assert_eq!(info.origin, ErrorOrigin::Timeout),
        other => panic!("unexpected outcome {other:?}"),
    }
    assert_eq!(entity.record().content, "par");
}

#[test]
fn history_is_bounded_fifo() {
    init_logging();
    let mut state = StreamState::<Chat>::with_capacity(2);
    for target in ["a", "b", "c"] {
        let (next, _) = start(state, target);
        let id = next.streaming_for(&target.into()).unwrap().id();
        let (next, _) = update(
            next,
            Msg::TransportClosed {
                entity_id: id,
                graceful: true,
            },
        );
        state = next;
    }

    let targets: Vec<_> = state
        .view()
        .entities
        .iter()
        .map(|view| view.target.to_string())
        .collect();
    assert_eq!(targets, vec!["b".to_string(), "c".to_string()]);
}
