use std::sync::{Arc, Once};
use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::json;
use stream_core::{
    update, Audit, AuditPhase, Chat, FileProcessing, Msg, Outcome, StartMode, StreamState,
    Vocabulary,
};
use stream_engine::{
    forward_session, requests, FailureKind, ReqwestTransport, SessionController, SessionEvent,
    SessionSettings, StaticCredentials, StreamRequest, TransportSettings,
};
use tokio::sync::mpsc;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TOKEN: &str = "t0k";

fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(engine_logging::initialize_for_tests);
}

fn sessions<V: Vocabulary>(server: &MockServer, settings: SessionSettings) -> SessionController<V> {
    let transport = ReqwestTransport::new(
        &server.uri(),
        Arc::new(StaticCredentials::new(Some(TOKEN.to_string()))),
        TransportSettings::default(),
    )
    .expect("valid base url");
    SessionController::new(Arc::new(transport), settings)
}

fn event_stream(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body.to_owned(), "text/event-stream")
}

/// Starts `request` through the state machine and runs it to completion.
async fn run<V: Vocabulary>(
    controller: &SessionController<V>,
    request: StreamRequest,
    target: &str,
) -> StreamState<V> {
    let (mut state, _) = update(
        StreamState::<V>::new(),
        Msg::StartRequested {
            target: target.into(),
            mode: StartMode::Reject,
        },
    );
    let handle = controller
        .start(target.into(), request, StartMode::Reject)
        .expect("target is idle");

    let (msg_tx, mut msg_rx) = mpsc::unbounded_channel();
    tokio::spawn(forward_session(handle, 1, msg_tx));
    let drained = tokio::time::timeout(Duration::from_secs(5), async move {
        while let Some(msg) = msg_rx.recv().await {
            state = update(state, msg).0;
        }
        state
    });
    drained.await.expect("session did not end")
}

#[tokio::test]
async fn chat_stream_over_http_with_bearer_auth() {
    init_logging();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/chat/stream"))
        .and(header("authorization", "Bearer t0k"))
        .and(body_json(json!({"message": "hello", "conversation_id": null})))
        .respond_with(event_stream(concat!(
            "data: {\"type\":\"metadata\",\"model\":\"m-1\",\"execution_time_ms\":12}\n\n",
            "data: {\"type\":\"content\",\"content\":\"Hel\"}\n\n",
            "data: {\"type\":\"content\",\"content\":\"lo\"}\n\n",
            "data: {\"type\":\"done\",\"conversation_id\":\"c1\",\"message_id\":\"m1\"}\n\n",
            "data: [DONE]\n\n",
        )))
        .expect(1)
        .mount(&server)
        .await;

    let controller = sessions::<Chat>(&server, SessionSettings::for_chat());
    let state = run(&controller, requests::chat_stream("hello", None), "new-chat").await;

    let entity = state.entity(1).unwrap();
    assert_eq!(entity.outcome(), Some(&Outcome::Done));
    assert_eq!(entity.record().content, "Hello");
    assert_eq!(entity.record().conversation_id.as_deref(), Some("c1"));
    let metadata = entity.record().metadata.clone().unwrap();
    assert_eq!(metadata.model.as_deref(), Some("m-1"));
    assert_eq!(metadata.elapsed_ms, Some(12));
}

#[tokio::test]
async fn file_processing_stream_sends_token_as_query_param() {
    init_logging();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/files/dm.csv/process/stream"))
        .and(query_param("token", TOKEN))
        .respond_with(event_stream(concat!(
            "data: {\"type\":\"progress\",\"percentage\":40,\"step\":\"reading\"}\n",
            "data: {\"type\":\"schema_change\",\"added_columns\":[\"AGE\"]}\n",
            "data: {\"type\":\"complete\",\"rows\":500,\"columns\":12}\n",
        )))
        .mount(&server)
        .await;

    let controller = sessions::<FileProcessing>(&server, SessionSettings::for_file_processing());
    let state = run(
        &controller,
        requests::file_processing_stream("dm.csv"),
        "dm.csv",
    )
    .await;

    let entity = state.entity(1).unwrap();
    assert_eq!(entity.outcome(), Some(&Outcome::Done));
    assert_eq!(entity.record().percentage, 100.0);
    assert_eq!(entity.record().schema_changes.len(), 1);
    assert_eq!(entity.record().schema_changes[0].added_columns, vec!["AGE"]);
    let summary = entity.record().summary.clone().unwrap();
    assert_eq!((summary.rows, summary.columns), (500, 12));
    assert_eq!(state.view().entities[0].summary, "500 rows, 12 columns");
}

#[tokio::test]
async fn audit_stream_reports_phases_and_blocking() {
    init_logging();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/audit/job-7/stream"))
        .respond_with(event_stream(concat!(
            "data: {\"type\":\"progress\",\"phase\":\"cdisc_check\",\"processed\":3,\"total\":3}\n",
            "data: {\"type\":\"progress\",\"phase\":\"llm\",\"current\":1,\"total\":4}\n",
            "data: {\"type\":\"blocked\",\"reason\":\"quota exceeded\"}\n",
            "data: {\"type\":\"progress\",\"phase\":\"llm\",\"current\":2,\"total\":4}\n",
        )))
        .mount(&server)
        .await;

    let controller = sessions::<Audit>(&server, SessionSettings::for_audit());
    let state = run(&controller, requests::audit_stream("job-7"), "job-7").await;

    let entity = state.entity(1).unwrap();
    assert_eq!(
        entity.outcome(),
        Some(&Outcome::Blocked {
            reason: "quota exceeded".to_string()
        })
    );
    assert_eq!(entity.record().phase, Some(AuditPhase::LlmAnalysis));
    assert_eq!(entity.record().cdisc.processed, 3);
    assert_eq!(entity.record().llm.processed, 1);
}

#[tokio::test]
async fn error_status_fails_the_session() {
    init_logging();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/chat/stream"))
        .respond_with(ResponseTemplate::new(503).set_body_string("upstream busy"))
        .mount(&server)
        .await;

    let controller = sessions::<Chat>(&server, SessionSettings::default());
    let mut handle = controller
        .start(
            "c1".into(),
            requests::chat_stream("hello", Some("c1")),
            StartMode::Reject,
        )
        .unwrap();

    let Some(SessionEvent::Failed(err)) = handle.next_event().await else {
        panic!("expected a failure");
    };
    assert_eq!(err.kind, FailureKind::HttpStatus(503));
    assert!(err.message.contains("upstream busy"));
    assert_eq!(handle.next_event().await, None);
}

#[tokio::test]
async fn body_without_terminal_seals_as_error() {
    init_logging();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/chat/stream"))
        .respond_with(event_stream(
            "data: {\"type\":\"content\",\"content\":\"cut\"}\ndata: {\"type\":\"cont",
        ))
        .mount(&server)
        .await;

    let controller = sessions::<Chat>(&server, SessionSettings::default());
    let state = run(&controller, requests::chat_stream("hello", None), "c1").await;

    let entity = state.entity(1).unwrap();
    assert_eq!(entity.record().content, "cut");
    assert!(matches!(entity.outcome(), Some(Outcome::Error(_))));
    assert!(state.view().entities[0].can_retry);
}

#[tokio::test]
async fn complete_fallback_returns_whole_message() {
    init_logging();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/chat"))
        .and(header("authorization", "Bearer t0k"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "content": "All at once",
            "conversation_id": "c9",
            "message_id": "m3",
            "metadata": {"model": "m-1"}
        })))
        .mount(&server)
        .await;

    let controller = sessions::<Chat>(&server, SessionSettings::default());
    let events = controller
        .fetch_complete(&requests::chat_complete("hello", None))
        .await
        .unwrap();
    assert_eq!(events.len(), 3);

    let (state, effects) = update(
        StreamState::<Chat>::new(),
        Msg::CompleteResponse {
            target: "c9".into(),
            events,
        },
    );
    assert!(effects.is_empty());
    let entity = state.entity(1).unwrap();
    assert_eq!(entity.outcome(), Some(&Outcome::Done));
    assert_eq!(entity.record().content, "All at once");
    assert_eq!(entity.record().message_id.as_deref(), Some("m3"));
}

#[tokio::test]
async fn complete_fallback_rejects_non_json_body() {
    init_logging();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>gateway</html>"))
        .mount(&server)
        .await;

    let controller = sessions::<Chat>(&server, SessionSettings::default());
    let err = controller
        .fetch_complete(&requests::chat_complete("hello", None))
        .await
        .unwrap_err();
    assert_eq!(err.kind, FailureKind::InvalidBody);
}
