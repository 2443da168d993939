use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use engine_logging::{engine_debug, engine_info, engine_warn};
use stream_core::{StartMode, TargetId, Vocabulary};

use crate::decode::{Decoded, FrameDecoder, Framing};
use crate::dispatch::Dispatcher;
use crate::transport::{StreamRequest, Transport};
use crate::{FailureKind, SessionError, SessionEvent, SessionState, TransportError};

/// Per stream-kind limits, caller configurable.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Longest silence tolerated between two chunks before the session is
    /// stopped and reported as timed out.
    pub stall_timeout: Duration,
    pub framing: Framing,
    /// Capacity of the ordered event channel between the consume task and the handle.
    pub channel_capacity: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            stall_timeout: Duration::from_secs(60),
            framing: Framing::default(),
            channel_capacity: 64,
        }
    }
}

impl SessionSettings {
    pub fn for_chat() -> Self {
        Self {
            stall_timeout: Duration::from_secs(120),
            ..Self::default()
        }
    }

    /// Processing a large upload can sit on one step for a while.
    pub fn for_file_processing() -> Self {
        Self {
            stall_timeout: Duration::from_secs(300),
            ..Self::default()
        }
    }

    pub fn for_audit() -> Self {
        Self {
            stall_timeout: Duration::from_secs(600),
            ..Self::default()
        }
    }
}

struct SessionShared {
    id: u64,
    token: CancellationToken,
    state: Mutex<SessionState>,
}

impl SessionShared {
    fn state(&self) -> SessionState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_active(&self) -> bool {
        self.state() == SessionState::Active
    }

    /// Moves an active session to `next`; returns false if it already ended.
    fn finish(&self, next: SessionState) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state != SessionState::Active {
            return false;
        }
        *state = next;
        true
    }

    /// Cancels an active session. A session that already ended keeps its
    /// state and its queued items.
    fn cancel(&self) -> bool {
        let cancelled = self.finish(SessionState::Cancelled);
        if cancelled {
            self.token.cancel();
        }
        cancelled
    }
}

type SessionTable = Arc<Mutex<HashMap<TargetId, Arc<SessionShared>>>>;

/// Owns every live stream of one vocabulary and enforces at most one active
/// session per target.
pub struct SessionController<V: Vocabulary> {
    transport: Arc<dyn Transport>,
    settings: SessionSettings,
    sessions: SessionTable,
    next_session_id: AtomicU64,
    _vocabulary: PhantomData<V>,
}

impl<V: Vocabulary> SessionController<V> {
    pub fn new(transport: Arc<dyn Transport>, settings: SessionSettings) -> Self {
        Self {
            transport,
            settings,
            sessions: Arc::new(Mutex::new(HashMap::new())),
            next_session_id: AtomicU64::new(1),
            _vocabulary: PhantomData,
        }
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// Starts consuming `request` for `target`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(
        &self,
        target: TargetId,
        request: StreamRequest,
        mode: StartMode,
    ) -> Result<SessionHandle<V>, SessionError> {
        let shared = {
            let mut sessions = lock(&self.sessions);
            if let Some(existing) = sessions.get(&target) {
                if existing.is_active() {
                    match mode {
                        StartMode::Reject => {
                            engine_warn!(
                                "{} start rejected: session already active for {}",
                                V::NAME,
                                target
                            );
                            return Err(SessionError::AlreadyActive { target });
                        }
                        StartMode::Replace => {
                            engine_info!("{} replacing session for {}", V::NAME, target);
                            existing.cancel();
                        }
                    }
                }
            }
            let shared = Arc::new(SessionShared {
                id: self.next_session_id.fetch_add(1, Ordering::Relaxed),
                token: CancellationToken::new(),
                state: Mutex::new(SessionState::Active),
            });
            sessions.insert(target.clone(), shared.clone());
            shared
        };

        engine_info!("{} session {} started for {}", V::NAME, shared.id, target);
        let (tx, rx) = mpsc::channel(self.settings.channel_capacity.max(1));
        let task = SessionTask::<V> {
            shared: shared.clone(),
            sessions: self.sessions.clone(),
            target: target.clone(),
            tx,
        };
        let transport = self.transport.clone();
        let settings = self.settings.clone();
        tokio::spawn(async move {
            let next = consume(&task, transport.as_ref(), &request, &settings).await;
            task.release(next);
        });

        Ok(SessionHandle {
            target,
            shared,
            rx,
            done: false,
            _vocabulary: PhantomData,
        })
    }

    /// Cancels the active session for `target`.
    ///
    /// Returns false when there was nothing to cancel; calling it again is a no-op.
    pub fn cancel(&self, target: &TargetId) -> bool {
        let removed = lock(&self.sessions).remove(target);
        match removed {
            Some(shared) => {
                let cancelled = shared.cancel();
                if cancelled {
                    engine_info!("{} session {} for {} cancelled", V::NAME, shared.id, target);
                }
                cancelled
            }
            None => false,
        }
    }

    pub fn is_active(&self, target: &TargetId) -> bool {
        lock(&self.sessions)
            .get(target)
            .is_some_and(|shared| shared.is_active())
    }

    pub fn active_targets(&self) -> Vec<TargetId> {
        let mut targets: Vec<TargetId> = lock(&self.sessions)
            .iter()
            .filter(|(_, shared)| shared.is_active())
            .map(|(target, _)| target.clone())
            .collect();
        targets.sort();
        targets
    }

    /// Non-streaming fallback: one request, the whole response turned into
    /// the vocabulary's event sequence.
    pub async fn fetch_complete(&self, request: &StreamRequest) -> Result<Vec<V::Event>, TransportError> {
        let body = self.transport.request_json(request).await?;
        Ok(V::from_complete_response(&body))
    }
}

impl<V: Vocabulary> Drop for SessionController<V> {
    fn drop(&mut self) {
        for (_, shared) in lock(&self.sessions).drain() {
            shared.cancel();
        }
    }
}

fn lock(sessions: &SessionTable) -> MutexGuard<'_, HashMap<TargetId, Arc<SessionShared>>> {
    sessions.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Consumer side of one session.
pub struct SessionHandle<V: Vocabulary> {
    target: TargetId,
    shared: Arc<SessionShared>,
    rx: mpsc::Receiver<SessionEvent<V::Event>>,
    done: bool,
    _vocabulary: PhantomData<V>,
}

impl<V: Vocabulary> SessionHandle<V> {
    pub fn target(&self) -> &TargetId {
        &self.target
    }

    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    /// Cancels this session. Idempotent.
    pub fn cancel(&self) {
        self.shared.cancel();
    }

    /// Next item in arrival order; `None` once a terminal item was returned.
    ///
    /// After cancellation, events still queued are discarded and a single
    /// `Cancelled` is returned instead.
    pub async fn next_event(&mut self) -> Option<SessionEvent<V::Event>> {
        if self.done {
            return None;
        }
        let received = tokio::select! {
            biased;
            _ = self.shared.token.cancelled() => None,
            received = self.rx.recv() => received,
        };
        if self.shared.token.is_cancelled() {
            self.done = true;
            self.rx.close();
            return Some(SessionEvent::Cancelled);
        }
        match received {
            Some(event) => {
                self.done = is_terminal::<V>(&event);
                Some(event)
            }
            None => {
                self.done = true;
                None
            }
        }
    }
}

fn is_terminal<V: Vocabulary>(event: &SessionEvent<V::Event>) -> bool {
    match event {
        SessionEvent::Event(event) => V::terminal(event).is_some(),
        _ => true,
    }
}

/// Producer side of one session, owned by its consume task.
struct SessionTask<V: Vocabulary> {
    shared: Arc<SessionShared>,
    sessions: SessionTable,
    target: TargetId,
    tx: mpsc::Sender<SessionEvent<V::Event>>,
}

impl<V: Vocabulary> SessionTask<V> {
    /// Leaves the active state and the session table. Idempotent.
    fn release(&self, next: SessionState) {
        if self.shared.finish(next) {
            engine_info!(
                "{} session {} for {} ended: {:?}",
                V::NAME,
                self.shared.id,
                self.target,
                next
            );
        }
        let mut sessions = lock(&self.sessions);
        if sessions
            .get(&self.target)
            .is_some_and(|current| Arc::ptr_eq(current, &self.shared))
        {
            sessions.remove(&self.target);
        }
    }

    /// Delivers one item unless the session was cancelled or the handle dropped.
    async fn deliver(&self, event: SessionEvent<V::Event>) -> bool {
        let token = &self.shared.token;
        if token.is_cancelled() {
            return false;
        }
        tokio::select! {
            biased;
            _ = token.cancelled() => false,
            sent = self.tx.send(event) => sent.is_ok(),
        }
    }

    /// Ends the session, then delivers its last item. The target is free for
    /// a new start by the time the consumer sees that item.
    async fn conclude(&self, next: SessionState, event: SessionEvent<V::Event>) -> SessionState {
        self.release(next);
        self.deliver(event).await;
        next
    }
}

async fn consume<V: Vocabulary>(
    task: &SessionTask<V>,
    transport: &dyn Transport,
    request: &StreamRequest,
    settings: &SessionSettings,
) -> SessionState {
    let token = &task.shared.token;
    let opened = tokio::select! {
        biased;
        _ = token.cancelled() => return SessionState::Cancelled,
        opened = tokio::time::timeout(settings.stall_timeout, transport.open_stream(request)) => opened,
    };
    let mut body = match opened {
        Ok(Ok(body)) => body,
        Ok(Err(err)) => {
            engine_warn!("{} stream failed to open: {}", V::NAME, err);
            return task.conclude(SessionState::Failed, SessionEvent::Failed(err)).await;
        }
        Err(_) => {
            engine_warn!("{} stream timed out before the response", V::NAME);
            return task.conclude(SessionState::Failed, SessionEvent::TimedOut).await;
        }
    };

    let mut decoder = FrameDecoder::new(settings.framing.clone());
    let mut dispatcher = Dispatcher::<V>::new();
    loop {
        let next = tokio::select! {
            biased;
            _ = token.cancelled() => return SessionState::Cancelled,
            next = tokio::time::timeout(settings.stall_timeout, body.next()) => next,
        };
        let (items, ended) = match next {
            Err(_) => {
                engine_warn!(
                    "{} stream stalled for {:?} after {} events",
                    V::NAME,
                    settings.stall_timeout,
                    dispatcher.dispatched()
                );
                return task.conclude(SessionState::Failed, SessionEvent::TimedOut).await;
            }
            Ok(Some(Err(err))) => {
                engine_warn!(
                    "{} stream dropped after {} events: {}",
                    V::NAME,
                    dispatcher.dispatched(),
                    err
                );
                return task.conclude(SessionState::Failed, SessionEvent::Failed(err)).await;
            }
            Ok(Some(Ok(chunk))) => (decoder.push(&chunk), false),
            Ok(None) => (decoder.finish(), true),
        };

        for item in items {
            let event = match item {
                Decoded::Frame(frame) => match dispatcher.dispatch(&frame) {
                    Some(event) => event,
                    None => continue,
                },
                Decoded::Sentinel => {
                    engine_debug!(
                        "{} stream sentinel after {} events",
                        V::NAME,
                        dispatcher.dispatched()
                    );
                    let closed = SessionEvent::Closed { graceful: true };
                    return task.conclude(SessionState::Completed, closed).await;
                }
                Decoded::Closed => {
                    let closed = SessionEvent::Closed { graceful: false };
                    return task.conclude(SessionState::Failed, closed).await;
                }
                Decoded::Failed(err) => {
                    let limit = settings.framing.max_record_bytes;
                    let failure =
                        TransportError::new(FailureKind::RecordTooLarge { limit }, err.to_string());
                    return task
                        .conclude(SessionState::Failed, SessionEvent::Failed(failure))
                        .await;
                }
            };
            if V::terminal(&event).is_some() {
                return task
                    .conclude(SessionState::Completed, SessionEvent::Event(event))
                    .await;
            }
            if !task.deliver(SessionEvent::Event(event)).await {
                return SessionState::Cancelled;
            }
        }
        if ended {
            return SessionState::Failed;
        }
    }
}
