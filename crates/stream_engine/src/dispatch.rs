use std::marker::PhantomData;

use engine_logging::{engine_debug, engine_trace};
use stream_core::{StreamFrame, Vocabulary};

/// Turns frames into typed events for one session.
///
/// Unknown kinds are dropped. After the first terminal event the dispatcher is
/// closed and every later frame is suppressed.
pub struct Dispatcher<V: Vocabulary> {
    closed: bool,
    dispatched: u64,
    _vocabulary: PhantomData<V>,
}

impl<V: Vocabulary> Default for Dispatcher<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Vocabulary> Dispatcher<V> {
    pub fn new() -> Self {
        Self {
            closed: false,
            dispatched: 0,
            _vocabulary: PhantomData,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn dispatched(&self) -> u64 {
        self.dispatched
    }

    pub fn dispatch(&mut self, frame: &StreamFrame) -> Option<V::Event> {
        if self.closed {
            engine_trace!("{} suppressing '{}' frame after terminal", V::NAME, frame.kind);
            return None;
        }
        let Some(event) = V::classify(frame) else {
            engine_debug!("{} dropping frame of unknown kind '{}'", V::NAME, frame.kind);
            return None;
        };
        if V::terminal(&event).is_some() {
            self.closed = true;
        }
        self.dispatched += 1;
        Some(event)
    }
}
