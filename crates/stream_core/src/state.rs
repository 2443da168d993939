use engine_logging::{engine_debug, engine_info};

use crate::history::{History, DEFAULT_HISTORY_CAPACITY};
use crate::view_model::{EntityView, StreamViewModel};
use crate::{ApplyError, Entity, EntityId, Outcome, TargetId, Vocabulary};

/// State container for one stream vocabulary.
///
/// Constructed by whoever owns the UI lifecycle and passed through
/// [`crate::update`]; there is no process-wide instance.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamState<V: Vocabulary> {
    history: History<V>,
    next_entity_id: EntityId,
    last_rejection: Option<TargetId>,
    dirty: bool,
}

impl<V: Vocabulary> Default for StreamState<V> {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_HISTORY_CAPACITY)
    }
}

impl<V: Vocabulary> StreamState<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            history: History::with_capacity(capacity),
            next_entity_id: 1,
            last_rejection: None,
            dirty: false,
        }
    }

    pub fn history(&self) -> &History<V> {
        &self.history
    }

    pub fn entity(&self, id: EntityId) -> Option<&Entity<V>> {
        self.history.get(id)
    }

    pub fn streaming_for(&self, target: &TargetId) -> Option<&Entity<V>> {
        self.history.streaming_for(target)
    }

    pub fn last_rejection(&self) -> Option<&TargetId> {
        self.last_rejection.as_ref()
    }

    pub fn view(&self) -> StreamViewModel {
        let entities: Vec<EntityView> = self.history.iter().map(EntityView::from_entity).collect();
        let streaming = entities.iter().filter(|view| view.can_stop).count();
        StreamViewModel {
            entities,
            streaming,
            last_rejection: self.last_rejection.clone(),
            dirty: self.dirty,
        }
    }

    /// Returns whether anything changed since the last call and clears the flag.
    pub fn consume_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    pub(crate) fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Inserts a placeholder for `target` and moves it straight to streaming.
    pub(crate) fn open_entity(&mut self, target: TargetId) -> EntityId {
        let id = self.next_entity_id;
        self.next_entity_id += 1;

        let mut entity = Entity::new(id, target);
        entity.begin();
        let evicted = self.history.insert(entity);
        if !evicted.is_empty() {
            engine_debug!("{} history evicted entities {:?}", V::NAME, evicted);
        }
        self.last_rejection = None;
        self.mark_dirty();
        id
    }

    pub(crate) fn reject(&mut self, target: TargetId) {
        self.last_rejection = Some(target);
        self.mark_dirty();
    }

    pub(crate) fn apply_event(&mut self, id: EntityId, event: &V::Event) -> Result<(), ApplyError> {
        let entity = self.history.get_mut(id).ok_or(ApplyError::Unknown(id))?;
        entity.apply(event)?;
        if let Some(outcome) = entity.outcome() {
            engine_info!("{} entity {} sealed: {}", V::NAME, id, outcome);
        }
        self.mark_dirty();
        Ok(())
    }

    /// Seals a still-open entity. Returns false for unknown or already sealed ids.
    pub(crate) fn seal(&mut self, id: EntityId, outcome: Outcome) -> bool {
        let Some(entity) = self.history.get_mut(id) else {
            return false;
        };
        let description = outcome.to_string();
        if entity.seal(outcome).is_err() {
            return false;
        }
        engine_info!("{} entity {} sealed: {}", V::NAME, id, description);
        self.mark_dirty();
        true
    }
}
