use std::collections::VecDeque;

use crate::{Entity, EntityId, TargetId, Vocabulary};

pub const DEFAULT_HISTORY_CAPACITY: usize = 100;

/// Bounded, insertion-ordered collection of entities.
///
/// Eviction happens only inside [`History::insert`] and removes the oldest
/// sealed entity; a streaming entity is never evicted. If every stored entity
/// is streaming the collection temporarily exceeds its capacity.
#[derive(Debug, Clone, PartialEq)]
pub struct History<V: Vocabulary> {
    capacity: usize,
    entries: VecDeque<Entity<V>>,
}

impl<V: Vocabulary> History<V> {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: VecDeque::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Appends an entity and returns the ids evicted to make room.
    pub fn insert(&mut self, entity: Entity<V>) -> Vec<EntityId> {
        let mut evicted = Vec::new();
        while self.entries.len() >= self.capacity {
            let Some(index) = self.entries.iter().position(Entity::is_sealed) else {
                break;
            };
            if let Some(old) = self.entries.remove(index) {
                evicted.push(old.id());
            }
        }
        self.entries.push_back(entity);
        evicted
    }

    pub fn get(&self, id: EntityId) -> Option<&Entity<V>> {
        self.entries.iter().find(|entity| entity.id() == id)
    }

    pub(crate) fn get_mut(&mut self, id: EntityId) -> Option<&mut Entity<V>> {
        self.entries.iter_mut().find(|entity| entity.id() == id)
    }

    /// The entity currently streaming for `target`, if any.
    pub fn streaming_for(&self, target: &TargetId) -> Option<&Entity<V>> {
        self.entries
            .iter()
            .find(|entity| entity.target() == target && !entity.is_sealed())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entity<V>> {
        self.entries.iter()
    }
}
