use std::collections::HashMap;

use tracing::trace;

use super::LifetimeEntry;
use crate::ids::{Arena, EntryId, HitObjectId};
use crate::{Result, TimelineError};

/// Owns every lifetime entry and the entity/parent relations between them.
///
/// Top-level entries are forwarded to the sweep by the caller; nested entries
/// are only recorded here and activated through their parent.
#[derive(Debug, Default)]
pub struct HitObjectEntryManager {
    entries: Arena<EntryId, LifetimeEntry>,
    by_entity: HashMap<HitObjectId, EntryId>,
    parents: HashMap<EntryId, HitObjectId>,
}

impl HitObjectEntryManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Reverse lookup from entity to its entry.
    pub fn get(&self, entity: HitObjectId) -> Option<EntryId> {
        self.by_entity.get(&entity).copied()
    }

    pub fn entry(&self, id: EntryId) -> Option<&LifetimeEntry> {
        self.entries.get(id)
    }

    pub(crate) fn entry_mut(&mut self, id: EntryId) -> Option<&mut LifetimeEntry> {
        self.entries.get_mut(id)
    }

    pub fn parent_of(&self, id: EntryId) -> Option<HitObjectId> {
        self.parents.get(&id).copied()
    }

    pub fn parent_entry(&self, id: EntryId) -> Option<EntryId> {
        self.parent_of(id).and_then(|parent| self.get(parent))
    }

    pub fn is_nested(&self, id: EntryId) -> bool {
        self.parents.contains_key(&id)
    }

    /// Top-level entries in slot order.
    pub fn top_level(&self) -> Vec<EntryId> {
        self.entries
            .iter()
            .filter(|(id, _)| !self.parents.contains_key(id))
            .map(|(id, _)| id)
            .collect()
    }

    pub fn add(&mut self, entry: LifetimeEntry, parent: Option<HitObjectId>) -> Result<EntryId> {
        let entity = entry.owner();
        if let Some(existing) = self.get(entity) {
            return Err(TimelineError::EntityAlreadyTracked {
                entity,
                entry: existing,
            });
        }

        let parent_entry = match parent {
            Some(parent) => Some(self.get(parent).ok_or(TimelineError::UnknownParent(parent))?),
            None => None,
        };

        let id = self.entries.insert(entry);
        self.by_entity.insert(entity, id);

        if let (Some(parent), Some(parent_entry)) = (parent, parent_entry) {
            self.parents.insert(id, parent);
            if let Some(parent_entry) = self.entries.get_mut(parent_entry) {
                parent_entry.nested.push(id);
            }
        }

        trace!(?id, ?entity, ?parent, "entry added");
        Ok(id)
    }

    /// Removes an entry and its nested entries, returning them children first.
    pub fn remove(&mut self, id: EntryId) -> Result<Vec<LifetimeEntry>> {
        let nested = self
            .entries
            .get(id)
            .map(|entry| entry.nested.clone())
            .ok_or(TimelineError::UnknownEntry(id))?;

        let mut removed = Vec::new();
        for child in nested {
            removed.extend(self.remove(child)?);
        }

        if let Some(parent_entry) = self.parent_entry(id) {
            if let Some(parent_entry) = self.entries.get_mut(parent_entry) {
                parent_entry.nested.retain(|child| *child != id);
            }
        }
        self.parents.remove(&id);

        let entry = self.entries.remove(id).ok_or(TimelineError::UnknownEntry(id))?;
        self.by_entity.remove(&entry.owner());
        trace!(?id, entity = ?entry.owner(), "entry removed");
        removed.push(entry);
        Ok(removed)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.by_entity.clear();
        self.parents.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entities(count: usize) -> Vec<HitObjectId> {
        let mut arena: Arena<HitObjectId, ()> = Arena::new();
        (0..count).map(|_| arena.insert(())).collect()
    }

    #[test]
    fn nested_entries_are_linked_to_their_parent() {
        let ids = entities(3);
        let mut manager = HitObjectEntryManager::new();

        let slider = manager.add(LifetimeEntry::new(ids[0], 0.0, 100.0), None).unwrap();
        let head = manager
            .add(LifetimeEntry::new(ids[1], 0.0, 10.0), Some(ids[0]))
            .unwrap();

        assert_eq!(manager.get(ids[1]), Some(head));
        assert_eq!(manager.parent_entry(head), Some(slider));
        assert_eq!(manager.entry(slider).unwrap().nested(), &[head]);
        assert_eq!(manager.top_level(), vec![slider]);
        assert!(manager.is_nested(head));
    }

    #[test]
    fn rejects_duplicates_and_unknown_parents() {
        let ids = entities(3);
        let mut manager = HitObjectEntryManager::new();
        manager.add(LifetimeEntry::new(ids[0], 0.0, 1.0), None).unwrap();

        assert!(matches!(
            manager.add(LifetimeEntry::new(ids[0], 0.0, 1.0), None),
            Err(TimelineError::EntityAlreadyTracked { .. })
        ));
        assert!(matches!(
            manager.add(LifetimeEntry::new(ids[1], 0.0, 1.0), Some(ids[2])),
            Err(TimelineError::UnknownParent(_))
        ));
    }

    #[test]
    fn removal_is_transitive_and_children_first() {
        let ids = entities(4);
        let mut manager = HitObjectEntryManager::new();
        let root = manager.add(LifetimeEntry::new(ids[0], 0.0, 1.0), None).unwrap();
        manager.add(LifetimeEntry::new(ids[1], 0.0, 1.0), Some(ids[0])).unwrap();
        manager.add(LifetimeEntry::new(ids[2], 0.0, 1.0), Some(ids[1])).unwrap();
        manager.add(LifetimeEntry::new(ids[3], 0.0, 1.0), Some(ids[0])).unwrap();

        let removed: Vec<_> = manager
            .remove(root)
            .unwrap()
            .iter()
            .map(|entry| entry.owner())
            .collect();

        assert_eq!(removed, vec![ids[2], ids[1], ids[3], ids[0]]);
        assert!(manager.is_empty());
        assert!(manager.get(ids[2]).is_none());
        assert!(matches!(manager.remove(root), Err(TimelineError::UnknownEntry(_))));
    }
}
