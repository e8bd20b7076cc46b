//! Pooled container driven by lifetime entries.
//!
//! The container owns the entries of every tracked hit object and keeps a
//! pooled representation attached to the render tree for each alive one.
//! Nested entries follow their parent: they are attached right after it and
//! torn down before it.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::beatmap::{EntitySource, HitObject};
use crate::config::LifetimeConfig;
use crate::ids::{EntryId, HitObjectId};
use crate::lifetime::{
    BoundaryKind, CrossingDirection, HitObjectEntryManager, LifetimeEntry, LifetimeEntryManager,
    LifetimeEvent,
};
use crate::pool::{Binding, PoolRegistry, Representation, RepresentationHandle};
use crate::render::RenderTree;
use crate::{Result, TimelineError};

/// Judgement outcome reported for a hit object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HitResult {
    Great,
    Ok,
    Meh,
    Miss,
}

impl HitResult {
    pub fn is_hit(self) -> bool {
        !matches!(self, HitResult::Miss)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerEvent {
    BecameAlive {
        entry: EntryId,
        entity: HitObjectId,
    },
    BecameDead {
        entry: EntryId,
        entity: HitObjectId,
    },
    /// A top-level entity started being displayed.
    UsageBegan(HitObjectId),
    /// A top-level entity stopped being displayed.
    UsageFinished(HitObjectId),
    CrossedBoundary {
        entry: EntryId,
        entity: HitObjectId,
        kind: BoundaryKind,
        direction: CrossingDirection,
    },
    /// The interval of an alive entry moved.
    IntervalChanged {
        entry: EntryId,
        entity: HitObjectId,
    },
    NewResult {
        source: HitObjectId,
        root: HitObjectId,
        result: HitResult,
    },
}

#[derive(Debug)]
pub struct PooledLifetimeContainer<R> {
    entries: HitObjectEntryManager,
    lifetimes: LifetimeEntryManager,
    pools: PoolRegistry<R>,
    render: RenderTree,
    alive: BTreeMap<EntryId, RepresentationHandle>,
    listeners: HashSet<EntryId>,
    /// Entries the sweep considers alive but which failed to attach.
    unattached: HashSet<EntryId>,
    events: Vec<ContainerEvent>,
    past_lifetime_extension: f64,
    future_lifetime_extension: f64,
    remove_rewound_entries: bool,
    preempt: f64,
    linger: f64,
}

impl<R: Representation> PooledLifetimeContainer<R> {
    pub fn new(pools: PoolRegistry<R>, config: &LifetimeConfig) -> Self {
        Self {
            entries: HitObjectEntryManager::new(),
            lifetimes: LifetimeEntryManager::new(),
            pools,
            render: RenderTree::new(),
            alive: BTreeMap::new(),
            listeners: HashSet::new(),
            unattached: HashSet::new(),
            events: Vec::new(),
            past_lifetime_extension: config.past_extension,
            future_lifetime_extension: config.future_extension,
            remove_rewound_entries: config.remove_rewound_entries,
            preempt: config.preempt,
            linger: config.linger,
        }
    }

    pub fn entries(&self) -> &HitObjectEntryManager {
        &self.entries
    }

    pub fn lifetimes(&self) -> &LifetimeEntryManager {
        &self.lifetimes
    }

    pub fn pools(&self) -> &PoolRegistry<R> {
        &self.pools
    }

    pub fn render_tree(&self) -> &RenderTree {
        &self.render
    }

    pub fn entry(&self, id: EntryId) -> Option<&LifetimeEntry> {
        self.entries.entry(id)
    }

    pub fn entry_for(&self, entity: HitObjectId) -> Option<EntryId> {
        self.entries.get(entity)
    }

    pub fn is_alive(&self, id: EntryId) -> bool {
        self.alive.contains_key(&id)
    }

    /// Alive entries, nested ones included.
    pub fn alive_entries(&self) -> Vec<EntryId> {
        self.alive.keys().copied().collect()
    }

    pub fn alive_count(&self) -> usize {
        self.alive.len()
    }

    pub fn handle(&self, id: EntryId) -> Option<RepresentationHandle> {
        self.alive.get(&id).copied()
    }

    pub fn representation(&self, id: EntryId) -> Option<&R> {
        self.pools.get(*self.alive.get(&id)?)
    }

    pub fn representation_mut(&mut self, id: EntryId) -> Option<&mut R> {
        self.pools.get_mut(*self.alive.get(&id)?)
    }

    pub fn past_lifetime_extension(&self) -> f64 {
        self.past_lifetime_extension
    }

    pub fn set_past_lifetime_extension(&mut self, extension: f64) {
        self.past_lifetime_extension = extension;
    }

    pub fn future_lifetime_extension(&self) -> f64 {
        self.future_lifetime_extension
    }

    pub fn set_future_lifetime_extension(&mut self, extension: f64) {
        self.future_lifetime_extension = extension;
    }

    pub fn set_remove_rewound_entries(&mut self, remove: bool) {
        self.remove_rewound_entries = remove;
    }

    /// Default interval of a hit object: visible `preempt` ms before it
    /// starts and `linger` ms after it ends.
    pub fn initial_lifetime(&self, object: &HitObject) -> (f64, f64) {
        (
            object.start_time - self.preempt,
            object.end_time() + self.linger,
        )
    }

    /// Registers a top-level entry. It is evaluated on the next update.
    pub fn add_entry(&mut self, entry: LifetimeEntry) -> Result<EntryId> {
        let id = self.entries.add(entry, None)?;
        if let Some(entry) = self.entries.entry(id) {
            self.lifetimes.add_entry(id, entry);
        }
        debug!(?id, "top-level entry added");
        Ok(id)
    }

    /// Creates and registers a top-level entry for `entity`.
    pub fn add_entity<S>(&mut self, source: &S, entity: HitObjectId) -> Result<EntryId>
    where
        S: EntitySource + ?Sized,
    {
        let object = source
            .hit_object(entity)
            .ok_or(TimelineError::MissingEntity(entity))?;
        let (start, end) = self.initial_lifetime(object);
        self.add_entry(LifetimeEntry::new(entity, start, end))
    }

    /// Removes an entry and its nested entries, tearing down whatever is
    /// alive first. Returns `false` for unknown entries.
    pub fn remove_entry(&mut self, id: EntryId) -> Result<bool> {
        if self.entries.entry(id).is_none() {
            return Ok(false);
        }

        if self.lifetimes.remove_entry(id) {
            for event in self.lifetimes.drain_events() {
                match event {
                    LifetimeEvent::BecameDead(dead) if self.alive.contains_key(&dead) => {
                        self.deactivate(dead)?
                    }
                    other => trace!(?other, "ignored event on removal"),
                }
            }
        }
        if self.alive.contains_key(&id) {
            self.deactivate(id)?;
        }
        self.unattached.remove(&id);

        let removed = self.entries.remove(id)?;
        debug!(?id, count = removed.len(), "entries removed");
        Ok(true)
    }

    pub fn remove_entity(&mut self, entity: HitObjectId) -> Result<bool> {
        match self.entries.get(entity) {
            Some(id) => self.remove_entry(id),
            None => Ok(false),
        }
    }

    /// Updates an entry's interval and notifies the sweep and listeners.
    pub fn set_lifetime(&mut self, id: EntryId, start: f64, end: f64) -> Result<bool> {
        let entry = self
            .entries
            .entry_mut(id)
            .ok_or(TimelineError::UnknownEntry(id))?;
        if !entry.set_lifetime(start, end) {
            return Ok(false);
        }
        self.lifetime_changed(id);
        Ok(true)
    }

    pub fn set_keep_alive(&mut self, id: EntryId, keep_alive: bool) -> Result<bool> {
        let entry = self
            .entries
            .entry_mut(id)
            .ok_or(TimelineError::UnknownEntry(id))?;
        if !entry.set_keep_alive(keep_alive) {
            return Ok(false);
        }
        self.lifetime_changed(id);
        Ok(true)
    }

    /// Evaluates the window around `time` and applies the resulting
    /// activations. Returns whether the alive set changed.
    ///
    /// Every event of the sweep is applied even when one of them fails; the
    /// first failure is returned afterwards. An entry that could not be
    /// attached stays out of the alive set until the sweep drops it.
    pub fn update<S>(&mut self, source: &S, time: f64) -> Result<bool>
    where
        S: EntitySource + ?Sized,
    {
        let window_start = time - self.past_lifetime_extension;
        let window_end = time + self.future_lifetime_extension;
        let changed = self.lifetimes.update(window_start, window_end);

        let mut first_error = None;
        for event in self.lifetimes.drain_events() {
            let outcome = match event {
                LifetimeEvent::BecameAlive(id) => {
                    let outcome = self.activate(source, id, None);
                    if outcome.is_err() && !self.alive.contains_key(&id) {
                        self.unattached.insert(id);
                    }
                    outcome
                }
                LifetimeEvent::BecameDead(id) if self.unattached.remove(&id) => {
                    trace!(?id, "unattached entry left the window");
                    Ok(())
                }
                LifetimeEvent::BecameDead(id) => self.deactivate(id),
                LifetimeEvent::CrossedBoundary {
                    entry,
                    kind,
                    direction,
                } => self.crossed_boundary(entry, kind, direction),
            };
            if let Err(err) = outcome {
                warn!(error = %err, "lifetime event could not be applied");
                first_error.get_or_insert(err);
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(changed),
        }
    }

    /// Entries the sweep considers alive that have no representation.
    pub fn unattached_entries(&self) -> Vec<EntryId> {
        let mut entries: Vec<_> = self.unattached.iter().copied().collect();
        entries.sort_unstable();
        entries
    }

    /// Re-binds an entity after its defaults were re-applied.
    ///
    /// Nested entries whose entities are gone are removed; if the entity is
    /// alive, its representation is rebound in place and new nested entities
    /// are attached.
    pub fn rebind<S>(&mut self, source: &S, entity: HitObjectId) -> Result<bool>
    where
        S: EntitySource + ?Sized,
    {
        let Some(id) = self.entries.get(entity) else {
            return Ok(false);
        };
        let object = source
            .hit_object(entity)
            .ok_or(TimelineError::MissingEntity(entity))?;

        let stale: Vec<_> = self
            .entries
            .entry(id)
            .map(|entry| entry.nested().to_vec())
            .unwrap_or_default()
            .into_iter()
            .filter(|child| {
                self.entries
                    .entry(*child)
                    .map_or(true, |entry| !object.nested.contains(&entry.owner()))
            })
            .collect();
        for child in stale {
            self.remove_entry(child)?;
        }

        let Some(handle) = self.alive.get(&id).copied() else {
            return Ok(true);
        };

        if let (Some(entry), Some(representation)) =
            (self.entries.entry(id), self.pools.get_mut(handle))
        {
            representation.apply(&Binding {
                entity,
                hit_object: object,
                entry,
                parent: self.entries.parent_of(id),
            });
        }
        self.render.set_depth(handle, object.start_time);

        for child_entity in &object.nested {
            let child = self.nested_entry(source, entity, *child_entity)?;
            if self.alive.contains_key(&child) {
                self.rebind(source, *child_entity)?;
            } else {
                self.activate(source, child, Some(handle))?;
            }
        }
        trace!(?id, ?entity, "representation rebound");
        Ok(true)
    }

    /// Bubbles a judgement from an alive entity up to its top-level entity.
    pub fn report_result(&mut self, entity: HitObjectId, result: HitResult) -> Result<()> {
        let id = self
            .entries
            .get(entity)
            .ok_or(TimelineError::MissingEntity(entity))?;
        if !self.alive.contains_key(&id) {
            return Err(TimelineError::NotAttached(id));
        }

        let mut root = id;
        while let Some(parent) = self.entries.parent_entry(root) {
            root = parent;
        }
        let root = self
            .entries
            .entry(root)
            .map(LifetimeEntry::owner)
            .ok_or(TimelineError::UnknownEntry(root))?;

        trace!(source = ?entity, ?root, ?result, "new result");
        self.events.push(ContainerEvent::NewResult {
            source: entity,
            root,
            result,
        });
        Ok(())
    }

    /// Removes every entry, tearing down alive ones.
    pub fn clear(&mut self) -> Result<()> {
        for id in self.entries.top_level() {
            self.remove_entry(id)?;
        }
        debug_assert!(self.alive.is_empty(), "entries left alive after clear");
        self.lifetimes.clear();
        self.entries.clear();
        self.render.clear();
        self.listeners.clear();
        self.unattached.clear();
        Ok(())
    }

    /// Takes the events produced since the last call.
    pub fn drain_events(&mut self) -> Vec<ContainerEvent> {
        std::mem::take(&mut self.events)
    }

    fn lifetime_changed(&mut self, id: EntryId) {
        let Some(entry) = self.entries.entry(id) else {
            return;
        };
        self.lifetimes.lifetime_changed(id, entry);
        if self.listeners.contains(&id) {
            self.events.push(ContainerEvent::IntervalChanged {
                entry: id,
                entity: entry.owner(),
            });
        }
    }

    fn crossed_boundary(
        &mut self,
        id: EntryId,
        kind: BoundaryKind,
        direction: CrossingDirection,
    ) -> Result<()> {
        // The entry may already be gone if a handler removed it this frame.
        let Some(entity) = self.entries.entry(id).map(LifetimeEntry::owner) else {
            return Ok(());
        };
        self.events.push(ContainerEvent::CrossedBoundary {
            entry: id,
            entity,
            kind,
            direction,
        });

        if self.remove_rewound_entries
            && kind == BoundaryKind::Start
            && direction == CrossingDirection::Backward
        {
            debug!(?id, ?entity, "removing rewound entry");
            self.remove_entry(id)?;
        }
        Ok(())
    }

    fn activate<S>(
        &mut self,
        source: &S,
        id: EntryId,
        parent_handle: Option<RepresentationHandle>,
    ) -> Result<()>
    where
        S: EntitySource + ?Sized,
    {
        if self.alive.contains_key(&id) {
            debug_assert!(false, "entry {id} activated twice");
            return Err(TimelineError::AlreadyAttached(id));
        }

        let entry = self
            .entries
            .entry(id)
            .ok_or(TimelineError::UnknownEntry(id))?;
        let entity = entry.owner();
        let object = source
            .hit_object(entity)
            .ok_or(TimelineError::MissingEntity(entity))?;
        let parent = self.entries.parent_of(id);

        let handle = self.pools.acquire(object.kind, |representation| {
            representation.apply(&Binding {
                entity,
                hit_object: object,
                entry,
                parent,
            })
        })?;

        if let Err(err) = self.render.attach(handle, id, parent_handle, object.start_time) {
            self.pools.release(handle)?;
            return Err(err);
        }

        self.alive.insert(id, handle);
        self.listeners.insert(id);
        trace!(?id, ?entity, ?handle, "representation attached");
        self.events.push(ContainerEvent::BecameAlive { entry: id, entity });
        if parent.is_none() {
            self.events.push(ContainerEvent::UsageBegan(entity));
        }

        for child_entity in &object.nested {
            let child = self.nested_entry(source, entity, *child_entity)?;
            self.activate(source, child, Some(handle))?;
        }
        Ok(())
    }

    fn deactivate(&mut self, id: EntryId) -> Result<()> {
        if !self.alive.contains_key(&id) {
            debug_assert!(false, "entry {id} deactivated while not alive");
            return Err(TimelineError::NotAttached(id));
        }
        self.listeners.remove(&id);

        let (entity, nested) = self
            .entries
            .entry(id)
            .map(|entry| (entry.owner(), entry.nested().to_vec()))
            .ok_or(TimelineError::UnknownEntry(id))?;
        for child in nested {
            if self.alive.contains_key(&child) {
                self.deactivate(child)?;
            }
        }

        let handle = self
            .alive
            .remove(&id)
            .ok_or(TimelineError::NotAttached(id))?;
        self.render.detach(handle, id)?;
        self.pools.release(handle)?;
        trace!(?id, ?entity, ?handle, "representation released");

        self.events.push(ContainerEvent::BecameDead { entry: id, entity });
        if !self.entries.is_nested(id) {
            self.events.push(ContainerEvent::UsageFinished(entity));
        }
        Ok(())
    }

    /// Entry of a nested entity, created on first use.
    fn nested_entry<S>(
        &mut self,
        source: &S,
        parent: HitObjectId,
        entity: HitObjectId,
    ) -> Result<EntryId>
    where
        S: EntitySource + ?Sized,
    {
        if let Some(id) = self.entries.get(entity) {
            return Ok(id);
        }
        let object = source
            .hit_object(entity)
            .ok_or(TimelineError::MissingEntity(entity))?;
        let (start, end) = self.initial_lifetime(object);
        self.entries
            .add(LifetimeEntry::new(entity, start, end), Some(parent))
    }
}
