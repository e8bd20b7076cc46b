use tracing::{debug, trace};

use crate::beatmap::{EntitySource, HitObjectKind};
use crate::config::EngineConfig;
use crate::container::{ContainerEvent, HitResult, PooledLifetimeContainer};
use crate::ids::{EntryId, HitObjectId};
use crate::pool::{PoolRegistry, ScrollingRepresentation};
use crate::scroll::TimelineLayoutCache;
use crate::timeline::{FrameScheduler, FrameTask, PlaybackClock};
use crate::{Result, TimelineError};

/// Engine facade driven once per frame by the host.
///
/// Owns the pooled container, the optional scrolling layout and the
/// per-frame task queue. Entities are read from the [`EntitySource`] passed
/// to each call; the playfield never owns them.
#[derive(Debug)]
pub struct Playfield<R> {
    container: PooledLifetimeContainer<R>,
    layout: Option<TimelineLayoutCache>,
    scheduler: FrameScheduler,
    events: Vec<ContainerEvent>,
}

impl<R: ScrollingRepresentation> Playfield<R> {
    pub fn new(config: &EngineConfig, pools: PoolRegistry<R>) -> Self {
        Self {
            container: PooledLifetimeContainer::new(pools, &config.lifetime),
            layout: config.scroll.as_ref().map(TimelineLayoutCache::new),
            scheduler: FrameScheduler::new(),
            events: Vec::new(),
        }
    }

    /// Builds pools for every configured kind from one factory.
    pub fn with_factory<F>(config: &EngineConfig, factory: F) -> Self
    where
        F: Fn(HitObjectKind) -> R + Clone + 'static,
    {
        Self::new(config, PoolRegistry::from_config(&config.pools, factory))
    }

    pub fn container(&self) -> &PooledLifetimeContainer<R> {
        &self.container
    }

    pub fn layout(&self) -> Option<&TimelineLayoutCache> {
        self.layout.as_ref()
    }

    pub fn layout_mut(&mut self) -> Option<&mut TimelineLayoutCache> {
        self.layout.as_mut()
    }

    pub fn alive_count(&self) -> usize {
        self.container.alive_count()
    }

    pub fn representation(&self, entity: HitObjectId) -> Option<&R> {
        self.container
            .representation(self.container.entry_for(entity)?)
    }

    pub fn set_past_lifetime_extension(&mut self, extension: f64) {
        self.container.set_past_lifetime_extension(extension);
    }

    pub fn set_future_lifetime_extension(&mut self, extension: f64) {
        self.container.set_future_lifetime_extension(extension);
    }

    pub fn set_remove_rewound_entries(&mut self, remove: bool) {
        self.container.set_remove_rewound_entries(remove);
    }

    /// Starts tracking a top-level hit object.
    pub fn add_hit_object<S>(&mut self, source: &S, entity: HitObjectId) -> Result<EntryId>
    where
        S: EntitySource + ?Sized,
    {
        let object = source
            .hit_object(entity)
            .ok_or(TimelineError::MissingEntity(entity))?;
        if let Some(parent) = object.parent {
            return Err(TimelineError::msg(format!(
                "{entity} is nested in {parent} and follows its parent"
            )));
        }

        let id = self.container.add_entity(source, entity)?;
        if let Some(layout) = self.layout.as_mut() {
            let (start, end) = layout.computed_lifetime(object);
            self.container.set_lifetime(id, start, end)?;
        }
        Ok(id)
    }

    pub fn remove_hit_object(&mut self, entity: HitObjectId) -> Result<bool> {
        let removed = self.container.remove_entity(entity)?;
        self.collect_events();
        Ok(removed)
    }

    pub fn clear(&mut self) -> Result<()> {
        self.container.clear()?;
        self.scheduler.clear();
        self.collect_events();
        debug!("playfield cleared");
        Ok(())
    }

    /// Schedules a re-sync of an entity whose timing changed. Repeated calls
    /// within a frame are coalesced.
    pub fn timing_changed(&mut self, entity: HitObjectId) -> bool {
        self.scheduler.add_once(FrameTask::ApplyDefaults(entity))
    }

    /// Schedules every entity in `changed`, typically the edit queue of the
    /// beatmap. Returns how many were newly scheduled.
    pub fn schedule_changes<I>(&mut self, changed: I) -> usize
    where
        I: IntoIterator<Item = HitObjectId>,
    {
        changed
            .into_iter()
            .filter(|entity| self.timing_changed(*entity))
            .count()
    }

    /// Schedules a layout recomputation for an entity's entry.
    pub fn invalidate_layout(&mut self, entity: HitObjectId) -> bool {
        match self.container.entry_for(entity) {
            Some(id) => self.scheduler.add_once(FrameTask::InvalidateLayout(id)),
            None => false,
        }
    }

    pub fn set_keep_alive(&mut self, entity: HitObjectId, keep_alive: bool) -> Result<bool> {
        let id = self
            .container
            .entry_for(entity)
            .ok_or(TimelineError::MissingEntity(entity))?;
        let changed = self.container.set_keep_alive(id, keep_alive)?;
        self.collect_events();
        Ok(changed)
    }

    pub fn report_result(&mut self, entity: HitObjectId, result: HitResult) -> Result<()> {
        self.container.report_result(entity, result)?;
        self.collect_events();
        Ok(())
    }

    /// Runs one frame at the clock's current time. Returns whether the alive
    /// set changed.
    pub fn update<S>(&mut self, source: &S, clock: &PlaybackClock) -> Result<bool>
    where
        S: EntitySource + ?Sized,
    {
        let time = clock.current_time();
        if clock.is_seeking() {
            debug!(time, "updating after seek");
        }

        for task in self.scheduler.take() {
            trace!(?task, "running frame task");
            match task {
                FrameTask::ApplyDefaults(entity) => self.apply_defaults(source, entity)?,
                FrameTask::InvalidateLayout(id) => {
                    if let Some(layout) = self.layout.as_mut() {
                        layout.invalidate_entry(id);
                    }
                }
            }
        }

        if let Some(layout) = self.layout.as_mut() {
            layout.revalidate(source, &mut self.container)?;
        }

        let changed = self.container.update(source, time)?;
        self.collect_events();

        if let Some(layout) = self.layout.as_mut() {
            layout.update_after_children_life(source, &mut self.container, time)?;
            self.collect_events();
        }
        Ok(changed)
    }

    /// Takes the events produced since the last call.
    pub fn drain_events(&mut self) -> Vec<ContainerEvent> {
        std::mem::take(&mut self.events)
    }

    fn apply_defaults<S>(&mut self, source: &S, entity: HitObjectId) -> Result<()>
    where
        S: EntitySource + ?Sized,
    {
        let Some(id) = self.container.entry_for(entity) else {
            return Ok(());
        };
        if self.container.entries().is_nested(id) {
            return Ok(());
        }
        let object = source
            .hit_object(entity)
            .ok_or(TimelineError::MissingEntity(entity))?;

        let (start, end) = match self.layout.as_mut() {
            Some(layout) => layout.computed_lifetime(object),
            None => self.container.initial_lifetime(object),
        };
        self.container.set_lifetime(id, start, end)?;
        self.container.rebind(source, entity)?;
        if let Some(layout) = self.layout.as_mut() {
            layout.invalidate_entry(id);
        }
        self.collect_events();
        Ok(())
    }

    fn collect_events(&mut self) {
        for event in self.container.drain_events() {
            if let Some(layout) = self.layout.as_mut() {
                layout.handle_event(&event);
            }
            self.events.push(event);
        }
    }
}
