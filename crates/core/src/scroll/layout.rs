use std::collections::HashSet;

use tracing::debug;

use super::{algorithm_for, ScrollAlgorithm, ScrollingDirection};
use crate::beatmap::{EntitySource, HitObject};
use crate::config::ScrollConfig;
use crate::container::{ContainerEvent, PooledLifetimeContainer};
use crate::ids::EntryId;
use crate::pool::{Representation, ScrollingRepresentation};
use crate::{Result, TimelineError};

/// Derives positions and lengths from time for a scrolling timeline.
///
/// Lifetimes of every tracked entry depend on the scroll parameters and are
/// recomputed wholesale when one of them changes. Layout is computed only for
/// alive entries, once per activation, and positions are refreshed every
/// frame.
#[derive(Debug)]
pub struct TimelineLayoutCache {
    direction: ScrollingDirection,
    time_range: f64,
    scroll_length: f64,
    conservative_extent: f64,
    algorithm: Box<dyn ScrollAlgorithm>,
    valid: bool,
    layout_computed: HashSet<EntryId>,
}

impl TimelineLayoutCache {
    pub fn new(config: &ScrollConfig) -> Self {
        Self {
            direction: config.direction,
            time_range: config.time_range,
            scroll_length: config.scroll_length,
            conservative_extent: config.conservative_extent,
            algorithm: algorithm_for(config.algorithm, &config.control_points),
            valid: false,
            layout_computed: HashSet::new(),
        }
    }

    pub fn direction(&self) -> ScrollingDirection {
        self.direction
    }

    pub fn time_range(&self) -> f64 {
        self.time_range
    }

    pub fn scroll_length(&self) -> f64 {
        self.scroll_length
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn set_direction(&mut self, direction: ScrollingDirection) {
        if self.direction != direction {
            self.direction = direction;
            self.invalidate();
        }
    }

    pub fn set_time_range(&mut self, time_range: f64) {
        if self.time_range != time_range {
            self.time_range = time_range;
            self.invalidate();
        }
    }

    pub fn set_scroll_length(&mut self, scroll_length: f64) {
        if self.scroll_length != scroll_length {
            self.scroll_length = scroll_length;
            self.invalidate();
        }
    }

    pub fn set_algorithm(&mut self, algorithm: Box<dyn ScrollAlgorithm>) {
        self.algorithm = algorithm;
        self.invalidate();
    }

    /// Forces lifetimes and layouts to be recomputed on the next revalidation.
    pub fn invalidate(&mut self) {
        self.valid = false;
    }

    /// Marks one entry's layout as stale. Returns whether it had one.
    pub fn invalidate_entry(&mut self, id: EntryId) -> bool {
        self.layout_computed.remove(&id)
    }

    pub fn has_layout(&self, id: EntryId) -> bool {
        self.layout_computed.contains(&id)
    }

    /// Keeps cached layouts in step with container activity.
    pub fn handle_event(&mut self, event: &ContainerEvent) {
        match *event {
            ContainerEvent::BecameAlive { entry, .. }
            | ContainerEvent::BecameDead { entry, .. }
            | ContainerEvent::IntervalChanged { entry, .. } => {
                self.invalidate_entry(entry);
            }
            _ => {}
        }
    }

    pub fn position_at_time(
        &mut self,
        time: f64,
        current_time: f64,
        origin_time: Option<f64>,
    ) -> f64 {
        let position = self.algorithm.position_at(
            time,
            current_time,
            self.time_range,
            self.scroll_length,
            origin_time,
        );
        if self.direction.is_inverted() {
            -position
        } else {
            position
        }
    }

    pub fn time_at_position(&mut self, position: f64, current_time: f64) -> f64 {
        let position = if self.direction.is_inverted() {
            -position
        } else {
            position
        };
        self.algorithm
            .time_at(position, current_time, self.time_range, self.scroll_length)
    }

    pub fn length_at_time(&mut self, start_time: f64, end_time: f64) -> f64 {
        self.algorithm
            .length(start_time, end_time, self.time_range, self.scroll_length)
    }

    /// Earliest time the object can be on screen. Every object is assumed to
    /// extend `conservative_extent` past its anchor on the incoming side.
    pub fn display_start_time(&mut self, object: &HitObject) -> f64 {
        self.algorithm.display_start_time(
            object.start_time,
            self.conservative_extent,
            self.time_range,
            self.scroll_length,
        )
    }

    pub fn computed_lifetime(&mut self, object: &HitObject) -> (f64, f64) {
        let display_start = self.display_start_time(object);
        let start = (object.start_time - object.maximum_judgement_offset()).min(display_start);
        let end = object.end_time() + self.time_range;
        (start, end)
    }

    /// Recomputes every top-level lifetime if the cache was invalidated.
    pub fn revalidate<S, R>(
        &mut self,
        source: &S,
        container: &mut PooledLifetimeContainer<R>,
    ) -> Result<bool>
    where
        S: EntitySource + ?Sized,
        R: Representation,
    {
        if self.valid {
            return Ok(false);
        }

        self.layout_computed.clear();
        let entries = container.entries().top_level();
        for id in &entries {
            let object = hit_object_of(source, container, *id)?;
            let (start, end) = self.computed_lifetime(object);
            container.set_lifetime(*id, start, end)?;
        }

        self.algorithm.reset();
        self.valid = true;
        debug!(entries = entries.len(), "scroll layout revalidated");
        Ok(true)
    }

    /// Positions alive top-level entries at `current_time` and lays out the
    /// ones whose layout is stale, nested entries included.
    pub fn update_after_children_life<S, R>(
        &mut self,
        source: &S,
        container: &mut PooledLifetimeContainer<R>,
        current_time: f64,
    ) -> Result<()>
    where
        S: EntitySource + ?Sized,
        R: ScrollingRepresentation,
    {
        for id in container.alive_entries() {
            if container.entries().is_nested(id) {
                continue;
            }

            let start_time = hit_object_of(source, container, id)?.start_time;
            let position = self.position_at_time(start_time, current_time, None);
            if let Some(representation) = container.representation_mut(id) {
                representation.set_position(position);
            }

            if self.layout_computed.contains(&id) {
                continue;
            }
            self.update_layout_recursive(source, container, id, None)?;
            self.layout_computed.insert(id);
        }
        Ok(())
    }

    fn update_layout_recursive<S, R>(
        &mut self,
        source: &S,
        container: &mut PooledLifetimeContainer<R>,
        id: EntryId,
        parent_start_time: Option<f64>,
    ) -> Result<()>
    where
        S: EntitySource + ?Sized,
        R: ScrollingRepresentation,
    {
        let object = hit_object_of(source, container, id)?;
        let parent_start_time = parent_start_time.unwrap_or(object.start_time);

        if object.duration != 0.0 {
            let length = self.length_at_time(object.start_time, object.end_time());
            if let Some(representation) = container.representation_mut(id) {
                representation.set_length(length);
            }
        }

        let nested = container
            .entry(id)
            .map(|entry| entry.nested().to_vec())
            .unwrap_or_default();
        for child in nested {
            self.update_layout_recursive(source, container, child, Some(parent_start_time))?;

            let child_object = hit_object_of(source, container, child)?;
            // Nested objects are placed relative to their parent.
            let position = self.position_at_time(
                child_object.start_time,
                object.start_time,
                Some(parent_start_time),
            );
            if let Some(representation) = container.representation_mut(child) {
                representation.set_position(position);
            }

            let (start, end) = self.computed_lifetime(child_object);
            container.set_lifetime(child, start, end)?;
        }
        Ok(())
    }
}

fn hit_object_of<'s, S, R>(
    source: &'s S,
    container: &PooledLifetimeContainer<R>,
    id: EntryId,
) -> Result<&'s HitObject>
where
    S: EntitySource + ?Sized,
    R: Representation,
{
    let entity = container
        .entry(id)
        .map(|entry| entry.owner())
        .ok_or(TimelineError::UnknownEntry(id))?;
    source
        .hit_object(entity)
        .ok_or(TimelineError::MissingEntity(entity))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::beatmap::{Beatmap, HitObjectKind, SliderShape};
    use crate::config::{LifetimeConfig, PoolConfig, ScrollAlgorithmKind};
    use crate::pool::PoolRegistry;
    use crate::scene::DrawableHitObject;

    fn config(direction: ScrollingDirection) -> ScrollConfig {
        ScrollConfig {
            direction,
            time_range: 1000.0,
            scroll_length: 1000.0,
            conservative_extent: 100.0,
            algorithm: ScrollAlgorithmKind::Constant,
            control_points: Vec::new(),
        }
    }

    fn container() -> PooledLifetimeContainer<DrawableHitObject> {
        let pools: Vec<_> = HitObjectKind::ALL.into_iter().map(PoolConfig::for_kind).collect();
        PooledLifetimeContainer::new(
            PoolRegistry::from_config(&pools, DrawableHitObject::new),
            &LifetimeConfig::default(),
        )
    }

    #[test]
    fn lifetime_covers_display_start_and_judgement_window() {
        let mut beatmap = Beatmap::new();
        let circle = beatmap.add_circle(2000.0);
        let spinner = beatmap.add_spinner(2000.0, 500.0);
        let mut cache = TimelineLayoutCache::new(&config(ScrollingDirection::Left));

        assert_eq!(
            cache.computed_lifetime(beatmap.get(circle).unwrap()),
            (900.0, 3000.0)
        );
        assert_eq!(
            cache.computed_lifetime(beatmap.get(spinner).unwrap()),
            (900.0, 3500.0)
        );

        // A short time range lets the judgement window dominate.
        cache.set_time_range(100.0);
        assert_eq!(
            cache.computed_lifetime(beatmap.get(circle).unwrap()),
            (1850.0, 2100.0)
        );
    }

    #[test]
    fn inverted_directions_negate_positions() {
        let mut cache = TimelineLayoutCache::new(&config(ScrollingDirection::Right));
        assert_eq!(cache.position_at_time(2000.0, 1500.0, None), -500.0);
        assert_eq!(cache.time_at_position(-500.0, 1500.0), 2000.0);

        cache.set_direction(ScrollingDirection::Up);
        assert_eq!(cache.position_at_time(2000.0, 1500.0, None), 500.0);
    }

    #[test]
    fn only_actual_changes_invalidate() {
        let mut beatmap = Beatmap::new();
        beatmap.add_circle(0.0);
        let mut container = container();
        for id in beatmap.top_level() {
            container.add_entity(&beatmap, id).unwrap();
        }
        let mut cache = TimelineLayoutCache::new(&config(ScrollingDirection::Left));

        assert!(cache.revalidate(&beatmap, &mut container).unwrap());
        assert!(!cache.revalidate(&beatmap, &mut container).unwrap());

        cache.set_time_range(1000.0);
        cache.set_scroll_length(1000.0);
        cache.set_direction(ScrollingDirection::Left);
        assert!(cache.is_valid());

        cache.set_scroll_length(800.0);
        assert!(!cache.is_valid());
        assert!(cache.revalidate(&beatmap, &mut container).unwrap());
    }

    #[test]
    fn lays_out_alive_entries_and_their_nested_objects() {
        let mut beatmap = Beatmap::new();
        let slider = beatmap.add_slider(
            2000.0,
            500.0,
            SliderShape {
                repeats: 0,
                tick_interval: 0.0,
            },
        );
        let far = beatmap.add_circle(10_000.0);
        let mut container = container();
        let entry = container.add_entity(&beatmap, slider).unwrap();
        let far_entry = container.add_entity(&beatmap, far).unwrap();
        let mut cache = TimelineLayoutCache::new(&config(ScrollingDirection::Left));

        cache.revalidate(&beatmap, &mut container).unwrap();
        assert_eq!(container.entry(entry).unwrap().bounds(), (900.0, 3500.0));

        container.update(&beatmap, 1500.0).unwrap();
        for event in container.drain_events() {
            cache.handle_event(&event);
        }
        cache
            .update_after_children_life(&beatmap, &mut container, 1500.0)
            .unwrap();

        let drawable = container.representation(entry).unwrap();
        assert_eq!(drawable.position, 500.0);
        assert_eq!(drawable.length, 500.0);
        assert!(cache.has_layout(entry));
        assert!(!cache.has_layout(far_entry));

        let nested = container.entry(entry).unwrap().nested().to_vec();
        let head = container.representation(nested[0]).unwrap();
        let tail = container.representation(nested[1]).unwrap();
        assert_eq!(head.position, 0.0);
        assert_eq!(tail.position, 500.0);
        assert_eq!(container.entry(nested[0]).unwrap().bounds(), (900.0, 3000.0));
    }

    #[test]
    fn layout_is_computed_once_per_activation() {
        let mut beatmap = Beatmap::new();
        let spinner = beatmap.add_spinner(2000.0, 500.0);
        let mut container = container();
        let entry = container.add_entity(&beatmap, spinner).unwrap();
        let mut cache = TimelineLayoutCache::new(&config(ScrollingDirection::Left));
        cache.revalidate(&beatmap, &mut container).unwrap();

        container.update(&beatmap, 1500.0).unwrap();
        cache
            .update_after_children_life(&beatmap, &mut container, 1500.0)
            .unwrap();
        container.representation_mut(entry).unwrap().set_length(0.0);

        cache
            .update_after_children_life(&beatmap, &mut container, 1600.0)
            .unwrap();
        let drawable = container.representation(entry).unwrap();
        assert_eq!(drawable.position, 400.0);
        assert_eq!(drawable.length, 0.0);

        assert!(cache.invalidate_entry(entry));
        cache
            .update_after_children_life(&beatmap, &mut container, 1600.0)
            .unwrap();
        assert_eq!(container.representation(entry).unwrap().length, 500.0);
    }
}
