use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};

use tracing::trace;

use super::LifetimeEntry;
use crate::ids::EntryId;

/// Where an entry sits relative to the last evaluated window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifetimeState {
    /// Registered but not evaluated yet.
    New,
    Future,
    Current,
    Past,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BoundaryKind {
    Start,
    End,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CrossingDirection {
    Forward,
    Backward,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifetimeEvent {
    BecameAlive(EntryId),
    BecameDead(EntryId),
    CrossedBoundary {
        entry: EntryId,
        kind: BoundaryKind,
        direction: CrossingDirection,
    },
}

/// Totally ordered time value for use as an index key.
#[derive(Debug, Clone, Copy)]
struct TimeKey(f64);

impl PartialEq for TimeKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for TimeKey {}

impl PartialOrd for TimeKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimeKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct IndexKey {
    primary: TimeKey,
    secondary: TimeKey,
    seq: u64,
    id: EntryId,
}

#[derive(Debug, Clone, Copy)]
struct Tracked {
    state: LifetimeState,
    seq: u64,
    start: f64,
    end: f64,
    /// Waiting in the queue for evaluation instead of sitting in an index.
    queued: bool,
}

impl Tracked {
    fn by_start(&self, id: EntryId) -> IndexKey {
        IndexKey {
            primary: TimeKey(self.start),
            secondary: TimeKey(self.end),
            seq: self.seq,
            id,
        }
    }

    fn by_end(&self, id: EntryId) -> IndexKey {
        IndexKey {
            primary: TimeKey(self.end),
            secondary: TimeKey(self.start),
            seq: self.seq,
            id,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Transition {
    id: EntryId,
    old: LifetimeState,
    new: LifetimeState,
    start: f64,
    end: f64,
    seq: u64,
}

fn state_for(start: f64, end: f64, window_start: f64, window_end: f64) -> LifetimeState {
    if window_end < start {
        LifetimeState::Future
    } else if window_start >= end {
        LifetimeState::Past
    } else {
        LifetimeState::Current
    }
}

/// Incremental sweep over entry intervals.
///
/// Dead entries live in two ordered indexes (future ones by start, past ones
/// by end) and alive entries in two more (by start and by end). An update only
/// pops entries off the ends of those indexes while they cross a boundary, so
/// the cost of a frame follows the number of crossings, not the entry count.
///
/// Events are queued and handed out by [`LifetimeEntryManager::drain_events`]
/// after the sweep, so consumers can add or remove entries in response without
/// touching the indexes mid-iteration.
#[derive(Debug, Default)]
pub struct LifetimeEntryManager {
    tracked: HashMap<EntryId, Tracked>,
    queued: Vec<EntryId>,
    future: BTreeSet<IndexKey>,
    past: BTreeSet<IndexKey>,
    alive_by_start: BTreeSet<IndexKey>,
    alive_by_end: BTreeSet<IndexKey>,
    next_seq: u64,
    events: Vec<LifetimeEvent>,
}

impl LifetimeEntryManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tracked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracked.is_empty()
    }

    pub fn contains(&self, id: EntryId) -> bool {
        self.tracked.contains_key(&id)
    }

    pub fn state(&self, id: EntryId) -> Option<LifetimeState> {
        self.tracked.get(&id).map(|tracked| tracked.state)
    }

    pub fn is_alive(&self, id: EntryId) -> bool {
        self.state(id) == Some(LifetimeState::Current)
    }

    pub fn alive_count(&self) -> usize {
        self.tracked
            .values()
            .filter(|tracked| tracked.state == LifetimeState::Current)
            .count()
    }

    /// Alive entries in registration order.
    pub fn alive_entries(&self) -> Vec<EntryId> {
        let mut alive: Vec<_> = self
            .tracked
            .iter()
            .filter(|(_, tracked)| tracked.state == LifetimeState::Current)
            .map(|(id, tracked)| (tracked.seq, *id))
            .collect();
        alive.sort_unstable();
        alive.into_iter().map(|(_, id)| id).collect()
    }

    /// Registers an entry. It is evaluated on the next [`update`](Self::update).
    pub fn add_entry(&mut self, id: EntryId, entry: &LifetimeEntry) -> bool {
        if self.tracked.contains_key(&id) {
            return false;
        }

        self.next_seq += 1;
        let (start, end) = entry.bounds();
        self.tracked.insert(
            id,
            Tracked {
                state: LifetimeState::New,
                seq: self.next_seq,
                start,
                end,
                queued: true,
            },
        );
        self.queued.push(id);
        true
    }

    /// Unregisters an entry, queueing `BecameDead` first if it was alive.
    pub fn remove_entry(&mut self, id: EntryId) -> bool {
        let Some(tracked) = self.tracked.remove(&id) else {
            return false;
        };

        if tracked.queued {
            self.queued.retain(|queued| *queued != id);
        } else {
            self.unindex(id, &tracked);
        }

        if tracked.state == LifetimeState::Current {
            trace!(?id, "entry became dead on removal");
            self.events.push(LifetimeEvent::BecameDead(id));
        }
        true
    }

    /// Change notification: re-indexes an entry whose effective interval moved.
    ///
    /// The entry keeps its state until the next update re-evaluates it.
    pub fn lifetime_changed(&mut self, id: EntryId, entry: &LifetimeEntry) -> bool {
        let Some(tracked) = self.tracked.get(&id).copied() else {
            return false;
        };

        let (start, end) = entry.bounds();
        if tracked.start == start && tracked.end == end {
            return false;
        }

        if !tracked.queued {
            self.unindex(id, &tracked);
            self.queued.push(id);
        }

        if let Some(tracked) = self.tracked.get_mut(&id) {
            tracked.start = start;
            tracked.end = end;
            tracked.queued = true;
        }
        true
    }

    /// Drops every registration without emitting events.
    pub fn clear(&mut self) {
        self.tracked.clear();
        self.queued.clear();
        self.future.clear();
        self.past.clear();
        self.alive_by_start.clear();
        self.alive_by_end.clear();
        self.events.clear();
    }

    /// Re-evaluates every entry against `[window_start, window_end]`.
    ///
    /// Returns whether any entry became alive or dead.
    pub fn update(&mut self, window_start: f64, window_end: f64) -> bool {
        let window_end = window_end.max(window_start);
        let mut transitions = Vec::new();

        for id in std::mem::take(&mut self.queued) {
            let Some(tracked) = self.tracked.get_mut(&id) else {
                continue;
            };
            tracked.queued = false;
            let old = tracked.state;
            tracked.state = state_for(tracked.start, tracked.end, window_start, window_end);
            let tracked = *tracked;

            self.index(id, &tracked);
            if old != tracked.state {
                transitions.push(Transition {
                    id,
                    old,
                    new: tracked.state,
                    start: tracked.start,
                    end: tracked.end,
                    seq: tracked.seq,
                });
            }
        }

        while let Some(key) = self.future.first().copied() {
            if window_end < key.primary.0 {
                break;
            }
            self.future.remove(&key);
            self.relocate(key.id, window_start, window_end, &mut transitions);
        }

        while let Some(key) = self.past.last().copied() {
            if window_start >= key.primary.0 {
                break;
            }
            self.past.remove(&key);
            self.relocate(key.id, window_start, window_end, &mut transitions);
        }

        while let Some(key) = self.alive_by_end.first().copied() {
            if window_start < key.primary.0 {
                break;
            }
            self.remove_alive(key.id);
            self.relocate(key.id, window_start, window_end, &mut transitions);
        }

        while let Some(key) = self.alive_by_start.last().copied() {
            if window_end >= key.primary.0 {
                break;
            }
            self.remove_alive(key.id);
            self.relocate(key.id, window_start, window_end, &mut transitions);
        }

        transitions.sort_by(|a, b| {
            a.start
                .total_cmp(&b.start)
                .then(a.end.total_cmp(&b.end))
                .then(a.seq.cmp(&b.seq))
        });

        let mut alive_changed = false;
        for transition in &transitions {
            if transition.new == LifetimeState::Current {
                trace!(id = ?transition.id, "entry became alive");
                self.events.push(LifetimeEvent::BecameAlive(transition.id));
                alive_changed = true;
            } else if transition.old == LifetimeState::Current {
                trace!(id = ?transition.id, "entry became dead");
                self.events.push(LifetimeEvent::BecameDead(transition.id));
                alive_changed = true;
            }
        }

        for transition in &transitions {
            self.push_crossings(transition);
        }

        alive_changed
    }

    /// Takes the events produced since the last call.
    pub fn drain_events(&mut self) -> Vec<LifetimeEvent> {
        std::mem::take(&mut self.events)
    }

    fn relocate(
        &mut self,
        id: EntryId,
        window_start: f64,
        window_end: f64,
        transitions: &mut Vec<Transition>,
    ) {
        let Some(tracked) = self.tracked.get_mut(&id) else {
            return;
        };
        let old = tracked.state;
        tracked.state = state_for(tracked.start, tracked.end, window_start, window_end);
        let tracked = *tracked;
        debug_assert_ne!(old, tracked.state, "relocated entry kept its state");

        self.index(id, &tracked);
        transitions.push(Transition {
            id,
            old,
            new: tracked.state,
            start: tracked.start,
            end: tracked.end,
            seq: tracked.seq,
        });
    }

    fn remove_alive(&mut self, id: EntryId) {
        if let Some(tracked) = self.tracked.get(&id).copied() {
            self.alive_by_start.remove(&tracked.by_start(id));
            self.alive_by_end.remove(&tracked.by_end(id));
        }
    }

    fn index(&mut self, id: EntryId, tracked: &Tracked) {
        match tracked.state {
            LifetimeState::New => {}
            LifetimeState::Future => {
                self.future.insert(tracked.by_start(id));
            }
            LifetimeState::Past => {
                self.past.insert(tracked.by_end(id));
            }
            LifetimeState::Current => {
                self.alive_by_start.insert(tracked.by_start(id));
                self.alive_by_end.insert(tracked.by_end(id));
            }
        }
    }

    fn unindex(&mut self, id: EntryId, tracked: &Tracked) {
        match tracked.state {
            LifetimeState::New => {}
            LifetimeState::Future => {
                self.future.remove(&tracked.by_start(id));
            }
            LifetimeState::Past => {
                self.past.remove(&tracked.by_end(id));
            }
            LifetimeState::Current => {
                self.alive_by_start.remove(&tracked.by_start(id));
                self.alive_by_end.remove(&tracked.by_end(id));
            }
        }
    }

    fn push_crossings(&mut self, transition: &Transition) {
        use BoundaryKind::{End, Start};
        use CrossingDirection::{Backward, Forward};
        use LifetimeState::{Current, Future, New, Past};

        let transition_states = (transition.old, transition.new);
        let crossings: &[(BoundaryKind, CrossingDirection)] = match transition_states {
            (Future, Current) => &[(Start, Forward)],
            (Future, Past) => &[(Start, Forward), (End, Forward)],
            (Current, Past) => &[(End, Forward)],
            (Current, Future) => &[(Start, Backward)],
            (Past, Current) => &[(End, Backward)],
            (Past, Future) => &[(End, Backward), (Start, Backward)],
            (New, _) | (_, New) | (Future, Future) | (Current, Current) | (Past, Past) => &[],
        };

        for &(kind, direction) in crossings {
            self.events.push(LifetimeEvent::CrossedBoundary {
                entry: transition.id,
                kind,
                direction,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{Arena, HitObjectId};

    struct Fixture {
        owners: Arena<HitObjectId, ()>,
        entries: Arena<EntryId, LifetimeEntry>,
        manager: LifetimeEntryManager,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                owners: Arena::new(),
                entries: Arena::new(),
                manager: LifetimeEntryManager::new(),
            }
        }

        fn add(&mut self, start: f64, end: f64) -> EntryId {
            let owner = self.owners.insert(());
            let id = self.entries.insert(LifetimeEntry::new(owner, start, end));
            assert!(self.manager.add_entry(id, &self.entries.get(id).unwrap().clone()));
            id
        }

        fn set_lifetime(&mut self, id: EntryId, start: f64, end: f64) {
            let entry = self.entries.get_mut(id).unwrap();
            if entry.set_lifetime(start, end) {
                let entry = entry.clone();
                self.manager.lifetime_changed(id, &entry);
            }
        }

        fn set_keep_alive(&mut self, id: EntryId, keep_alive: bool) {
            let entry = self.entries.get_mut(id).unwrap();
            if entry.set_keep_alive(keep_alive) {
                let entry = entry.clone();
                self.manager.lifetime_changed(id, &entry);
            }
        }

        fn step(&mut self, start: f64, end: f64) -> Vec<LifetimeEvent> {
            self.manager.update(start, end);
            self.manager.drain_events()
        }
    }

    fn crossing(entry: EntryId, kind: BoundaryKind, direction: CrossingDirection) -> LifetimeEvent {
        LifetimeEvent::CrossedBoundary {
            entry,
            kind,
            direction,
        }
    }

    #[test]
    fn entry_becomes_alive_and_dead_as_window_sweeps_forward() {
        let mut fx = Fixture::new();
        let entry = fx.add(1000.0, 2000.0);

        assert!(fx.step(500.0, 900.0).is_empty());
        assert!(!fx.manager.is_alive(entry));

        assert_eq!(
            fx.step(1500.0, 1500.0),
            vec![
                LifetimeEvent::BecameAlive(entry),
                crossing(entry, BoundaryKind::Start, CrossingDirection::Forward),
            ]
        );
        assert!(fx.manager.is_alive(entry));

        assert_eq!(
            fx.step(2500.0, 2500.0),
            vec![
                LifetimeEvent::BecameDead(entry),
                crossing(entry, BoundaryKind::End, CrossingDirection::Forward),
            ]
        );
    }

    #[test]
    fn backward_seek_crosses_end_then_start() {
        let mut fx = Fixture::new();
        let entry = fx.add(1000.0, 2000.0);
        fx.step(500.0, 900.0);
        fx.step(1500.0, 1500.0);
        fx.step(2500.0, 2500.0);

        assert_eq!(
            fx.step(400.0, 400.0),
            vec![
                crossing(entry, BoundaryKind::End, CrossingDirection::Backward),
                crossing(entry, BoundaryKind::Start, CrossingDirection::Backward),
            ]
        );
        assert_eq!(fx.manager.state(entry), Some(LifetimeState::Future));
    }

    #[test]
    fn jumping_over_an_entry_reports_both_crossings_without_aliveness() {
        let mut fx = Fixture::new();
        let entry = fx.add(1000.0, 2000.0);
        fx.step(0.0, 0.0);

        assert_eq!(
            fx.step(5000.0, 5000.0),
            vec![
                crossing(entry, BoundaryKind::Start, CrossingDirection::Forward),
                crossing(entry, BoundaryKind::End, CrossingDirection::Forward),
            ]
        );
    }

    #[test]
    fn new_entries_wait_for_the_next_update() {
        let mut fx = Fixture::new();
        fx.step(1500.0, 1500.0);
        let entry = fx.add(1000.0, 2000.0);

        assert!(!fx.manager.is_alive(entry));
        assert_eq!(fx.step(1500.0, 1500.0), vec![LifetimeEvent::BecameAlive(entry)]);
    }

    #[test]
    fn identical_window_produces_no_events() {
        let mut fx = Fixture::new();
        for i in 0..10 {
            fx.add(i as f64 * 100.0, i as f64 * 100.0 + 250.0);
        }

        assert!(fx.manager.update(300.0, 400.0));
        assert!(!fx.manager.drain_events().is_empty());

        assert!(!fx.manager.update(300.0, 400.0));
        assert!(fx.manager.drain_events().is_empty());
    }

    #[test]
    fn aliveness_matches_interval_overlap_after_arbitrary_windows() {
        let mut fx = Fixture::new();
        let bounds: Vec<(f64, f64)> = (0..40)
            .map(|i| {
                let start = (i * 37 % 500) as f64 * 10.0;
                (start, start + ((i * 13) % 7 + 1) as f64 * 90.0)
            })
            .collect();
        let ids: Vec<_> = bounds.iter().map(|(s, e)| fx.add(*s, *e)).collect();

        let windows = [
            (0.0, 100.0),
            (120.0, 180.0),
            (4000.0, 4300.0),
            (50.0, 60.0),
            (2500.0, 2500.0),
            (2510.0, 2600.0),
            (-100.0, 10000.0),
            (700.0, 650.0),
        ];
        for (start, end) in windows {
            fx.step(start, end);
            let end = f64::max(start, end);
            for (id, (s, e)) in ids.iter().zip(&bounds) {
                assert_eq!(
                    fx.manager.is_alive(*id),
                    *s <= end && start < *e,
                    "entry [{s}, {e}) in window [{start}, {end}]"
                );
            }
        }
    }

    #[test]
    fn each_entry_fires_at_most_once_per_sweep() {
        let mut fx = Fixture::new();
        let ids: Vec<_> = (0..20)
            .map(|i| fx.add(i as f64 * 50.0, i as f64 * 50.0 + 75.0))
            .collect();
        fx.step(0.0, 0.0);

        let events = fx.step(400.0, 600.0);
        for id in ids {
            let alive = events
                .iter()
                .filter(|e| **e == LifetimeEvent::BecameAlive(id))
                .count();
            let dead = events
                .iter()
                .filter(|e| **e == LifetimeEvent::BecameDead(id))
                .count();
            assert!(alive <= 1 && dead <= 1);
            assert!(alive + dead <= 1);
        }
    }

    #[test]
    fn event_order_ignores_insertion_order() {
        let bounds = [(300.0, 400.0), (100.0, 900.0), (100.0, 200.0), (250.0, 260.0)];

        let run = |order: &[usize]| {
            let mut fx = Fixture::new();
            let mut ids = vec![None; bounds.len()];
            for &i in order {
                ids[i] = Some(fx.add(bounds[i].0, bounds[i].1));
            }
            fx.step(0.0, 0.0);
            let events = fx.step(150.0, 350.0);
            events
                .into_iter()
                .map(|event| match event {
                    LifetimeEvent::BecameAlive(id) => {
                        ("alive", ids.iter().position(|x| *x == Some(id)).unwrap())
                    }
                    LifetimeEvent::BecameDead(id) => {
                        ("dead", ids.iter().position(|x| *x == Some(id)).unwrap())
                    }
                    LifetimeEvent::CrossedBoundary { entry, .. } => {
                        ("cross", ids.iter().position(|x| *x == Some(entry)).unwrap())
                    }
                })
                .collect::<Vec<_>>()
        };

        let forward = run(&[0, 1, 2, 3]);
        assert_eq!(forward, run(&[3, 2, 1, 0]));
        assert_eq!(forward, run(&[1, 3, 0, 2]));
        assert_eq!(
            &forward[..4],
            &[("alive", 2), ("alive", 1), ("alive", 3), ("alive", 0)]
        );
    }

    #[test]
    fn removing_an_alive_entry_fires_became_dead() {
        let mut fx = Fixture::new();
        let entry = fx.add(0.0, 100.0);
        fx.step(50.0, 50.0);

        assert!(fx.manager.remove_entry(entry));
        assert_eq!(fx.manager.drain_events(), vec![LifetimeEvent::BecameDead(entry)]);
        assert!(!fx.manager.remove_entry(entry));
        assert!(fx.step(60.0, 60.0).is_empty());
    }

    #[test]
    fn removing_a_dead_entry_is_silent() {
        let mut fx = Fixture::new();
        let entry = fx.add(1000.0, 2000.0);
        fx.step(0.0, 0.0);

        assert!(fx.manager.remove_entry(entry));
        assert!(fx.manager.drain_events().is_empty());
        assert!(fx.manager.is_empty());
    }

    #[test]
    fn lifetime_change_moves_entry_on_next_update() {
        let mut fx = Fixture::new();
        let entry = fx.add(1000.0, 2000.0);
        fx.step(500.0, 500.0);

        fx.set_lifetime(entry, 0.0, 600.0);
        assert_eq!(fx.manager.state(entry), Some(LifetimeState::Future));
        assert_eq!(
            fx.step(500.0, 500.0),
            vec![
                LifetimeEvent::BecameAlive(entry),
                crossing(entry, BoundaryKind::Start, CrossingDirection::Forward),
            ]
        );

        fx.set_lifetime(entry, 0.0, 800.0);
        assert!(fx.step(500.0, 500.0).is_empty());
        assert!(fx.manager.is_alive(entry));

        fx.set_lifetime(entry, 0.0, 300.0);
        assert_eq!(
            fx.step(500.0, 500.0),
            vec![
                LifetimeEvent::BecameDead(entry),
                crossing(entry, BoundaryKind::End, CrossingDirection::Forward),
            ]
        );
    }

    #[test]
    fn keep_alive_treats_interval_as_infinite_until_lifted() {
        let mut fx = Fixture::new();
        let entry = fx.add(100.0, 200.0);
        fx.step(5000.0, 5000.0);
        assert!(!fx.manager.is_alive(entry));

        fx.set_keep_alive(entry, true);
        fx.step(5000.0, 5000.0);
        assert!(fx.manager.is_alive(entry));

        fx.set_keep_alive(entry, false);
        assert_eq!(
            fx.step(5000.0, 5000.0),
            vec![
                LifetimeEvent::BecameDead(entry),
                crossing(entry, BoundaryKind::End, CrossingDirection::Forward),
            ]
        );
        fx.step(150.0, 150.0);
        assert!(fx.manager.is_alive(entry));
    }

    #[test]
    fn end_bound_is_exclusive() {
        let mut fx = Fixture::new();
        let entry = fx.add(100.0, 200.0);

        fx.step(100.0, 100.0);
        assert!(fx.manager.is_alive(entry));
        fx.step(200.0, 200.0);
        assert!(!fx.manager.is_alive(entry));
    }
}
