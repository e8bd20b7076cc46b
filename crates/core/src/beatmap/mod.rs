//! Entity side of the engine: hit objects and the beatmap that owns them.
//!
//! The engine never owns these. It reads them through [`EntitySource`] and is
//! told about timing changes by whoever edits the beatmap.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::ids::{Arena, HitObjectId};

/// Miss window used as the maximum judgement offset of clickable objects.
const MISS_WINDOW: f64 = 150.0;
/// Ticks closer than this to the end of their span are skipped.
const MIN_TICK_DISTANCE_FROM_END: f64 = 10.0;

/// Explicit discriminant used to pick a representation pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HitObjectKind {
    Circle,
    Slider,
    SliderHead,
    SliderTick,
    SliderRepeat,
    SliderTail,
    Spinner,
}

impl HitObjectKind {
    pub const ALL: [HitObjectKind; 7] = [
        HitObjectKind::Circle,
        HitObjectKind::Slider,
        HitObjectKind::SliderHead,
        HitObjectKind::SliderTick,
        HitObjectKind::SliderRepeat,
        HitObjectKind::SliderTail,
        HitObjectKind::Spinner,
    ];

    pub fn is_nested(self) -> bool {
        matches!(
            self,
            HitObjectKind::SliderHead
                | HitObjectKind::SliderTick
                | HitObjectKind::SliderRepeat
                | HitObjectKind::SliderTail
        )
    }
}

/// Parameters that drive nested object generation for sliders.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SliderShape {
    pub repeats: u32,
    /// Distance between ticks in milliseconds; zero disables ticks.
    pub tick_interval: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HitObject {
    pub kind: HitObjectKind,
    pub start_time: f64,
    pub duration: f64,
    pub parent: Option<HitObjectId>,
    pub nested: Vec<HitObjectId>,
    pub slider: Option<SliderShape>,
}

impl HitObject {
    fn new(kind: HitObjectKind, start_time: f64, duration: f64) -> Self {
        Self {
            kind,
            start_time,
            duration,
            parent: None,
            nested: Vec::new(),
            slider: None,
        }
    }

    pub fn end_time(&self) -> f64 {
        self.start_time + self.duration
    }

    /// How late the object can still be judged after its start time.
    pub fn maximum_judgement_offset(&self) -> f64 {
        match self.kind {
            HitObjectKind::Circle | HitObjectKind::SliderHead => MISS_WINDOW,
            _ => 0.0,
        }
    }
}

/// Read access to entities, as consumed by the engine.
pub trait EntitySource {
    fn hit_object(&self, id: HitObjectId) -> Option<&HitObject>;
}

/// Arena-backed list of hit objects with explicit parent ids.
#[derive(Debug, Default)]
pub struct Beatmap {
    objects: Arena<HitObjectId, HitObject>,
    changed: Vec<HitObjectId>,
}

impl EntitySource for Beatmap {
    fn hit_object(&self, id: HitObjectId) -> Option<&HitObject> {
        self.objects.get(id)
    }
}

impl Beatmap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of objects, nested ones included.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn get(&self, id: HitObjectId) -> Option<&HitObject> {
        self.objects.get(id)
    }

    pub fn add_circle(&mut self, start_time: f64) -> HitObjectId {
        self.objects
            .insert(HitObject::new(HitObjectKind::Circle, start_time, 0.0))
    }

    pub fn add_spinner(&mut self, start_time: f64, duration: f64) -> HitObjectId {
        self.objects
            .insert(HitObject::new(HitObjectKind::Spinner, start_time, duration))
    }

    pub fn add_slider(
        &mut self,
        start_time: f64,
        duration: f64,
        shape: SliderShape,
    ) -> HitObjectId {
        let mut slider = HitObject::new(HitObjectKind::Slider, start_time, duration);
        slider.slider = Some(shape);
        let id = self.objects.insert(slider);
        self.create_nested(id);
        id
    }

    /// Top-level objects ordered by start time.
    pub fn top_level(&self) -> Vec<HitObjectId> {
        let mut ids: Vec<_> = self
            .objects
            .iter()
            .filter(|(_, object)| object.parent.is_none())
            .map(|(id, object)| (object.start_time, id))
            .collect();
        ids.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        ids.into_iter().map(|(_, id)| id).collect()
    }

    /// Moves an object and re-applies its defaults.
    pub fn set_start_time(&mut self, id: HitObjectId, start_time: f64) -> bool {
        let Some(object) = self.objects.get_mut(id) else {
            return false;
        };
        if object.start_time == start_time {
            return false;
        }
        object.start_time = start_time;
        self.apply_defaults(id);
        true
    }

    pub fn set_duration(&mut self, id: HitObjectId, duration: f64) -> bool {
        let Some(object) = self.objects.get_mut(id) else {
            return false;
        };
        if object.duration == duration {
            return false;
        }
        object.duration = duration;
        self.apply_defaults(id);
        true
    }

    /// Removes an object and all of its nested objects.
    pub fn remove(&mut self, id: HitObjectId) -> bool {
        let Some(object) = self.objects.remove(id) else {
            return false;
        };
        for nested in object.nested {
            self.remove(nested);
        }
        if let Some(parent) = object.parent.and_then(|parent| self.objects.get_mut(parent)) {
            parent.nested.retain(|child| *child != id);
        }
        true
    }

    /// Objects whose defaults were re-applied since the last call.
    pub fn take_changed(&mut self) -> Vec<HitObjectId> {
        let mut changed = std::mem::take(&mut self.changed);
        let mut seen = std::collections::HashSet::new();
        changed.retain(|id| seen.insert(*id));
        changed
    }

    /// Recomputes derived data: nested objects are regenerated with fresh ids.
    fn apply_defaults(&mut self, id: HitObjectId) {
        let nested = self
            .objects
            .get_mut(id)
            .map(|object| std::mem::take(&mut object.nested))
            .unwrap_or_default();
        for child in nested {
            self.remove(child);
        }
        self.create_nested(id);
        debug!(?id, "defaults applied");
        self.changed.push(id);
    }

    fn create_nested(&mut self, id: HitObjectId) {
        let Some(object) = self.objects.get(id) else {
            return;
        };
        let Some(shape) = object.slider else {
            return;
        };

        let start = object.start_time;
        let end = object.end_time();
        let spans = shape.repeats + 1;
        let span_duration = object.duration / spans as f64;

        let mut timeline = vec![(HitObjectKind::SliderHead, start)];
        for span in 0..spans {
            let span_start = start + span_duration * span as f64;
            let span_end = span_start + span_duration;

            if shape.tick_interval > 0.0 {
                let mut tick = span_start + shape.tick_interval;
                while tick < span_end - MIN_TICK_DISTANCE_FROM_END {
                    timeline.push((HitObjectKind::SliderTick, tick));
                    tick += shape.tick_interval;
                }
            }

            if span + 1 < spans {
                timeline.push((HitObjectKind::SliderRepeat, span_end));
            }
        }
        timeline.push((HitObjectKind::SliderTail, end));

        let children: Vec<_> = timeline
            .into_iter()
            .map(|(kind, time)| {
                let mut child = HitObject::new(kind, time, 0.0);
                child.parent = Some(id);
                self.objects.insert(child)
            })
            .collect();

        if let Some(object) = self.objects.get_mut(id) {
            object.nested = children;
        }
    }
}
