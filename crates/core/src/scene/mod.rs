use crate::beatmap::HitObjectKind;
use crate::ids::HitObjectId;
use crate::pool::{Binding, Representation, ScrollingRepresentation};

/// Poolable visual representation of a hit object.
///
/// Holds only what the timeline needs to place and draw the object; it is
/// rebound on every activation.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawableHitObject {
    pub kind: HitObjectKind,
    pub entity: Option<HitObjectId>,
    pub parent: Option<HitObjectId>,
    pub start_time: f64,
    pub end_time: f64,
    pub lifetime: (f64, f64),
    pub position: f64,
    pub length: f64,
    /// Number of times this instance has been bound.
    pub uses: u32,
}

impl DrawableHitObject {
    pub fn new(kind: HitObjectKind) -> Self {
        Self {
            kind,
            entity: None,
            parent: None,
            start_time: 0.0,
            end_time: 0.0,
            lifetime: (0.0, 0.0),
            position: 0.0,
            length: 0.0,
            uses: 0,
        }
    }

    pub fn is_bound(&self) -> bool {
        self.entity.is_some()
    }
}

impl Representation for DrawableHitObject {
    fn apply(&mut self, binding: &Binding<'_>) {
        debug_assert_eq!(
            self.kind, binding.hit_object.kind,
            "representation bound to an entity of another kind"
        );
        self.entity = Some(binding.entity);
        self.parent = binding.parent;
        self.start_time = binding.hit_object.start_time;
        self.end_time = binding.hit_object.end_time();
        self.lifetime = binding.entry.bounds();
        self.position = 0.0;
        self.length = 0.0;
        self.uses += 1;
    }

    fn free(&mut self) {
        *self = Self {
            uses: self.uses,
            ..Self::new(self.kind)
        };
    }
}

impl ScrollingRepresentation for DrawableHitObject {
    fn set_position(&mut self, position: f64) {
        self.position = position;
    }

    fn set_length(&mut self, length: f64) {
        self.length = length;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::beatmap::{Beatmap, EntitySource};
    use crate::lifetime::LifetimeEntry;

    #[test]
    fn apply_overwrites_previous_use() {
        let mut beatmap = Beatmap::new();
        let first = beatmap.add_circle(100.0);
        let second = beatmap.add_circle(900.0);

        let mut drawable = DrawableHitObject::new(HitObjectKind::Circle);
        for (id, position) in [(first, 42.0), (second, 0.0)] {
            let entry = LifetimeEntry::new(id, 0.0, 1000.0);
            drawable.apply(&Binding {
                entity: id,
                hit_object: beatmap.hit_object(id).unwrap(),
                entry: &entry,
                parent: None,
            });
            assert_eq!(drawable.position, 0.0);
            drawable.set_position(position);
        }

        assert_eq!(drawable.entity, Some(second));
        assert_eq!(drawable.start_time, 900.0);
        assert_eq!(drawable.uses, 2);
    }

    #[test]
    fn free_returns_to_a_neutral_state() {
        let mut beatmap = Beatmap::new();
        let id = beatmap.add_spinner(0.0, 500.0);
        let entry = LifetimeEntry::new(id, 0.0, 500.0);

        let mut drawable = DrawableHitObject::new(HitObjectKind::Spinner);
        drawable.apply(&Binding {
            entity: id,
            hit_object: beatmap.hit_object(id).unwrap(),
            entry: &entry,
            parent: None,
        });
        drawable.set_length(12.0);
        drawable.free();

        assert!(!drawable.is_bound());
        assert_eq!(drawable.length, 0.0);
        assert_eq!(drawable.uses, 1);
    }
}
