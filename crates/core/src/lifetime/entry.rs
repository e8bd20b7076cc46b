use crate::ids::{EntryId, HitObjectId};

/// Activation interval of one hit object.
///
/// The interval is half-open: the entry is alive while the evaluation window
/// overlaps `[lifetime_start, lifetime_end)`. Infinite bounds are valid.
#[derive(Debug, Clone, PartialEq)]
pub struct LifetimeEntry {
    owner: HitObjectId,
    start: f64,
    end: f64,
    keep_alive: bool,
    pub(crate) nested: Vec<EntryId>,
}

impl LifetimeEntry {
    pub fn new(owner: HitObjectId, lifetime_start: f64, lifetime_end: f64) -> Self {
        debug_assert!(
            !lifetime_start.is_nan() && !lifetime_end.is_nan(),
            "lifetime bounds must not be NaN"
        );
        Self {
            owner,
            start: lifetime_start,
            end: lifetime_end,
            keep_alive: false,
            nested: Vec::new(),
        }
    }

    pub fn owner(&self) -> HitObjectId {
        self.owner
    }

    /// Effective start, `-inf` while kept alive.
    pub fn lifetime_start(&self) -> f64 {
        if self.keep_alive {
            f64::NEG_INFINITY
        } else {
            self.start
        }
    }

    /// Effective end, `+inf` while kept alive.
    pub fn lifetime_end(&self) -> f64 {
        if self.keep_alive {
            f64::INFINITY
        } else {
            self.end
        }
    }

    pub fn bounds(&self) -> (f64, f64) {
        (self.lifetime_start(), self.lifetime_end())
    }

    /// Bounds as last set, ignoring the keep-alive override.
    pub fn real_bounds(&self) -> (f64, f64) {
        (self.start, self.end)
    }

    pub fn keep_alive(&self) -> bool {
        self.keep_alive
    }

    pub fn nested(&self) -> &[EntryId] {
        &self.nested
    }

    /// Returns whether the effective interval changed.
    ///
    /// While kept alive the new bounds are only remembered and become
    /// effective once the override is lifted.
    pub fn set_lifetime(&mut self, lifetime_start: f64, lifetime_end: f64) -> bool {
        debug_assert!(
            !lifetime_start.is_nan() && !lifetime_end.is_nan(),
            "lifetime bounds must not be NaN"
        );
        let before = self.bounds();
        self.start = lifetime_start;
        self.end = lifetime_end;
        self.bounds() != before
    }

    /// Returns whether the effective interval changed.
    pub fn set_keep_alive(&mut self, keep_alive: bool) -> bool {
        let before = self.bounds();
        self.keep_alive = keep_alive;
        self.bounds() != before
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{Arena, GenerationalId};

    fn owner() -> HitObjectId {
        let mut arena: Arena<HitObjectId, ()> = Arena::new();
        let id = arena.insert(());
        assert_eq!(id.index(), 0);
        id
    }

    #[test]
    fn setting_identical_bounds_reports_no_change() {
        let mut entry = LifetimeEntry::new(owner(), 100.0, 200.0);
        assert!(!entry.set_lifetime(100.0, 200.0));
        assert!(entry.set_lifetime(100.0, 250.0));
        assert_eq!(entry.bounds(), (100.0, 250.0));
    }

    #[test]
    fn keep_alive_overrides_and_restores_real_bounds() {
        let mut entry = LifetimeEntry::new(owner(), 100.0, 200.0);

        assert!(entry.set_keep_alive(true));
        assert_eq!(entry.bounds(), (f64::NEG_INFINITY, f64::INFINITY));
        assert!(!entry.set_keep_alive(true));

        assert!(entry.set_keep_alive(false));
        assert_eq!(entry.bounds(), (100.0, 200.0));
    }

    #[test]
    fn bounds_set_while_kept_alive_become_the_restored_bounds() {
        let mut entry = LifetimeEntry::new(owner(), 100.0, 200.0);
        entry.set_keep_alive(true);

        assert!(!entry.set_lifetime(300.0, 400.0));
        assert_eq!(entry.real_bounds(), (300.0, 400.0));

        assert!(entry.set_keep_alive(false));
        assert_eq!(entry.bounds(), (300.0, 400.0));
    }
}
