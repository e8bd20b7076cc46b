use std::fmt;

use super::MultiplierControlPoint;

/// Maps between time and position along the scrolling axis.
///
/// Positions are relative to the origin of the axis, where objects at
/// `current_time` sit. Methods take `&mut self` so implementations can cache
/// derived data until [`reset`](ScrollAlgorithm::reset).
pub trait ScrollAlgorithm: fmt::Debug {
    /// Time at which an object at `origin_time` enters the visible range,
    /// given an extra `offset` it may extend beyond the axis.
    fn display_start_time(
        &mut self,
        origin_time: f64,
        offset: f64,
        time_range: f64,
        scroll_length: f64,
    ) -> f64;

    /// Length along the axis of an object spanning `[start_time, end_time]`.
    fn length(
        &mut self,
        start_time: f64,
        end_time: f64,
        time_range: f64,
        scroll_length: f64,
    ) -> f64;

    fn position_at(
        &mut self,
        time: f64,
        current_time: f64,
        time_range: f64,
        scroll_length: f64,
        origin_time: Option<f64>,
    ) -> f64;

    fn time_at(
        &mut self,
        position: f64,
        current_time: f64,
        time_range: f64,
        scroll_length: f64,
    ) -> f64;

    /// Drops cached data.
    fn reset(&mut self);
}

fn sorted(mut control_points: Vec<MultiplierControlPoint>) -> Vec<MultiplierControlPoint> {
    control_points.sort_by(|a, b| a.time.total_cmp(&b.time));
    control_points
}

/// Every object moves at the same speed.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConstantScrollAlgorithm;

impl ScrollAlgorithm for ConstantScrollAlgorithm {
    fn display_start_time(
        &mut self,
        origin_time: f64,
        offset: f64,
        time_range: f64,
        scroll_length: f64,
    ) -> f64 {
        let adjusted = self.time_at(-offset, origin_time, time_range, scroll_length);
        adjusted - time_range
    }

    fn length(
        &mut self,
        start_time: f64,
        end_time: f64,
        time_range: f64,
        scroll_length: f64,
    ) -> f64 {
        (end_time - start_time) / time_range * scroll_length
    }

    fn position_at(
        &mut self,
        time: f64,
        current_time: f64,
        time_range: f64,
        scroll_length: f64,
        _origin_time: Option<f64>,
    ) -> f64 {
        (time - current_time) / time_range * scroll_length
    }

    fn time_at(
        &mut self,
        position: f64,
        current_time: f64,
        time_range: f64,
        scroll_length: f64,
    ) -> f64 {
        current_time + position / scroll_length * time_range
    }

    fn reset(&mut self) {}
}

/// Each object moves at the speed of the control point active at its own
/// time, so faster objects can overtake slower ones.
#[derive(Debug, Clone)]
pub struct OverlappingScrollAlgorithm {
    control_points: Vec<MultiplierControlPoint>,
}

impl OverlappingScrollAlgorithm {
    pub fn new(control_points: Vec<MultiplierControlPoint>) -> Self {
        Self {
            control_points: sorted(control_points),
        }
    }

    /// Last control point at or before `time`, or the first one.
    fn control_point_at(&self, time: f64) -> MultiplierControlPoint {
        let count = self
            .control_points
            .partition_point(|point| point.time <= time);
        self.control_points
            .get(count.saturating_sub(1))
            .copied()
            .unwrap_or_default()
    }

    fn position(
        &self,
        time: f64,
        current_time: f64,
        time_range: f64,
        scroll_length: f64,
        origin_time: Option<f64>,
    ) -> f64 {
        let multiplier = self
            .control_point_at(origin_time.unwrap_or(time))
            .multiplier;
        (time - current_time) / time_range * multiplier * scroll_length
    }
}

impl ScrollAlgorithm for OverlappingScrollAlgorithm {
    fn display_start_time(
        &mut self,
        origin_time: f64,
        offset: f64,
        time_range: f64,
        scroll_length: f64,
    ) -> f64 {
        let multiplier = self.control_point_at(origin_time).multiplier;
        let visible_duration = (scroll_length + offset) * time_range / multiplier / scroll_length;
        origin_time - visible_duration
    }

    fn length(
        &mut self,
        start_time: f64,
        end_time: f64,
        time_range: f64,
        scroll_length: f64,
    ) -> f64 {
        // At its end time the object's tail rests at the origin.
        -self.position_at(start_time, end_time, time_range, scroll_length, None)
    }

    fn position_at(
        &mut self,
        time: f64,
        current_time: f64,
        time_range: f64,
        scroll_length: f64,
        origin_time: Option<f64>,
    ) -> f64 {
        self.position(time, current_time, time_range, scroll_length, origin_time)
    }

    /// Overlapping control points can map several times to one position;
    /// the latest matching control point wins.
    fn time_at(
        &mut self,
        position: f64,
        current_time: f64,
        time_range: f64,
        scroll_length: f64,
    ) -> f64 {
        let control_point = self
            .control_points
            .iter()
            .rev()
            .find(|point| {
                self.position(point.time, current_time, time_range, scroll_length, None) <= position
            })
            .or_else(|| self.control_points.first())
            .copied()
            .unwrap_or_default();

        current_time + position / scroll_length * time_range / control_point.multiplier
    }

    fn reset(&mut self) {}
}

#[derive(Debug, Clone, Copy)]
struct PositionMapping {
    time: f64,
    control_point: MultiplierControlPoint,
    /// Position relative to the time range, not yet scaled by scroll length.
    position: f64,
}

/// Control point sections are laid end to end, so objects never overlap.
#[derive(Debug, Clone)]
pub struct SequentialScrollAlgorithm {
    control_points: Vec<MultiplierControlPoint>,
    mappings: Vec<PositionMapping>,
}

impl SequentialScrollAlgorithm {
    pub fn new(control_points: Vec<MultiplierControlPoint>) -> Self {
        let mut control_points = sorted(control_points);
        if control_points.is_empty() {
            control_points.push(MultiplierControlPoint::default());
        }
        Self {
            control_points,
            mappings: Vec::new(),
        }
    }

    fn generate_mappings(&mut self, time_range: f64) {
        if !self.mappings.is_empty() {
            return;
        }

        let mut position = 0.0;
        let mut previous: Option<MultiplierControlPoint> = None;
        for point in &self.control_points {
            if let Some(previous) = previous {
                position += (point.time - previous.time) / time_range * previous.multiplier;
            }
            self.mappings.push(PositionMapping {
                time: point.time,
                control_point: *point,
                position,
            });
            previous = Some(*point);
        }
    }

    /// Last mapping whose key is at or before `value`, or the first one.
    fn mapping_by(
        &mut self,
        time_range: f64,
        value: f64,
        key: impl Fn(&PositionMapping) -> f64,
    ) -> PositionMapping {
        self.generate_mappings(time_range);
        let count = self.mappings.partition_point(|mapping| key(mapping) <= value);
        self.mappings
            .get(count.saturating_sub(1))
            .copied()
            .unwrap_or(PositionMapping {
                time: 0.0,
                control_point: MultiplierControlPoint::default(),
                position: 0.0,
            })
    }

    fn relative_position_at(&mut self, time: f64, time_range: f64) -> f64 {
        let mapping = self.mapping_by(time_range, time, |mapping| mapping.time);
        mapping.position + (time - mapping.time) / time_range * mapping.control_point.multiplier
    }
}

impl ScrollAlgorithm for SequentialScrollAlgorithm {
    fn display_start_time(
        &mut self,
        origin_time: f64,
        offset: f64,
        time_range: f64,
        scroll_length: f64,
    ) -> f64 {
        self.time_at(-(scroll_length + offset), origin_time, time_range, scroll_length)
    }

    fn length(
        &mut self,
        start_time: f64,
        end_time: f64,
        time_range: f64,
        scroll_length: f64,
    ) -> f64 {
        let length = self.relative_position_at(end_time, time_range)
            - self.relative_position_at(start_time, time_range);
        length * scroll_length
    }

    fn position_at(
        &mut self,
        time: f64,
        current_time: f64,
        time_range: f64,
        scroll_length: f64,
        _origin_time: Option<f64>,
    ) -> f64 {
        let distance = self.relative_position_at(time, time_range)
            - self.relative_position_at(current_time, time_range);
        distance * scroll_length
    }

    fn time_at(
        &mut self,
        position: f64,
        current_time: f64,
        time_range: f64,
        scroll_length: f64,
    ) -> f64 {
        let relative =
            self.relative_position_at(current_time, time_range) + position / scroll_length;
        let mapping = self.mapping_by(time_range, relative, |mapping| mapping.position);
        mapping.time + (relative - mapping.position) * time_range / mapping.control_point.multiplier
    }

    fn reset(&mut self) {
        self.mappings.clear();
    }
}
