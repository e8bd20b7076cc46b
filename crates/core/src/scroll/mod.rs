//! Time to position mapping for scrolling timelines.

mod algorithms;
mod layout;

use serde::{Deserialize, Serialize};

pub use algorithms::{
    ConstantScrollAlgorithm, OverlappingScrollAlgorithm, ScrollAlgorithm,
    SequentialScrollAlgorithm,
};
pub use layout::TimelineLayoutCache;

use crate::config::ScrollAlgorithmKind;

/// Direction objects travel in. `Down` and `Right` invert the axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrollingDirection {
    Up,
    Down,
    Left,
    Right,
}

impl ScrollingDirection {
    pub fn is_inverted(self) -> bool {
        matches!(self, ScrollingDirection::Down | ScrollingDirection::Right)
    }
}

/// Scroll speed multiplier taking effect at `time`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MultiplierControlPoint {
    pub time: f64,
    pub multiplier: f64,
}

impl Default for MultiplierControlPoint {
    fn default() -> Self {
        Self {
            time: 0.0,
            multiplier: 1.0,
        }
    }
}

/// Builds the algorithm selected in configuration.
pub fn algorithm_for(
    kind: ScrollAlgorithmKind,
    control_points: &[MultiplierControlPoint],
) -> Box<dyn ScrollAlgorithm> {
    match kind {
        ScrollAlgorithmKind::Constant => Box::new(ConstantScrollAlgorithm),
        ScrollAlgorithmKind::Sequential => {
            Box::new(SequentialScrollAlgorithm::new(control_points.to_vec()))
        }
        ScrollAlgorithmKind::Overlapping => {
            Box::new(OverlappingScrollAlgorithm::new(control_points.to_vec()))
        }
    }
}
