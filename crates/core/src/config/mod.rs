use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::beatmap::HitObjectKind;
use crate::scroll::{MultiplierControlPoint, ScrollingDirection};
use crate::Result;

/// Top-level configuration structure for the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub lifetime: LifetimeConfig,
    pub pools: Vec<PoolConfig>,
    pub scroll: Option<ScrollConfig>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            lifetime: LifetimeConfig::default(),
            pools: HitObjectKind::ALL
                .into_iter()
                .map(PoolConfig::for_kind)
                .collect(),
            scroll: None,
        }
    }
}

impl EngineConfig {
    /// Settings used by the editor playfield: every kind pooled, no scrolling.
    pub fn editor_defaults() -> Self {
        Self::default()
    }

    /// Settings for a scrolling timeline with a constant-speed algorithm.
    pub fn timeline_defaults() -> Self {
        Self {
            scroll: Some(ScrollConfig::default()),
            ..Self::default()
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn pool(&self, kind: HitObjectKind) -> Option<&PoolConfig> {
        self.pools.iter().find(|pool| pool.kind == kind)
    }
}

/// Lifetime window settings, in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifetimeConfig {
    /// Widens the evaluation window into the past.
    pub past_extension: f64,
    /// Widens the evaluation window into the future.
    pub future_extension: f64,
    /// How long before its start time an object appears.
    pub preempt: f64,
    /// How long after its end time an object stays visible.
    pub linger: f64,
    /// Drop entries once playback rewinds past their start.
    pub remove_rewound_entries: bool,
}

impl Default for LifetimeConfig {
    fn default() -> Self {
        Self {
            past_extension: 0.0,
            future_extension: 0.0,
            preempt: 600.0,
            linger: 200.0,
            remove_rewound_entries: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolConfig {
    pub kind: HitObjectKind,
    #[serde(default = "PoolConfig::default_initial_size")]
    pub initial_size: usize,
    #[serde(default)]
    pub maximum_size: Option<usize>,
}

impl PoolConfig {
    fn default_initial_size() -> usize {
        10
    }

    pub fn for_kind(kind: HitObjectKind) -> Self {
        let initial_size = match kind {
            HitObjectKind::SliderTick => 20,
            HitObjectKind::Spinner => 1,
            _ => Self::default_initial_size(),
        };
        Self {
            kind,
            initial_size,
            maximum_size: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrollAlgorithmKind {
    #[default]
    Constant,
    Sequential,
    Overlapping,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrollConfig {
    pub direction: ScrollingDirection,
    /// Milliseconds of time visible along the scrolling axis.
    pub time_range: f64,
    /// Length of the scrolling axis in layout units.
    pub scroll_length: f64,
    /// Extra space around the axis an object may occupy before it is hidden.
    pub conservative_extent: f64,
    pub algorithm: ScrollAlgorithmKind,
    pub control_points: Vec<MultiplierControlPoint>,
}

impl Default for ScrollConfig {
    fn default() -> Self {
        Self {
            direction: ScrollingDirection::Left,
            time_range: 1000.0,
            scroll_length: 1000.0,
            conservative_extent: 100.0,
            algorithm: ScrollAlgorithmKind::Constant,
            control_points: Vec::new(),
        }
    }
}
