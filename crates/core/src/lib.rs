//! Timeline lifetime and object-pooling engine for a beatmap editor.
//!
//! Every hit object gets a lifetime entry. Each frame the playfield sweeps the
//! entries against the current time window, attaches pooled representations
//! for the ones that became alive and releases those that died. Nested
//! objects follow their parent, and an optional scrolling layout derives
//! lifetimes and positions from scroll parameters.

pub mod beatmap;
pub mod config;
pub mod container;
pub mod error;
pub mod ids;
pub mod lifetime;
pub mod playfield;
pub mod pool;
pub mod render;
pub mod scene;
pub mod scroll;
pub mod timeline;

pub use beatmap::{Beatmap, EntitySource, HitObject, HitObjectKind, SliderShape};
pub use config::{EngineConfig, LifetimeConfig, PoolConfig, ScrollAlgorithmKind, ScrollConfig};
pub use container::{ContainerEvent, HitResult, PooledLifetimeContainer};
pub use error::{Result, TimelineError};
pub use ids::{Arena, EntryId, GenerationalId, HitObjectId};
pub use lifetime::{
    BoundaryKind, CrossingDirection, HitObjectEntryManager, LifetimeEntry, LifetimeEntryManager,
    LifetimeEvent, LifetimeState,
};
pub use playfield::Playfield;
pub use pool::{
    Binding, Pool, PoolRegistry, PoolStats, Representation, RepresentationHandle,
    ScrollingRepresentation,
};
pub use render::RenderTree;
pub use scene::DrawableHitObject;
pub use scroll::{
    ConstantScrollAlgorithm, MultiplierControlPoint, OverlappingScrollAlgorithm, ScrollAlgorithm,
    ScrollingDirection, SequentialScrollAlgorithm, TimelineLayoutCache,
};
pub use timeline::{FrameScheduler, FrameTask, PlaybackClock};
