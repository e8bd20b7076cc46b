use crate::beatmap::HitObjectKind;
use crate::ids::{EntryId, HitObjectId};
use crate::pool::RepresentationHandle;

/// Result alias that carries the custom [`TimelineError`] type.
pub type Result<T> = std::result::Result<T, TimelineError>;

/// Common error type for the core crate.
///
/// Everything except the ambient `Io`/`Json` variants is an editor integrity
/// bug rather than a user input error: the caller broke an invariant of the
/// lifetime or pooling machinery.
#[derive(Debug, thiserror::Error)]
pub enum TimelineError {
    /// The entry id does not resolve to a tracked entry.
    #[error("unknown lifetime entry {0:?}")]
    UnknownEntry(EntryId),
    /// A second entry was requested for an entity that already has one.
    #[error("hit object {entity:?} is already tracked by entry {entry:?}")]
    EntityAlreadyTracked { entity: HitObjectId, entry: EntryId },
    /// A nested entry named a parent entity that has no entry itself.
    #[error("parent hit object {0:?} has no lifetime entry")]
    UnknownParent(HitObjectId),
    /// The entity source no longer knows an entity referenced by an entry.
    #[error("hit object {0:?} is missing from the entity source")]
    MissingEntity(HitObjectId),
    /// No pool has been registered for the requested kind.
    #[error("no representation registered for type {kind:?}")]
    MissingRepresentation { kind: HitObjectKind },
    /// Detaching or releasing something that was never attached.
    #[error("entry {0:?} has no attached representation")]
    NotAttached(EntryId),
    /// Attaching an entry or render node twice.
    #[error("entry {0:?} already has an attached representation")]
    AlreadyAttached(EntryId),
    /// Returning a pooled instance that is already idle.
    #[error("representation {0:?} was released twice")]
    DoubleRelease(RepresentationHandle),
    /// The handle does not belong to any pool slot.
    #[error("representation handle {0:?} does not resolve to a pool slot")]
    InvalidHandle(RepresentationHandle),
    /// A render node was detached while children were still attached to it.
    #[error("render node {0:?} still has attached children")]
    HasAttachedChildren(RepresentationHandle),
    /// Free-form message, mostly used by the command line driver.
    #[error("{0}")]
    Message(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// Configuration parsing failures.
    #[error("invalid configuration: {0}")]
    Json(#[from] serde_json::Error),
}

impl TimelineError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }
}

impl From<&str> for TimelineError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for TimelineError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}
