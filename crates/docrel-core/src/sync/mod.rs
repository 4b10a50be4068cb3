//! Writes that keep both sides of every relation in step.

mod engine;
mod window;

pub use engine::{RelationRef, RelationSyncEngine};
pub(crate) use engine::Detachment;
pub(crate) use window::is_ordered;
