//! Typed records exchanged between the store, the matchers and the engine.

mod candidate;
mod entity;

pub use candidate::*;
pub use entity::*;
