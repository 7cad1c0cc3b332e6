//! Pool-backed Entity Component System runtime.
//!
//! `strata_ecs` stores components in dense per-type pools addressed by stable
//! indices, hands out generation-tagged entity handles that survive slot
//! reuse, and keeps filter indexes over include/exclude type queries
//! incrementally consistent under structural mutation. Iteration is safe to
//! interleave with mutation on the same thread through a lock counter and a
//! deferred-operation queue on each filter.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use strata_ecs::{Component, Mask, World};
//!
//! #[derive(Component, Clone, Default)]
//! struct Position { x: f32, y: f32 }
//!
//! #[derive(Component, Clone, Default)]
//! struct Frozen;
//!
//! let mut world = World::default();
//!
//! let entity = world.new_entity();
//! world.get::<Position>(entity).x = 10.0;
//!
//! let movable = world.filter(Mask::new().with::<Position>().without::<Frozen>());
//! for i in movable.iter() {
//!     let position = world.get::<Position>(movable.entity(i));
//!     position.x += 1.0;
//! }
//!
//! world.destroy();
//! ```

// Allow the derive macro's `::strata_ecs` paths to resolve from inside this
// crate (the derive is used by unit tests and examples alike).
extern crate self as strata_ecs;

pub mod ecs;

pub use ecs::{Component, Entity, Filter, Mask, System, Systems, World};
pub use strata_macros::Component;
