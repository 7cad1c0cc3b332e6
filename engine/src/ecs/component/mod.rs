//! Component types and their process-wide identity.
//!
//! A component is a plain value record attached to at most one entity at a
//! time. Each component type receives a stable positive [`TypeIndex`] on
//! first use, assigned by the process-wide [`Registry`]; filters and entity
//! component lists traffic in these raw indices rather than `TypeId`s.
//!
//! Metadata lives on the [`Component`] trait as associated constants and is
//! normally filled in by `#[derive(Component)]`:
//!
//! ```rust,ignore
//! use strata_ecs::Component;
//!
//! #[derive(Component, Clone, Default)]
//! struct Health { current: u32 }
//!
//! // A tag the filters should not build a cached-index array for.
//! #[derive(Component, Clone, Default)]
//! #[component(ignore_in_filter)]
//! struct Dirty;
//!
//! // A component with a reset routine run on allocation and recycle.
//! #[derive(Component, Clone, Default)]
//! #[component(auto_reset = Connection::reset)]
//! struct Connection { socket: Option<u64> }
//!
//! impl Connection {
//!     fn reset(&mut self) {
//!         self.socket = None;
//!     }
//! }
//! ```

mod registry;

pub use registry::{registry, Info, Registry};

/// A plain value record attachable to entities.
///
/// `Default` provides the zero-initialization used when no reset routine is
/// declared; `Clone` backs entity copy and move operations.
pub trait Component: Default + Clone + 'static {
    /// When true, filters including this type skip building a cached
    /// pool-index array for it (useful for pure tag types).
    const IGNORE_IN_FILTER: bool = false;

    /// Reset routine invoked on fresh allocation and on recycle. When
    /// absent, recycled slots are re-initialized from `Default`.
    ///
    /// The `fn(&mut Self)` signature ties the routine to its own type at
    /// compile time.
    const AUTO_RESET: Option<fn(&mut Self)> = None;
}

/// Process-wide identifier of a component type.
///
/// Indices start at 1; 0 is reserved so that a signed index can carry
/// add/remove polarity in filter-update dispatch without ambiguity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TypeIndex(u32);

impl TypeIndex {
    pub(crate) const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Get the raw index value (always ≥ 1 for a registered type).
    #[inline]
    pub const fn raw(&self) -> u32 {
        self.0
    }

    /// Get the index of this type if it were to live in indexable storage
    /// (e.g. the world's pools table).
    #[inline]
    pub(crate) const fn index(&self) -> usize {
        self.0 as usize
    }

    /// The signed form used as a presence probe in filter dispatch.
    #[inline]
    pub(crate) const fn probe(&self) -> i32 {
        self.0 as i32
    }
}
