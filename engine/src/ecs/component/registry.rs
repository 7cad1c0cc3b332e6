use std::{
    any::TypeId,
    sync::atomic::{AtomicU32, Ordering},
    sync::{LazyLock, RwLock},
};

use dashmap::DashMap;

use crate::ecs::{
    component::{Component, TypeIndex},
    pool::{AnyPool, Pool},
};

/// The process-wide component type registry.
///
/// The registry uses lock-free reads for `TypeId` → [`TypeIndex`] lookups
/// via `DashMap`, making the common read path highly performant. Type
/// registration uses minimal locking - only a single shard of the DashMap
/// and a write lock for the info vector.
///
/// Why process-wide and thread-safe?
/// - Filters compare raw type indices, so every world must agree on them,
///   and worlds may be created on different threads. Each world itself stays
///   confined to one thread; the registry is the only shared state.
pub struct Registry {
    /// Map from TypeId to type index. Lock-free reads via sharded
    /// concurrent hashmap.
    type_map: DashMap<TypeId, TypeIndex>,

    /// Per-type metadata records, indexed by raw type index (slot 0 is the
    /// reserved "no type" index and stays empty). Protected by RwLock for
    /// rare writes.
    infos: RwLock<Vec<Option<Info>>>,

    /// Next available type index. Starts at 1; 0 is reserved.
    next_index: AtomicU32,
}

static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

/// Access the process-wide registry.
#[inline]
pub fn registry() -> &'static Registry {
    &REGISTRY
}

impl Registry {
    fn new() -> Self {
        Self {
            type_map: DashMap::new(),
            infos: RwLock::new(Vec::new()),
            next_index: AtomicU32::new(1),
        }
    }

    /// Get the type index for `T`, registering it on first use.
    ///
    /// This method is thread-safe and can be called concurrently. If the
    /// component type is already registered, returns the existing index.
    pub fn type_index<T: Component>(&self) -> TypeIndex {
        let type_id = TypeId::of::<T>();

        // Fast path: already registered (lock-free read)
        if let Some(index) = self.type_map.get(&type_id) {
            return *index;
        }

        // Slow path: register. The entry API closes the race where two
        // threads both miss the fast path.
        *self
            .type_map
            .entry(type_id)
            .or_insert_with(|| {
                let index = TypeIndex::new(self.next_index.fetch_add(1, Ordering::Relaxed));

                let mut infos = self.infos.write().unwrap();
                if index.index() >= infos.len() {
                    infos.resize(index.index() + 1, None);
                }
                infos[index.index()] = Some(Info::new::<T>(index));

                index
            })
            .value()
    }

    /// Get the metadata record for a registered type index.
    #[inline]
    pub fn info(&self, type_index: TypeIndex) -> Option<Info> {
        let infos = self.infos.read().unwrap();
        infos.get(type_index.index()).copied().flatten()
    }

    /// Number of registered component types.
    #[inline]
    pub fn count(&self) -> usize {
        self.type_map.len()
    }
}

/// Metadata recorded for a component type at registration.
#[derive(Debug, Clone, Copy)]
pub struct Info {
    type_index: TypeIndex,
    type_id: TypeId,
    type_name: &'static str,
    ignore_in_filter: bool,
    has_auto_reset: bool,
    new_pool: fn(usize) -> Box<dyn AnyPool>,
}

impl Info {
    fn new<T: Component>(type_index: TypeIndex) -> Self {
        Self {
            type_index,
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            ignore_in_filter: T::IGNORE_IN_FILTER,
            has_auto_reset: T::AUTO_RESET.is_some(),
            new_pool: new_pool::<T>,
        }
    }

    #[inline]
    pub fn type_index(&self) -> TypeIndex {
        self.type_index
    }

    #[inline]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    #[inline]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// True when filters should not build a cached-index array for this type.
    #[inline]
    pub fn ignore_in_filter(&self) -> bool {
        self.ignore_in_filter
    }

    /// True when the type declares a reset routine.
    #[inline]
    pub fn has_auto_reset(&self) -> bool {
        self.has_auto_reset
    }

    /// Build a pool for this type with the given initial slot capacity.
    /// Lets the world construct pools from a bare type index.
    pub(crate) fn new_pool(&self, capacity: usize) -> Box<dyn AnyPool> {
        (self.new_pool)(capacity)
    }
}

fn new_pool<T: Component>(capacity: usize) -> Box<dyn AnyPool> {
    Box::new(Pool::<T>::new(capacity))
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    #[derive(Clone, Default)]
    struct Position {
        _x: f32,
        _y: f32,
    }

    impl Component for Position {}

    #[derive(Clone, Default)]
    struct Velocity;

    impl Component for Velocity {
        const IGNORE_IN_FILTER: bool = true;
    }

    #[derive(Clone, Default)]
    struct Cooldown {
        remaining: u32,
    }

    impl Cooldown {
        fn reset(&mut self) {
            self.remaining = 0;
        }
    }

    impl Component for Cooldown {
        const AUTO_RESET: Option<fn(&mut Self)> = Some(Cooldown::reset);
    }

    #[test]
    fn registration_assigns_distinct_nonzero_indices() {
        // When
        let position = registry().type_index::<Position>();
        let velocity = registry().type_index::<Velocity>();

        // Then
        assert_ne!(position, velocity);
        assert!(position.raw() >= 1);
        assert!(velocity.raw() >= 1);

        // Then - Registering the same type again yields the same index
        assert_eq!(registry().type_index::<Position>(), position);
    }

    #[test]
    fn info_records_metadata_flags() {
        // Given
        let position = registry().type_index::<Position>();
        let velocity = registry().type_index::<Velocity>();
        let cooldown = registry().type_index::<Cooldown>();

        // Then
        let info = registry().info(position).unwrap();
        assert!(!info.ignore_in_filter());
        assert!(!info.has_auto_reset());
        assert_eq!(info.type_id(), TypeId::of::<Position>());

        assert!(registry().info(velocity).unwrap().ignore_in_filter());
        assert!(registry().info(cooldown).unwrap().has_auto_reset());
    }

    #[test]
    fn unregistered_index_has_no_info() {
        // Then - Index 0 is reserved and never populated
        assert!(registry().info(TypeIndex::new(0)).is_none());
    }

    #[test]
    fn concurrent_first_touch_agrees_on_one_index() {
        // Given
        #[derive(Clone, Default)]
        struct Contended;
        impl Component for Contended {}

        // When - Many threads race the first registration
        let handles: Vec<_> = (0..8)
            .map(|_| thread::spawn(|| registry().type_index::<Contended>()))
            .collect();
        let indices: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        // Then - Every thread observed the same index
        assert!(indices.iter().all(|&index| index == indices[0]));
    }
}
