//! The World owns entities, component pools, and filters.
//!
//! A `World` hands out generation-tagged [`Entity`] handles, stores each
//! component type in its own dense pool, and keeps every registered filter
//! consistent as components are attached and detached. Handles carry only
//! `(id, generation, world-id)`; operations take the world explicitly:
//!
//! ```rust,ignore
//! use strata_ecs::{Component, Mask, World};
//!
//! let mut world = World::default();
//! let entity = world.new_entity();
//!
//! world.get::<Position>(entity).x = 3.0;   // attach-or-access
//! world.replace(entity, Velocity { dx: 1.0, dy: 0.0 });
//!
//! let moving = world.filter(Mask::new().with::<Position>().with::<Velocity>());
//! for i in moving.iter() {
//!     let entity = moving.entity(i);
//!     let dx = world.get::<Velocity>(entity).dx;
//!     world.get::<Position>(entity).x += dx;
//! }
//!
//! world.del::<Velocity>(entity);           // last component detach recycles
//! world.destroy();
//! ```
//!
//! Detaching the last component recycles the entity slot: the generation
//! advances and the id returns to the free-list, so stale handles fail
//! every later liveness check.

use std::{
    any::Any,
    collections::HashMap,
    marker::PhantomData,
    rc::Rc,
    sync::atomic::{AtomicU32, Ordering},
};

use log::{debug, trace};

use crate::ecs::{
    component::{registry, Component, TypeIndex},
    entity::{Entity, EntityData},
    error::contract,
    filter::{Core as FilterCore, Filter, Mask},
    pool::{self, AnyPool, ComponentRef, Pool, ResizeListener},
    util::GrowList,
};

/// A world identifier, minted from a process-wide counter so handles can be
/// pinned to their owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Id(u32);

impl Id {
    /// The id carried by the null entity handle; never assigned to a world.
    pub(crate) const NULL: Self = Self(0);

    #[cfg(test)]
    pub(crate) const fn new_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Get the raw identifier value.
    #[inline]
    pub const fn raw(&self) -> u32 {
        self.0
    }
}

static NEXT_WORLD_ID: AtomicU32 = AtomicU32::new(1);

/// Initial capacities for a world's internal structures. A field left at 0
/// selects the default.
#[derive(Debug, Default, Clone, Copy)]
pub struct Config {
    /// Entity slot table capacity (default 1024).
    pub entities_cache: usize,
    /// Filter list capacity (default 128).
    pub filters_cache: usize,
    /// Pools table capacity (default 512).
    pub pools_cache: usize,
    /// Per-entity component list capacity, in components (default 8).
    pub entity_components_cache: usize,
    /// Per-filter entity array capacity (default 256).
    pub filter_entities_cache: usize,
}

impl Config {
    pub const DEFAULT_ENTITIES_CACHE: usize = 1024;
    pub const DEFAULT_FILTERS_CACHE: usize = 128;
    pub const DEFAULT_POOLS_CACHE: usize = 512;
    pub const DEFAULT_ENTITY_COMPONENTS_CACHE: usize = 8;
    pub const DEFAULT_FILTER_ENTITIES_CACHE: usize = 256;
}

#[inline]
fn or_default(value: usize, default: usize) -> usize {
    if value == 0 {
        default
    } else {
        value
    }
}

/// A point-in-time snapshot of a world's occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stats {
    /// Entity slots currently in use (including created-but-empty ones).
    pub active_entities: u32,
    /// Entity slots waiting on the free-list.
    pub reserved_entities: u32,
    /// Registered filters.
    pub filters: u32,
    /// Component pools allocated so far.
    pub components: u32,
}

/// Debug observer for world lifecycle events.
///
/// Listeners fire only when debug assertions are enabled. Callbacks must
/// not mutate the world they observe.
pub trait WorldEventListener {
    fn on_entity_created(&self, _entity: Entity) {}
    fn on_entity_destroyed(&self, _entity: Entity) {}
    fn on_filter_created(&self, _filter: &Filter) {}
    fn on_component_list_changed(&self, _entity: Entity) {}
    fn on_world_destroyed(&self) {}
    fn on_systems_destroyed(&self, _name: &str) {}
}

/// The container for entities, component pools, and filters.
pub struct World {
    id: Id,

    /// Entity slots, indexed by entity id.
    entities: Vec<EntityData>,

    /// Recycled entity ids awaiting reuse.
    free_ids: GrowList<u32>,

    /// Component pools, indexed by raw type index (slot 0 stays empty).
    pools: Vec<Option<Box<dyn AnyPool>>>,

    /// Registered filters in creation order.
    filters: Vec<Filter>,

    /// Filters that include a given type.
    by_include: HashMap<TypeIndex, Vec<Filter>>,

    /// Filters that exclude a given type.
    by_exclude: HashMap<TypeIndex, Vec<Filter>>,

    entity_components_cache: usize,
    filter_entities_cache: usize,

    alive: bool,

    /// Debug observers; fired only under debug assertions.
    listeners: Vec<Rc<dyn WorldEventListener>>,

    /// Debug audit of created entities, drained by the leak check.
    created: Vec<Entity>,

    /// Worlds are confined to the thread that created them; only the type
    /// registry is shared across threads.
    _not_send: PhantomData<*mut ()>,
}

impl Default for World {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl World {
    pub fn new(config: Config) -> Self {
        let id = Id(NEXT_WORLD_ID.fetch_add(1, Ordering::Relaxed));
        debug!("world {} created", id.raw());
        Self {
            id,
            entities: Vec::with_capacity(or_default(
                config.entities_cache,
                Config::DEFAULT_ENTITIES_CACHE,
            )),
            free_ids: GrowList::with_capacity(
                or_default(config.entities_cache, Config::DEFAULT_ENTITIES_CACHE) / 2,
            ),
            pools: {
                let capacity =
                    or_default(config.pools_cache, Config::DEFAULT_POOLS_CACHE);
                let mut pools = Vec::with_capacity(capacity);
                pools.resize_with(capacity, || None);
                pools
            },
            filters: Vec::with_capacity(or_default(
                config.filters_cache,
                Config::DEFAULT_FILTERS_CACHE,
            )),
            by_include: HashMap::new(),
            by_exclude: HashMap::new(),
            entity_components_cache: or_default(
                config.entity_components_cache,
                Config::DEFAULT_ENTITY_COMPONENTS_CACHE,
            ),
            filter_entities_cache: or_default(
                config.filter_entities_cache,
                Config::DEFAULT_FILTER_ENTITIES_CACHE,
            ),
            alive: true,
            listeners: Vec::new(),
            created: Vec::new(),
            _not_send: PhantomData,
        }
    }

    #[inline]
    pub fn id(&self) -> Id {
        self.id
    }

    /// Whether this world has not been destroyed.
    #[inline]
    pub fn is_alive(&self) -> bool {
        self.alive
    }

    // ------------------------------------------------------------------
    // Entity lifecycle
    // ------------------------------------------------------------------

    /// Create a new entity, reusing a recycled slot when one is available.
    /// The handle's generation is always ≥ 1.
    ///
    /// The entity starts empty and must receive a component before the next
    /// leak audit (debug builds treat a never-populated entity as misuse).
    pub fn new_entity(&mut self) -> Entity {
        contract!(self.alive, InvalidState, "new_entity on a destroyed world");

        let id = match self.free_ids.pop() {
            Some(id) => {
                self.entities[id as usize].revive();
                id
            }
            None => {
                let id = self.entities.len() as u32;
                self.entities
                    .push(EntityData::new(self.entity_components_cache));
                id
            }
        };

        let entity = Entity::new(id, self.entities[id as usize].generation, self.id);
        if cfg!(debug_assertions) {
            self.created.push(entity);
            self.notify(|listener| listener.on_entity_created(entity));
        }
        entity
    }

    /// Whether `entity` refers to a live slot of this world.
    pub fn is_entity_alive(&self, entity: Entity) -> bool {
        self.alive
            && !entity.is_null()
            && entity.world() == self.id
            && entity.index() < self.entities.len()
            && {
                let slot = &self.entities[entity.index()];
                slot.count_x2 >= 0 && slot.generation == entity.generation()
            }
    }

    /// Destroy `entity`: detach every component (highest pair first, firing
    /// filter updates before each detach) and recycle the slot.
    pub fn destroy_entity(&mut self, entity: Entity) {
        self.check_handle(entity);

        loop {
            let slot = &self.entities[entity.index()];
            if slot.count_x2 <= 0 {
                break;
            }
            let (type_index, _) = slot.pair(slot.component_count() - 1);
            // Detaching the last remaining component recycles the slot.
            self.del_by_index(entity, type_index);
        }

        // A created-but-empty entity has no detach to trigger the recycle.
        let slot = &self.entities[entity.index()];
        if slot.count_x2 == 0 && slot.generation == entity.generation() {
            if cfg!(debug_assertions) {
                self.notify(|listener| listener.on_entity_destroyed(entity));
            }
            self.recycle_entity_data(entity.id());
        }
    }

    /// Fill `out` with every live entity handle, returning the count.
    pub fn entities(&self, out: &mut Vec<Entity>) -> usize {
        out.clear();
        for (id, slot) in self.entities.iter().enumerate() {
            if slot.count_x2 >= 0 {
                out.push(Entity::new(id as u32, slot.generation, self.id));
            }
        }
        out.len()
    }

    /// Occupancy snapshot.
    pub fn stats(&self) -> Stats {
        Stats {
            active_entities: (self.entities.len() - self.free_ids.len()) as u32,
            reserved_entities: self.free_ids.len() as u32,
            filters: self.filters.len() as u32,
            components: self.pools.iter().filter(|pool| pool.is_some()).count() as u32,
        }
    }

    // ------------------------------------------------------------------
    // Component operations
    // ------------------------------------------------------------------

    /// Attach-or-access: return the `T` attached to `entity`, attaching a
    /// fresh (reset-or-default) value first when absent.
    pub fn get<T: Component>(&mut self, entity: Entity) -> &mut T {
        self.check_handle(entity);
        let type_index = registry().type_index::<T>();

        let existing = self.entities[entity.index()].index_of(type_index);
        if let Some(index) = existing {
            return self.pool::<T>().get_mut(index);
        }

        let index = self.pool::<T>().alloc();
        self.attach(entity, type_index, index);
        self.pool::<T>().get_mut(index)
    }

    /// Overwrite the attached `T` in place, or attach it with `value`.
    ///
    /// Not available for component types declaring a reset routine: an
    /// in-place overwrite would bypass the reset invariants.
    pub fn replace<T: Component>(&mut self, entity: Entity, value: T) {
        contract!(
            T::AUTO_RESET.is_none(),
            InvalidFilter,
            "replace is not available for auto-reset component {}",
            std::any::type_name::<T>()
        );
        self.check_handle(entity);
        let type_index = registry().type_index::<T>();

        let existing = self.entities[entity.index()].index_of(type_index);
        if let Some(index) = existing {
            *self.pool::<T>().get_mut(index) = value;
            return;
        }

        let index = self.pool::<T>().alloc();
        *self.pool::<T>().get_mut(index) = value;
        self.attach(entity, type_index, index);
    }

    /// Whether `T` is attached to `entity`.
    pub fn has<T: Component>(&self, entity: Entity) -> bool {
        self.check_handle(entity);
        self.entities[entity.index()]
            .contains(registry().type_index::<T>())
    }

    /// Detach `T` from `entity`. No-op when not attached. Detaching the
    /// last component recycles the entity slot.
    pub fn del<T: Component>(&mut self, entity: Entity) {
        self.check_handle(entity);
        self.del_by_index(entity, registry().type_index::<T>());
    }

    /// A stable-while-attached reference to the `T` on `entity`, or `None`
    /// when not attached.
    pub fn component_ref<T: Component>(&self, entity: Entity) -> Option<ComponentRef<T>> {
        self.check_handle(entity);
        let type_index = registry().type_index::<T>();
        self.entities[entity.index()]
            .index_of(type_index)
            .map(|index| ComponentRef::new(entity, type_index, index))
    }

    /// The pool index of the attached `T`, or `None` when not attached.
    pub fn component_index_in_pool<T: Component>(&self, entity: Entity) -> Option<u32> {
        self.check_handle(entity);
        self.entities[entity.index()]
            .index_of(registry().type_index::<T>())
    }

    /// Number of components attached to `entity`.
    pub fn component_count(&self, entity: Entity) -> usize {
        self.check_handle(entity);
        self.entities[entity.index()].component_count()
    }

    /// Fill `out` with the attached component types in attachment order,
    /// returning the count.
    pub fn component_types(&self, entity: Entity, out: &mut Vec<TypeIndex>) -> usize {
        self.check_handle(entity);
        let slot = &self.entities[entity.index()];
        out.clear();
        for pair in 0..slot.component_count() {
            out.push(slot.pair(pair).0);
        }
        out.len()
    }

    /// Fill `out` with borrows of the attached component values in
    /// attachment order, returning the count. Reflection path for debug/UI.
    pub fn component_values<'a>(&'a self, entity: Entity, out: &mut Vec<&'a dyn Any>) -> usize {
        self.check_handle(entity);
        let slot = &self.entities[entity.index()];
        out.clear();
        for pair in 0..slot.component_count() {
            let (type_index, pool_index) = slot.pair(pair);
            let pool = self.pools[type_index.index()]
                .as_deref()
                .expect("pool missing for an attached component");
            out.push(pool.item_as_any(pool_index));
        }
        out.len()
    }

    /// Duplicate `source`: a new entity with a value-copy of every attached
    /// component, in the same attachment order.
    pub fn copy_entity(&mut self, source: Entity) -> Entity {
        self.check_handle(source);
        let copy = self.new_entity();

        let count = self.entities[source.index()].component_count();
        for pair in 0..count {
            let (type_index, source_index) = self.entities[source.index()].pair(pair);
            let pool = self.pool_erased(type_index);
            let copy_index = pool.alloc_erased();
            pool.copy_data(source_index, copy_index);
            self.attach(copy, type_index, copy_index);
        }
        copy
    }

    /// Move every component of `source` onto `target` (overwriting the
    /// types `target` already has), then destroy `source`.
    pub fn move_entity(&mut self, source: Entity, target: Entity) {
        self.check_handle(source);
        self.check_handle(target);
        contract!(
            !source.same_id(&target),
            InvalidHandle,
            "move_entity onto the same entity"
        );

        let count = self.entities[source.index()].component_count();
        for pair in 0..count {
            let (type_index, source_index) = self.entities[source.index()].pair(pair);
            let existing = self.entities[target.index()].index_of(type_index);
            match existing {
                Some(target_index) => {
                    self.pool_erased(type_index)
                        .copy_data(source_index, target_index);
                }
                None => {
                    let pool = self.pool_erased(type_index);
                    let target_index = pool.alloc_erased();
                    pool.copy_data(source_index, target_index);
                    self.attach(target, type_index, target_index);
                }
            }
        }

        self.destroy_entity(source);
    }

    // ------------------------------------------------------------------
    // Pools
    // ------------------------------------------------------------------

    /// The pool for `T`, allocated lazily.
    pub fn pool<T: Component>(&mut self) -> &mut Pool<T> {
        contract!(self.alive, InvalidState, "pool access on a destroyed world");
        let type_index = registry().type_index::<T>();
        self.ensure_pool_capacity(type_index);
        if self.pools[type_index.index()].is_none() {
            self.pools[type_index.index()] =
                Some(Box::new(Pool::<T>::new(pool::DEFAULT_CAPACITY)));
        }
        self.pools[type_index.index()]
            .as_mut()
            .and_then(|pool| pool.as_any_mut().downcast_mut::<Pool<T>>())
            .expect("pool stored under a mismatched type index")
    }

    /// Grow the pools table (doubling) until `type_index` fits.
    fn ensure_pool_capacity(&mut self, type_index: TypeIndex) {
        let needed = type_index.index() + 1;
        if needed > self.pools.len() {
            let mut len = self.pools.len().max(1);
            while len < needed {
                len *= 2;
            }
            self.pools.resize_with(len, || None);
        }
    }

    /// The type-erased pool for an attached component's type index.
    fn pool_erased(&mut self, type_index: TypeIndex) -> &mut dyn AnyPool {
        self.pools[type_index.index()]
            .as_deref_mut()
            .expect("pool missing for an attached component")
    }

    /// Ensure a pool exists for `type_index`, constructing it through the
    /// registry when the concrete type is not statically known.
    fn ensure_pool_erased(&mut self, type_index: TypeIndex) -> &mut dyn AnyPool {
        self.ensure_pool_capacity(type_index);
        if self.pools[type_index.index()].is_none() {
            let info = registry()
                .info(type_index)
                .expect("filter over an unregistered component type");
            self.pools[type_index.index()] = Some(info.new_pool(pool::DEFAULT_CAPACITY));
        }
        self.pools[type_index.index()]
            .as_deref_mut()
            .expect("pool just ensured")
    }

    // ------------------------------------------------------------------
    // Filters
    // ------------------------------------------------------------------

    /// The filter for `mask`, constructing and seeding it on first request.
    ///
    /// Two filters are structurally equal when they have the same include
    /// set and the same exclude set; requesting an existing structure with
    /// a different declared include order is a contract violation (the
    /// order fixes the cached-index layout).
    pub fn filter(&mut self, mask: Mask) -> Filter {
        contract!(self.alive, InvalidState, "filter on a destroyed world");
        let (include, exclude) = mask.into_parts();

        contract!(
            !include.is_empty(),
            InvalidFilter,
            "a filter needs at least one included type"
        );
        contract!(
            no_duplicates(&include) && no_duplicates(&exclude),
            InvalidFilter,
            "duplicate type in a filter declaration"
        );
        contract!(
            !include.iter().any(|t| exclude.contains(t)),
            InvalidFilter,
            "type present in both include and exclude"
        );

        if let Some(existing) = self
            .filters
            .iter()
            .find(|filter| filter.core().matches_sets(&include, &exclude))
        {
            contract!(
                existing.core().same_include_order(&include),
                DuplicateFilter,
                "filter with the same include/exclude sets exists with a different declared order"
            );
            return existing.clone();
        }

        // Cached-index layout: one slot per include not marked
        // ignore-in-filter, in declared order.
        let mut cached_slots = Vec::with_capacity(include.len());
        let mut next_slot = 0usize;
        for type_index in &include {
            let info = registry()
                .info(*type_index)
                .expect("filter over an unregistered component type");
            if info.ignore_in_filter() {
                cached_slots.push(None);
            } else {
                cached_slots.push(Some(next_slot));
                next_slot += 1;
            }
        }

        // Pools for cached includes must exist up front: the filter caches
        // their base pointers and subscribes to their resize notifications.
        let mut data = Vec::with_capacity(next_slot);
        for (k, type_index) in include.iter().enumerate() {
            if cached_slots[k].is_some() {
                data.push(self.ensure_pool_erased(*type_index).data());
            }
        }

        let core = Rc::new(FilterCore::new(
            self.id,
            include.clone(),
            exclude.clone(),
            cached_slots.clone(),
            data,
            self.filter_entities_cache,
        ));
        for (k, type_index) in include.iter().enumerate() {
            if cached_slots[k].is_some() {
                let listener: Rc<dyn ResizeListener> = core.clone();
                self.pool_erased(*type_index).add_resize_listener(listener);
            }
        }

        let filter = Filter::from_core(core);
        self.filters.push(filter.clone());
        for type_index in &include {
            self.by_include
                .entry(*type_index)
                .or_default()
                .push(filter.clone());
        }
        for type_index in &exclude {
            self.by_exclude
                .entry(*type_index)
                .or_default()
                .push(filter.clone());
        }

        // Seed membership from the entities that already exist. The new
        // filter cannot be locked yet, so every add applies immediately.
        for id in 0..self.entities.len() {
            let slot = &self.entities[id];
            if slot.count_x2 > 0 && filter.core().is_compatible(slot, 0) {
                filter
                    .core()
                    .on_add(Entity::new(id as u32, slot.generation, self.id), slot);
            }
        }

        trace!(
            "world {} filter created: include {:?} exclude {:?}",
            self.id.raw(),
            filter.include(),
            filter.exclude()
        );
        if cfg!(debug_assertions) {
            self.notify(|listener| listener.on_filter_created(&filter));
        }
        filter
    }

    /// Structural-change dispatch: `probe` is `+type` for a component just
    /// attached, `-type` for a component about to be detached (the entity's
    /// component list still holds it).
    fn update_filters(&self, probe: i32, entity: Entity) {
        let type_index = TypeIndex::new(probe.unsigned_abs());
        let slot = &self.entities[entity.index()];

        if probe > 0 {
            if let Some(filters) = self.by_include.get(&type_index) {
                for filter in filters {
                    if filter.core().is_compatible(slot, 0) {
                        filter.core().on_add(entity, slot);
                    }
                }
            }
            if let Some(filters) = self.by_exclude.get(&type_index) {
                for filter in filters {
                    // Was a member while the excluded type was absent.
                    if filter.core().is_compatible(slot, -probe) {
                        filter.core().on_remove(entity);
                    }
                }
            }
        } else {
            if let Some(filters) = self.by_include.get(&type_index) {
                for filter in filters {
                    // Still compatible now; loses the include once detached.
                    if filter.core().is_compatible(slot, 0) {
                        filter.core().on_remove(entity);
                    }
                }
            }
            if let Some(filters) = self.by_exclude.get(&type_index) {
                for filter in filters {
                    // Becomes a member once the excluded type is gone.
                    if filter.core().is_compatible(slot, probe) {
                        filter.core().on_add(entity, slot);
                    }
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    /// Record a freshly allocated pool slot on the entity and dispatch the
    /// additive filter update.
    fn attach(&mut self, entity: Entity, type_index: TypeIndex, pool_index: u32) {
        self.entities[entity.index()].push_pair(type_index, pool_index);
        self.update_filters(type_index.probe(), entity);
        if cfg!(debug_assertions) {
            self.notify(|listener| listener.on_component_list_changed(entity));
        }
    }

    fn del_by_index(&mut self, entity: Entity, type_index: TypeIndex) {
        let Some(pair) = self.entities[entity.index()].find(type_index) else {
            return;
        };

        // Dispatch first: compatibility checks must still see the
        // component attached to evaluate the "about to be removed" probe.
        self.update_filters(-type_index.probe(), entity);

        let slot = &mut self.entities[entity.index()];
        let pool_index = slot.pair(pair).1;
        slot.remove_pair(pair);
        self.pool_erased(type_index).recycle(pool_index);

        if cfg!(debug_assertions) {
            self.notify(|listener| listener.on_component_list_changed(entity));
        }

        if self.entities[entity.index()].count_x2 == 0 {
            if cfg!(debug_assertions) {
                self.notify(|listener| listener.on_entity_destroyed(entity));
            }
            self.recycle_entity_data(entity.id());
        }
    }

    /// Return an emptied slot to the free-list, advancing its generation.
    fn recycle_entity_data(&mut self, id: u32) {
        let slot = &mut self.entities[id as usize];
        contract!(
            slot.count_x2 == 0,
            InvalidState,
            "recycling entity {id} while components are attached"
        );
        slot.recycle();
        self.free_ids.push(id);
    }

    fn check_handle(&self, entity: Entity) {
        contract!(
            self.alive,
            InvalidState,
            "entity operation on a destroyed world"
        );
        contract!(!entity.is_null(), InvalidHandle, "null entity handle");
        contract!(
            entity.world() == self.id,
            InvalidHandle,
            "entity {} belongs to world {}, not world {}",
            entity.id(),
            entity.world().raw(),
            self.id.raw()
        );
        contract!(
            entity.index() < self.entities.len(),
            InvalidHandle,
            "entity id {} out of range",
            entity.id()
        );
        if cfg!(debug_assertions) {
            let slot = &self.entities[entity.index()];
            contract!(
                slot.count_x2 >= 0 && slot.generation == entity.generation(),
                InvalidHandle,
                "stale handle for entity id {} (generation {} vs slot {})",
                entity.id(),
                entity.generation().raw(),
                slot.generation.raw()
            );
        }
    }

    // ------------------------------------------------------------------
    // Debug hooks
    // ------------------------------------------------------------------

    /// Register a debug observer. Observers fire only when debug
    /// assertions are enabled.
    pub fn add_event_listener(&mut self, listener: Rc<dyn WorldEventListener>) {
        self.listeners.push(listener);
    }

    /// Remove a previously registered observer (swap-remove).
    pub fn remove_event_listener(&mut self, listener: &Rc<dyn WorldEventListener>) {
        if let Some(position) = self
            .listeners
            .iter()
            .position(|known| std::ptr::addr_eq(Rc::as_ptr(known), Rc::as_ptr(listener)))
        {
            self.listeners.swap_remove(position);
        }
    }

    fn notify(&self, event: impl Fn(&dyn WorldEventListener)) {
        for listener in &self.listeners {
            event(listener.as_ref());
        }
    }

    pub(crate) fn notify_systems_destroyed(&self, name: &str) {
        if cfg!(debug_assertions) {
            self.notify(|listener| listener.on_systems_destroyed(name));
        }
    }

    /// Debug audit: the first entity created since the last check that is
    /// still alive with no components, if any. Clears the audit list.
    pub(crate) fn check_for_leaked_entities(&mut self) -> Option<Entity> {
        if !cfg!(debug_assertions) {
            return None;
        }
        while let Some(entity) = self.created.pop() {
            if self.is_entity_alive(entity)
                && self.entities[entity.index()].count_x2 == 0
            {
                self.created.clear();
                return Some(entity);
            }
        }
        None
    }

    // ------------------------------------------------------------------
    // Teardown
    // ------------------------------------------------------------------

    /// Destroy every live entity (releasing their components), then every
    /// filter, both in reverse creation order, and mark the world dead.
    /// Handles and filters of a destroyed world fail all liveness checks.
    pub fn destroy(&mut self) {
        contract!(self.alive, InvalidState, "world destroyed twice");
        if !self.alive {
            return;
        }

        for id in (0..self.entities.len()).rev() {
            let slot = &self.entities[id];
            if slot.count_x2 >= 0 {
                let entity = Entity::new(id as u32, slot.generation, self.id);
                self.destroy_entity(entity);
            }
        }

        let filters = std::mem::take(&mut self.filters);
        for filter in filters.iter().rev() {
            for (k, type_index) in filter.include().iter().enumerate() {
                // Only cached includes hold a resize subscription.
                if !filter.core().is_cached(k) {
                    continue;
                }
                if let Some(pool) = self
                    .pools
                    .get_mut(type_index.index())
                    .and_then(|pool| pool.as_deref_mut())
                {
                    let listener: Rc<dyn ResizeListener> = filter.core().clone();
                    pool.remove_resize_listener(&listener);
                }
            }
        }
        self.by_include.clear();
        self.by_exclude.clear();

        self.alive = false;
        if cfg!(debug_assertions) {
            self.notify(|listener| listener.on_world_destroyed());
        }
        debug!("world {} destroyed", self.id.raw());
    }
}

impl Drop for World {
    fn drop(&mut self) {
        if self.alive {
            self.destroy();
        }
    }
}

fn no_duplicates(types: &[TypeIndex]) -> bool {
    types
        .iter()
        .enumerate()
        .all(|(i, t)| !types[..i].contains(t))
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use strata_macros::Component;

    use super::*;

    #[derive(Component, Clone, Default, Debug, PartialEq)]
    struct Position {
        x: f32,
        y: f32,
    }

    #[derive(Component, Clone, Default, Debug, PartialEq)]
    struct Velocity {
        dx: f32,
        dy: f32,
    }

    #[derive(Component, Clone, Default, Debug, PartialEq)]
    struct Frozen;

    #[derive(Component, Clone, Default)]
    #[component(auto_reset = Timer::reset)]
    struct Timer {
        remaining: u32,
    }

    impl Timer {
        fn reset(&mut self) {
            self.remaining = 60;
        }
    }

    #[derive(Component, Clone, Default)]
    #[component(ignore_in_filter)]
    struct Marker;

    #[test]
    fn new_entity_generation_starts_at_one() {
        // Given
        let mut world = World::default();

        // When
        let entity = world.new_entity();

        // Then
        assert!(entity.generation().raw() >= 1);
        assert!(world.is_entity_alive(entity));

        world.get::<Position>(entity);
    }

    #[test]
    fn recycled_id_comes_back_with_advanced_generation() {
        // Given
        let mut world = World::default();
        let first = world.new_entity();
        world.get::<Position>(first);

        // When
        world.destroy_entity(first);
        let second = world.new_entity();
        world.get::<Position>(second);

        // Then - Same slot, different lifetime
        assert!(first.same_id(&second));
        assert_ne!(first, second);
        assert!(!world.is_entity_alive(first));
        assert!(world.is_entity_alive(second));
    }

    #[test]
    fn get_attaches_once_and_preserves_the_value() {
        // Given
        let mut world = World::default();
        let entity = world.new_entity();

        // When
        world.get::<Position>(entity).x = 4.0;

        // Then - The second access sees the same slot
        assert_eq!(world.get::<Position>(entity).x, 4.0);
        assert_eq!(world.component_count(entity), 1);
    }

    #[test]
    fn replace_overwrites_in_place_or_attaches() {
        // Given
        let mut world = World::default();
        let entity = world.new_entity();

        // When - Attach through replace
        world.replace(entity, Position { x: 1.0, y: 2.0 });

        // Then
        assert_eq!(*world.get::<Position>(entity), Position { x: 1.0, y: 2.0 });

        // When - Overwrite in place
        world.replace(entity, Position { x: 9.0, y: 8.0 });

        // Then - Pool index unchanged, value updated
        assert_eq!(world.component_count(entity), 1);
        assert_eq!(*world.get::<Position>(entity), Position { x: 9.0, y: 8.0 });
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "invalid filter")]
    fn replace_on_auto_reset_component_is_a_contract_violation() {
        let mut world = World::default();
        let entity = world.new_entity();
        world.replace(entity, Timer { remaining: 5 });
    }

    #[test]
    fn del_of_missing_component_is_a_noop() {
        // Given
        let mut world = World::default();
        let entity = world.new_entity();
        world.get::<Position>(entity);

        // When
        world.del::<Velocity>(entity);

        // Then
        assert!(world.is_entity_alive(entity));
        assert_eq!(world.component_count(entity), 1);
    }

    #[test]
    fn detaching_the_last_component_recycles_the_entity() {
        // Given
        let mut world = World::default();
        let entity = world.new_entity();
        world.get::<Position>(entity);
        world.get::<Velocity>(entity);

        // When
        world.del::<Position>(entity);

        // Then - Still alive on one component
        assert!(world.is_entity_alive(entity));

        // When
        world.del::<Velocity>(entity);

        // Then - Slot recycled
        assert!(!world.is_entity_alive(entity));
        assert_eq!(world.stats().reserved_entities, 1);
    }

    #[test]
    fn filter_tracks_attach_and_detach() {
        // Given
        let mut world = World::default();
        let filter = world.filter(Mask::new().with::<Position>().without::<Frozen>());
        let entity = world.new_entity();

        // When
        world.get::<Position>(entity);

        // Then
        assert!(filter.contains(entity));

        // When - An excluded type arrives
        world.get::<Frozen>(entity);

        // Then
        assert!(!filter.contains(entity));

        // When - The excluded type leaves
        world.del::<Frozen>(entity);

        // Then
        assert!(filter.contains(entity));
    }

    #[test]
    fn filter_created_late_seeds_from_live_entities() {
        // Given
        let mut world = World::default();
        let matching = world.new_entity();
        world.get::<Position>(matching);
        let excluded = world.new_entity();
        world.get::<Position>(excluded);
        world.get::<Frozen>(excluded);

        // When
        let filter = world.filter(Mask::new().with::<Position>().without::<Frozen>());

        // Then
        assert_eq!(filter.len(), 1);
        assert!(filter.contains(matching));
        assert!(!filter.contains(excluded));
    }

    #[test]
    fn same_mask_returns_the_same_filter() {
        // Given
        let mut world = World::default();

        // When
        let first = world.filter(Mask::new().with::<Position>().with::<Velocity>());
        let second = world.filter(Mask::new().with::<Position>().with::<Velocity>());

        // Then - One underlying index, observed through both handles
        assert_eq!(world.stats().filters, 1);
        let entity = world.new_entity();
        world.get::<Position>(entity);
        world.get::<Velocity>(entity);
        assert!(first.contains(entity));
        assert!(second.contains(entity));
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "duplicate filter")]
    fn reordered_include_set_is_a_contract_violation() {
        let mut world = World::default();
        world.filter(Mask::new().with::<Position>().with::<Velocity>());
        world.filter(Mask::new().with::<Velocity>().with::<Position>());
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "invalid filter")]
    fn overlapping_include_and_exclude_is_a_contract_violation() {
        let mut world = World::default();
        world.filter(Mask::new().with::<Position>().without::<Position>());
    }

    #[test]
    fn mutation_during_iteration_is_deferred() {
        // Given
        let mut world = World::default();
        let filter = world.filter(Mask::new().with::<Position>());
        let entities: Vec<_> = (0..3)
            .map(|_| {
                let entity = world.new_entity();
                world.get::<Position>(entity);
                entity
            })
            .collect();

        // When - Detach from the middle entity mid-iteration
        let mut seen = Vec::new();
        for i in filter.iter() {
            seen.push(filter.entity(i));
            if filter.entity(i) == entities[1] {
                world.del::<Position>(entities[1]);
            }
        }

        // Then - The walk observed the lock-time snapshot
        assert_eq!(seen, entities);

        // Then - The deferred removal applied once the iterator dropped
        assert_eq!(filter.len(), 2);
        assert!(filter.contains(entities[0]));
        assert!(!filter.contains(entities[1]));
        assert!(filter.contains(entities[2]));
    }

    #[test]
    fn cached_indices_reach_component_data() {
        // Given
        let mut world = World::default();
        let filter = world.filter(Mask::new().with::<Position>().with::<Velocity>());
        let entity = world.new_entity();
        world.get::<Velocity>(entity).dx = 2.5;
        world.get::<Position>(entity);

        // When
        let mut observed = 0.0;
        for i in filter.iter() {
            let index = filter.cached_index(1, i);
            observed = world.pool::<Velocity>().get(index).dx;
        }

        // Then
        assert_eq!(observed, 2.5);
    }

    #[test]
    fn ignored_types_filter_membership_without_cached_indices() {
        // Given - A filter whose second include is marked ignore-in-filter
        let mut world = World::default();
        let filter = world.filter(Mask::new().with::<Position>().with::<Marker>());
        let entity = world.new_entity();
        world.get::<Position>(entity).x = 11.0;
        world.get::<Marker>(entity);

        // Then - Membership tracking is unaffected
        assert!(filter.contains(entity));

        // Then - The non-ignored include still resolves through the cache
        for i in filter.iter() {
            let index = filter.cached_index(0, i);
            assert_eq!(world.pool::<Position>().get(index).x, 11.0);
        }
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "invalid filter")]
    fn cached_index_on_ignored_type_is_a_contract_violation() {
        let mut world = World::default();
        let filter = world.filter(Mask::new().with::<Position>().with::<Marker>());
        let entity = world.new_entity();
        world.get::<Position>(entity);
        world.get::<Marker>(entity);
        for i in filter.iter() {
            filter.cached_index(1, i);
        }
    }

    #[test]
    fn copy_entity_duplicates_values_independently() {
        // Given
        let mut world = World::default();
        let source = world.new_entity();
        world.replace(source, Position { x: 1.0, y: 1.0 });
        world.replace(source, Velocity { dx: 3.0, dy: 0.0 });

        // When
        let copy = world.copy_entity(source);

        // Then - Same types in the same order, equal values
        let mut source_types = Vec::new();
        let mut copy_types = Vec::new();
        world.component_types(source, &mut source_types);
        world.component_types(copy, &mut copy_types);
        assert_eq!(source_types, copy_types);
        assert_eq!(*world.get::<Position>(copy), Position { x: 1.0, y: 1.0 });

        // Then - Mutating the copy leaves the source untouched
        world.get::<Position>(copy).x = 99.0;
        assert_eq!(world.get::<Position>(source).x, 1.0);
    }

    #[test]
    fn move_entity_overwrites_and_destroys_the_source() {
        // Given
        let mut world = World::default();
        let source = world.new_entity();
        world.replace(source, Position { x: 1.0, y: 1.0 });
        world.replace(source, Velocity { dx: 5.0, dy: 5.0 });
        let target = world.new_entity();
        world.replace(target, Velocity { dx: 0.0, dy: 0.0 });
        world.get::<Frozen>(target);

        // When
        world.move_entity(source, target);

        // Then
        assert!(!world.is_entity_alive(source));
        assert_eq!(world.component_count(target), 3);
        assert_eq!(*world.get::<Position>(target), Position { x: 1.0, y: 1.0 });
        assert_eq!(*world.get::<Velocity>(target), Velocity { dx: 5.0, dy: 5.0 });
        assert!(world.has::<Frozen>(target));
    }

    #[test]
    fn component_ref_survives_unrelated_churn() {
        // Given
        let mut world = World::default();
        let entity = world.new_entity();
        world.replace(entity, Position { x: 7.0, y: 0.0 });
        let reference = world.component_ref::<Position>(entity).unwrap();

        // When - Unrelated entities churn the pool
        for _ in 0..64 {
            let other = world.new_entity();
            world.get::<Position>(other);
        }

        // Then
        assert_eq!(reference.get(&mut world).x, 7.0);
    }

    #[test]
    fn reflection_helpers_expose_types_and_values() {
        // Given
        let mut world = World::default();
        let entity = world.new_entity();
        world.replace(entity, Position { x: 1.0, y: 2.0 });
        world.replace(entity, Velocity { dx: 3.0, dy: 4.0 });

        // When
        let mut values = Vec::new();
        let count = world.component_values(entity, &mut values);

        // Then
        assert_eq!(count, 2);
        assert_eq!(
            values[0].downcast_ref::<Position>(),
            Some(&Position { x: 1.0, y: 2.0 })
        );
        assert_eq!(
            values[1].downcast_ref::<Velocity>(),
            Some(&Velocity { dx: 3.0, dy: 4.0 })
        );
    }

    #[test]
    fn entities_fills_the_output_buffer() {
        // Given
        let mut world = World::default();
        let first = world.new_entity();
        world.get::<Position>(first);
        let second = world.new_entity();
        world.get::<Position>(second);
        world.destroy_entity(first);

        // When
        let mut buffer = Vec::new();
        let count = world.entities(&mut buffer);

        // Then
        assert_eq!(count, 1);
        assert_eq!(buffer, vec![second]);
    }

    #[test]
    fn stats_snapshot_counts_everything() {
        // Given
        let mut world = World::default();
        let entity = world.new_entity();
        world.get::<Position>(entity);
        world.get::<Velocity>(entity);
        let gone = world.new_entity();
        world.get::<Position>(gone);
        world.destroy_entity(gone);
        world.filter(Mask::new().with::<Position>());

        // When
        let stats = world.stats();

        // Then
        assert_eq!(stats.active_entities, 1);
        assert_eq!(stats.reserved_entities, 1);
        assert_eq!(stats.filters, 1);
        assert_eq!(stats.components, 2);
    }

    #[test]
    fn leak_audit_flags_never_populated_entities() {
        // Given
        let mut world = World::default();

        // When - A populated entity passes the audit
        let populated = world.new_entity();
        world.get::<Position>(populated);
        assert!(world.check_for_leaked_entities().is_none());

        // When - An empty entity is left behind
        let leaked = world.new_entity();

        // Then
        if cfg!(debug_assertions) {
            assert_eq!(world.check_for_leaked_entities(), Some(leaked));
        }

        world.get::<Position>(leaked);
    }

    #[test]
    fn destroy_releases_everything_and_kills_handles() {
        // Given
        let mut world = World::default();
        let filter = world.filter(Mask::new().with::<Position>());
        let entity = world.new_entity();
        world.get::<Position>(entity);

        // When
        world.destroy();

        // Then
        assert!(!world.is_alive());
        assert!(!world.is_entity_alive(entity));
        assert!(filter.is_empty());
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "invalid state")]
    fn double_destroy_is_a_contract_violation() {
        let mut world = World::default();
        world.destroy();
        world.destroy();
    }

    #[test]
    fn debug_listeners_observe_the_lifecycle() {
        // Given
        #[derive(Default)]
        struct Recorder {
            events: RefCell<Vec<&'static str>>,
        }

        impl WorldEventListener for Recorder {
            fn on_entity_created(&self, _entity: Entity) {
                self.events.borrow_mut().push("created");
            }
            fn on_entity_destroyed(&self, _entity: Entity) {
                self.events.borrow_mut().push("destroyed");
            }
            fn on_filter_created(&self, _filter: &Filter) {
                self.events.borrow_mut().push("filter");
            }
            fn on_world_destroyed(&self) {
                self.events.borrow_mut().push("world");
            }
        }

        let recorder = Rc::new(Recorder::default());
        let mut world = World::default();
        world.add_event_listener(recorder.clone());

        // When
        let entity = world.new_entity();
        world.get::<Position>(entity);
        world.filter(Mask::new().with::<Velocity>());
        world.destroy_entity(entity);
        world.destroy();

        // Then
        if cfg!(debug_assertions) {
            let events = recorder.events.borrow();
            assert_eq!(
                events.as_slice(),
                &["created", "filter", "destroyed", "world"]
            );
        }
    }
}

