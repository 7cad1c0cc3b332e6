//! Filters: live indexes over include/exclude component queries.
//!
//! A [`Filter`] materializes the set of entities that have every type in
//! its include list attached and none of its exclude list. The world keeps
//! every filter consistent incrementally: each structural mutation on an
//! entity consults the per-type filter maps and signals the affected
//! filters to add or remove the entity.
//!
//! # Iteration Under Mutation
//!
//! Obtaining an iterator locks the filter; structural changes that target a
//! locked filter are pushed onto a deferred queue and replayed in FIFO
//! order when the last iterator drops. The iterator walks ordinal
//! positions `0..count` where `count` is the membership size at lock time,
//! so a walk in progress never observes membership churn:
//!
//! ```rust,ignore
//! let filter = world.filter(Mask::new().with::<Health>());
//! for i in filter.iter() {
//!     let entity = filter.entity(i);
//!     world.del::<Health>(entity); // applied to the filter after the loop
//! }
//! ```
//!
//! # Cached Indices and the Fast Path
//!
//! For each included type not marked `ignore_in_filter`, the filter keeps a
//! pool-index array parallel to its entity array, so iterators reach
//! component data in O(1) via [`Filter::cached_index`] without a component
//! list scan. On top of that sits an optional zero-indirection read path:
//! the filter caches one raw base pointer per cached include and rebinds it
//! whenever the pool's backing array reallocates (it subscribes to the
//! pool's resize notifications at construction).

use std::{
    cell::{Cell, RefCell},
    collections::{HashMap, VecDeque},
    rc::Rc,
};

use crate::ecs::{
    component::{registry, Component, TypeIndex},
    entity::{Entity, EntityData},
    error::contract,
    pool::{PoolData, ResizeListener},
    world,
};

/// Declaration of a filter query: the included types in `get`-significant
/// order, plus the excluded types.
///
/// ```rust,ignore
/// let mask = Mask::new().with::<Position>().with::<Velocity>().without::<Frozen>();
/// let moving = world.filter(mask);
/// ```
#[derive(Debug, Default)]
pub struct Mask {
    include: Vec<TypeIndex>,
    exclude: Vec<TypeIndex>,
}

impl Mask {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require `T` to be attached. Declaration order fixes the `k` used by
    /// [`Filter::cached_index`].
    pub fn with<T: Component>(mut self) -> Self {
        self.include.push(registry().type_index::<T>());
        self
    }

    /// Require `T` to be absent.
    pub fn without<T: Component>(mut self) -> Self {
        self.exclude.push(registry().type_index::<T>());
        self
    }

    pub(crate) fn into_parts(self) -> (Vec<TypeIndex>, Vec<TypeIndex>) {
        (self.include, self.exclude)
    }
}

/// A deferred structural change recorded while the filter was locked.
enum DeferredOp {
    /// Membership gain. The cached pool indices are captured at enqueue
    /// time: the entity's component list is only guaranteed coherent at
    /// dispatch, and FIFO replay keeps a later detach behind this add.
    Add { entity: Entity, cached: Vec<u32> },

    /// Membership loss.
    Remove { entity: Entity },
}

/// Mutable filter state behind the shared handle.
struct State {
    /// Dense membership array.
    entities: Vec<Entity>,

    /// Entity id to position in `entities`.
    positions: HashMap<u32, usize>,

    /// One pool-index array per cached include, parallel to `entities`.
    cached: Vec<Vec<u32>>,

    /// Structural changes awaiting the lock to clear.
    deferred: VecDeque<DeferredOp>,
}

pub(crate) struct Core {
    world: world::Id,

    /// Included types in declared order.
    include: Box<[TypeIndex]>,

    /// Excluded types (order irrelevant).
    exclude: Box<[TypeIndex]>,

    /// For each include position, the slot in the cached-index arrays
    /// (`None` for types marked ignore-in-filter).
    cached_slots: Box<[Option<usize>]>,

    /// Raw base pointer + element size per cached include; rebound by pool
    /// resize notifications.
    data: Box<[Cell<PoolData>]>,

    state: RefCell<State>,

    /// Active iteration count; structural changes defer while nonzero.
    locks: Cell<u32>,
}

impl Core {
    pub(crate) fn new(
        world: world::Id,
        include: Vec<TypeIndex>,
        exclude: Vec<TypeIndex>,
        cached_slots: Vec<Option<usize>>,
        data: Vec<PoolData>,
        entities_capacity: usize,
    ) -> Self {
        let cached_count = data.len();
        Self {
            world,
            include: include.into_boxed_slice(),
            exclude: exclude.into_boxed_slice(),
            cached_slots: cached_slots.into_boxed_slice(),
            data: data.into_iter().map(Cell::new).collect(),
            state: RefCell::new(State {
                entities: Vec::with_capacity(entities_capacity),
                positions: HashMap::with_capacity(entities_capacity),
                cached: vec![Vec::with_capacity(entities_capacity); cached_count],
                deferred: VecDeque::new(),
            }),
            locks: Cell::new(0),
        }
    }

    #[inline]
    pub(crate) fn include(&self) -> &[TypeIndex] {
        &self.include
    }

    #[inline]
    pub(crate) fn exclude(&self) -> &[TypeIndex] {
        &self.exclude
    }

    /// Order-insensitive structural equality of the include/exclude sets.
    pub(crate) fn matches_sets(&self, include: &[TypeIndex], exclude: &[TypeIndex]) -> bool {
        self.include.len() == include.len()
            && self.exclude.len() == exclude.len()
            && include.iter().all(|t| self.include.contains(t))
            && exclude.iter().all(|t| self.exclude.contains(t))
    }

    /// Whether `include` repeats this filter's declared include order.
    pub(crate) fn same_include_order(&self, include: &[TypeIndex]) -> bool {
        self.include.iter().eq(include.iter())
    }

    /// Whether the `k`-th included type has a cached-index array (and thus
    /// a resize subscription on its pool).
    pub(crate) fn is_cached(&self, k: usize) -> bool {
        self.cached_slots[k].is_some()
    }

    /// The three-valued compatibility predicate.
    ///
    /// `probe` is 0, a positive type index (treat as virtually present), or
    /// a negative type index (treat as virtually absent). This lets the
    /// dispatch reuse the entity's current component list for both "about
    /// to be added" and "about to be removed" decisions without editing the
    /// list first.
    pub(crate) fn is_compatible(&self, slot: &EntityData, probe: i32) -> bool {
        for type_index in self.include.iter() {
            let t = type_index.probe();
            if probe == t {
                // Virtually present; no need to look at the list.
                continue;
            }
            if probe == -t || !slot.contains(*type_index) {
                return false;
            }
        }
        for type_index in self.exclude.iter() {
            let t = type_index.probe();
            if probe == t {
                return false;
            }
            if probe != -t && slot.contains(*type_index) {
                return false;
            }
        }
        true
    }

    /// Signal membership gain. Deferred while locked.
    pub(crate) fn on_add(&self, entity: Entity, slot: &EntityData) {
        if self.locks.get() > 0 {
            let cached = self.capture(slot);
            self.state
                .borrow_mut()
                .deferred
                .push_back(DeferredOp::Add { entity, cached });
            return;
        }

        let mut state = self.state.borrow_mut();
        debug_assert!(
            !state.positions.contains_key(&entity.id()),
            "entity added to a filter it is already a member of"
        );

        let position = state.entities.len();
        state.entities.push(entity);
        state.positions.insert(entity.id(), position);

        // One placeholder per cached array, then a single walk of the
        // component list fills them in.
        for array in state.cached.iter_mut() {
            array.push(0);
        }
        for pair in 0..slot.component_count() {
            let (type_index, pool_index) = slot.pair(pair);
            if let Some(slot_index) = self.cached_slot_for(type_index) {
                state.cached[slot_index][position] = pool_index;
            }
        }
    }

    /// Signal membership loss. Deferred while locked.
    pub(crate) fn on_remove(&self, entity: Entity) {
        if self.locks.get() > 0 {
            self.state
                .borrow_mut()
                .deferred
                .push_back(DeferredOp::Remove { entity });
            return;
        }
        let mut state = self.state.borrow_mut();
        Self::apply_remove(&mut state, entity);
    }

    /// Capture the cached pool indices for a deferred add.
    fn capture(&self, slot: &EntityData) -> Vec<u32> {
        let mut cached = vec![0u32; self.state.borrow().cached.len()];
        for pair in 0..slot.component_count() {
            let (type_index, pool_index) = slot.pair(pair);
            if let Some(slot_index) = self.cached_slot_for(type_index) {
                cached[slot_index] = pool_index;
            }
        }
        cached
    }

    fn cached_slot_for(&self, type_index: TypeIndex) -> Option<usize> {
        self.include
            .iter()
            .position(|t| *t == type_index)
            .and_then(|k| self.cached_slots[k])
    }

    fn apply_add(state: &mut State, entity: Entity, cached: &[u32]) {
        debug_assert!(!state.positions.contains_key(&entity.id()));
        let position = state.entities.len();
        state.entities.push(entity);
        state.positions.insert(entity.id(), position);
        for (array, &pool_index) in state.cached.iter_mut().zip(cached) {
            array.push(pool_index);
        }
    }

    fn apply_remove(state: &mut State, entity: Entity) {
        let position = state.positions.remove(&entity.id());
        debug_assert!(
            position.is_some(),
            "entity removed from a filter it is not a member of"
        );
        let Some(position) = position else {
            return;
        };

        let last = state.entities.len() - 1;
        state.entities.swap_remove(position);
        for array in state.cached.iter_mut() {
            array.swap_remove(position);
        }
        if position != last {
            let moved = state.entities[position];
            state.positions.insert(moved.id(), position);
        }
    }

    pub(crate) fn lock(&self) {
        self.locks.set(self.locks.get() + 1);
    }

    pub(crate) fn unlock(&self) {
        let locks = self.locks.get();
        contract!(locks > 0, LockUnderflow, "filter unlocked more than locked");
        if locks == 0 {
            return;
        }
        self.locks.set(locks - 1);
        if locks == 1 {
            self.drain();
        }
    }

    /// Replay deferred operations in FIFO order against the current state.
    fn drain(&self) {
        loop {
            let op = self.state.borrow_mut().deferred.pop_front();
            let Some(op) = op else {
                break;
            };
            let mut state = self.state.borrow_mut();
            match op {
                DeferredOp::Add { entity, cached } => Self::apply_add(&mut state, entity, &cached),
                DeferredOp::Remove { entity } => Self::apply_remove(&mut state, entity),
            }
        }
    }

    #[inline]
    pub(crate) fn world(&self) -> world::Id {
        self.world
    }
}

impl ResizeListener for Core {
    fn on_pool_resized(&self, type_index: TypeIndex, data: PoolData) {
        for (k, t) in self.include.iter().enumerate() {
            if *t == type_index {
                if let Some(slot_index) = self.cached_slots[k] {
                    self.data[slot_index].set(data);
                }
            }
        }
    }
}

/// Shared handle to a filter. Cloning is cheap; every clone observes the
/// same live membership.
#[derive(Clone)]
pub struct Filter {
    core: Rc<Core>,
}

impl Filter {
    pub(crate) fn from_core(core: Rc<Core>) -> Self {
        Self { core }
    }

    #[inline]
    pub(crate) fn core(&self) -> &Rc<Core> {
        &self.core
    }

    /// Included types in declared order.
    #[inline]
    pub fn include(&self) -> &[TypeIndex] {
        self.core.include()
    }

    /// Excluded types.
    #[inline]
    pub fn exclude(&self) -> &[TypeIndex] {
        self.core.exclude()
    }

    /// Current membership size. While iterating, prefer the iterator's
    /// snapshot bounds.
    #[inline]
    pub fn len(&self) -> usize {
        self.core.state.borrow().entities.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The entity at ordinal `position`.
    pub fn entity(&self, position: usize) -> Entity {
        self.core.state.borrow().entities[position]
    }

    /// Whether `entity` is currently a member.
    pub fn contains(&self, entity: Entity) -> bool {
        contract!(
            entity.world() == self.core.world(),
            InvalidHandle,
            "membership probe with a handle from another world"
        );
        self.core
            .state
            .borrow()
            .positions
            .contains_key(&entity.id())
    }

    /// The pool index of the `k`-th included component for the entity at
    /// ordinal `position`. `k` counts include declarations; asking for a
    /// type marked ignore-in-filter is a contract violation.
    pub fn cached_index(&self, k: usize, position: usize) -> u32 {
        contract!(
            k < self.core.include.len(),
            InvalidFilter,
            "cached index {k} out of range for a filter with {} includes",
            self.core.include.len()
        );
        let slot_index = self.core.cached_slots[k];
        contract!(
            slot_index.is_some(),
            InvalidFilter,
            "cached index requested for ignore-in-filter type {:?}",
            self.core.include[k]
        );
        let slot_index = slot_index.expect("include is not cached");
        self.core.state.borrow().cached[slot_index][position]
    }

    /// Read the `k`-th included component of the entity at ordinal
    /// `position` through the filter's cached base pointer, bypassing the
    /// world.
    ///
    /// # Safety
    ///
    /// The caller must ensure:
    ///
    /// 1. `T` is the `k`-th included type of this filter and is not marked
    ///    ignore-in-filter (checked in debug builds).
    /// 2. No other reference to the same component slot is alive for the
    ///    returned borrow's lifetime. The single-threaded cooperative model
    ///    makes this a per-call-site discipline, not a data race concern.
    /// 3. The owning world is alive and no `&mut` access to the pool for
    ///    `T` is active.
    pub unsafe fn value<T: Component>(&self, k: usize, position: usize) -> &mut T {
        contract!(
            self.core.include.get(k) == Some(&registry().type_index::<T>()),
            InvalidFilter,
            "type does not match include position {k}"
        );
        let index = self.cached_index(k, position);
        let slot_index = self.core.cached_slots[k].expect("include is not cached");
        let data = self.core.data[slot_index].get();
        debug_assert_eq!(data.item_size, std::mem::size_of::<T>());
        unsafe { &mut *data.ptr.cast::<T>().add(index as usize) }
    }

    /// Lock the filter and iterate ordinal positions over the membership
    /// snapshot taken now. Dropping the iterator unlocks; when the last
    /// lock clears, deferred structural changes are replayed.
    pub fn iter(&self) -> Iter {
        self.core.lock();
        let end = self.core.state.borrow().entities.len();
        Iter {
            filter: self.clone(),
            position: 0,
            end,
        }
    }
}

impl std::fmt::Debug for Filter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Filter")
            .field("include", &self.core.include)
            .field("exclude", &self.core.exclude)
            .field("len", &self.len())
            .finish()
    }
}

/// Ordinal iterator over a filter's membership snapshot.
pub struct Iter {
    filter: Filter,
    position: usize,
    end: usize,
}

impl Iterator for Iter {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        if self.position < self.end {
            let position = self.position;
            self.position += 1;
            Some(position)
        } else {
            None
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.end - self.position;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Iter {}

impl Drop for Iter {
    fn drop(&mut self) {
        self.filter.core.unlock();
    }
}
