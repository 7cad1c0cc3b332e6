//! Per-type dense component storage.
//!
//! A [`Pool`] owns every live value of one component type in a dense array.
//! Slot indices are handed out by [`Pool::alloc`] and returned by
//! [`Pool::recycle`]; a recycled index goes onto a free-list and is reused
//! before the dense prefix grows again. Indices are *not* stable across
//! recycling - an index is only meaningful while the component stays
//! attached to its entity.
//!
//! # Reset Routines
//!
//! A component type may declare a reset routine
//! ([`Component::AUTO_RESET`](crate::ecs::Component::AUTO_RESET)). The pool
//! captures it at construction and runs it on freshly exposed slots and at
//! recycle time. Reused slots are not reset again on allocation - they were
//! reset when they were recycled.
//!
//! # Resize Notifications
//!
//! Filters cache a raw base pointer into each included pool for their
//! zero-indirection read path. Whenever the backing array reallocates, the
//! pool broadcasts the new base pointer to its subscribed
//! [`ResizeListener`]s so those cached pointers can be rebound. The listener
//! set has unordered semantics; removal swaps with the last element.

use std::{any::Any, marker::PhantomData, rc::Rc};

use crate::ecs::{
    component::{registry, Component, TypeIndex},
    entity::Entity,
    error::contract,
    util::GrowList,
    world::World,
};

/// Initial slot capacity of a freshly built pool.
pub(crate) const DEFAULT_CAPACITY: usize = 128;

/// Raw view of a pool's backing array: base pointer plus element size.
///
/// Only ever dereferenced by the filter fast path, whose caller contract
/// covers aliasing; resize listeners receive a fresh view after each grow.
#[derive(Debug, Clone, Copy)]
pub struct PoolData {
    pub(crate) ptr: *mut u8,
    pub(crate) item_size: usize,
}

/// Receiver for pool backing-array reallocation notifications.
pub trait ResizeListener {
    /// The pool for `type_index` reallocated; `data` is the new view.
    fn on_pool_resized(&self, type_index: TypeIndex, data: PoolData);
}

/// Object-safe surface of a [`Pool`], used by the world to store pools of
/// heterogeneous component types and to walk entity component lists without
/// knowing concrete types.
pub trait AnyPool {
    /// The component type this pool stores.
    fn type_index(&self) -> TypeIndex;

    /// Allocate a slot (see [`Pool::alloc`]).
    fn alloc_erased(&mut self) -> u32;

    /// Reset-or-default the slot and push it onto the free-list.
    fn recycle(&mut self, index: u32);

    /// Value-copy one slot into another.
    fn copy_data(&mut self, source: u32, target: u32);

    /// Borrow a slot as `&dyn Any` (reflection path; used by debug/UI
    /// helpers).
    fn item_as_any(&self, index: u32) -> &dyn Any;

    /// Current raw view of the backing array.
    fn data(&self) -> PoolData;

    /// Subscribe a listener to backing-array reallocations.
    fn add_resize_listener(&mut self, listener: Rc<dyn ResizeListener>);

    /// Remove a previously subscribed listener (swap-remove).
    fn remove_resize_listener(&mut self, listener: &Rc<dyn ResizeListener>);

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Dense storage for every live value of component type `T`.
pub struct Pool<T: Component> {
    type_index: TypeIndex,

    /// The dense value array; the whole `Vec` length is the used prefix.
    items: Vec<T>,

    /// Recycled indices awaiting reuse.
    reserved: GrowList<u32>,

    /// Per-type reset routine captured at construction.
    reset: Option<fn(&mut T)>,

    /// Subscribed resize listeners. Unordered set semantics.
    listeners: Vec<Rc<dyn ResizeListener>>,
}

impl<T: Component> Pool<T> {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            type_index: registry().type_index::<T>(),
            items: Vec::with_capacity(capacity.max(1)),
            reserved: GrowList::with_capacity(capacity.max(1) / 2),
            reset: T::AUTO_RESET,
            listeners: Vec::new(),
        }
    }

    /// Allocate a slot: pop a reserved index if any, otherwise grow the
    /// dense prefix (doubling the backing array when full, which notifies
    /// resize listeners).
    pub fn alloc(&mut self) -> u32 {
        if let Some(index) = self.reserved.pop() {
            // Reserved slots were reset when they were recycled.
            return index;
        }

        if self.items.len() == self.items.capacity() {
            self.items.reserve_exact(self.items.capacity().max(1));
            self.broadcast_resize();
        }

        self.items.push(T::default());
        let index = (self.items.len() - 1) as u32;
        if let Some(reset) = self.reset {
            reset(&mut self.items[index as usize]);
        }
        index
    }

    /// Borrow the value in `index`.
    #[inline]
    pub fn get(&self, index: u32) -> &T {
        &self.items[index as usize]
    }

    /// Mutably borrow the value in `index`.
    #[inline]
    pub fn get_mut(&mut self, index: u32) -> &mut T {
        &mut self.items[index as usize]
    }

    /// Number of slots in the used prefix (live and reserved alike).
    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn broadcast_resize(&self) {
        let data = self.raw_data();
        for listener in &self.listeners {
            listener.on_pool_resized(self.type_index, data);
        }
    }

    fn raw_data(&self) -> PoolData {
        PoolData {
            ptr: self.items.as_ptr() as *mut u8,
            item_size: std::mem::size_of::<T>(),
        }
    }
}

impl<T: Component> AnyPool for Pool<T> {
    #[inline]
    fn type_index(&self) -> TypeIndex {
        self.type_index
    }

    #[inline]
    fn alloc_erased(&mut self) -> u32 {
        self.alloc()
    }

    fn recycle(&mut self, index: u32) {
        match self.reset {
            Some(reset) => reset(&mut self.items[index as usize]),
            None => self.items[index as usize] = T::default(),
        }
        self.reserved.push(index);
    }

    fn copy_data(&mut self, source: u32, target: u32) {
        let value = self.items[source as usize].clone();
        self.items[target as usize] = value;
    }

    #[inline]
    fn item_as_any(&self, index: u32) -> &dyn Any {
        &self.items[index as usize]
    }

    #[inline]
    fn data(&self) -> PoolData {
        self.raw_data()
    }

    fn add_resize_listener(&mut self, listener: Rc<dyn ResizeListener>) {
        contract!(
            !self
                .listeners
                .iter()
                .any(|known| same_listener(known, &listener)),
            InvalidState,
            "resize listener subscribed twice to pool for type {:?}",
            self.type_index
        );
        self.listeners.push(listener);
    }

    fn remove_resize_listener(&mut self, listener: &Rc<dyn ResizeListener>) {
        let position = self
            .listeners
            .iter()
            .position(|known| same_listener(known, listener));
        contract!(
            position.is_some(),
            InvalidState,
            "removing a resize listener that was never subscribed to pool for type {:?}",
            self.type_index
        );
        if let Some(position) = position {
            self.listeners.swap_remove(position);
        }
    }

    #[inline]
    fn as_any(&self) -> &dyn Any {
        self
    }

    #[inline]
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

fn same_listener(a: &Rc<dyn ResizeListener>, b: &Rc<dyn ResizeListener>) -> bool {
    std::ptr::addr_eq(Rc::as_ptr(a), Rc::as_ptr(b))
}

/// A stable-while-attached reference to one component: the pool identity
/// plus the slot index, resolved against the world on each access.
///
/// The index is valid only while the component stays attached to its
/// entity; callers must not retain a `ComponentRef` across detach, recycle,
/// or world destruction.
pub struct ComponentRef<T: Component> {
    entity: Entity,
    type_index: TypeIndex,
    index: u32,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Component> ComponentRef<T> {
    pub(crate) fn new(entity: Entity, type_index: TypeIndex, index: u32) -> Self {
        Self {
            entity,
            type_index,
            index,
            _marker: PhantomData,
        }
    }

    /// The entity the component was attached to when the ref was taken.
    #[inline]
    pub fn entity(&self) -> Entity {
        self.entity
    }

    /// The slot index inside the pool.
    #[inline]
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Resolve the reference against the world.
    pub fn get<'w>(&self, world: &'w mut World) -> &'w mut T {
        contract!(
            world.component_index_in_pool::<T>(self.entity) == Some(self.index),
            InvalidHandle,
            "component ref for {:?} is stale (component detached or slot recycled)",
            self.type_index
        );
        world.pool::<T>().get_mut(self.index)
    }
}

impl<T: Component> Clone for ComponentRef<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: Component> Copy for ComponentRef<T> {}
