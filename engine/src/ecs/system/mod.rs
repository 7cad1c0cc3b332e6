//! System lifecycle and grouping.
//!
//! A [`System`] is user logic invoked on a fixed lifecycle: `pre_init`,
//! `init`, `run`, `destroy`, `post_destroy` - every stage optional through
//! default methods. Systems are collected into a named [`Systems`] group;
//! the host drives the group with [`Systems::init`] once, [`Systems::run`]
//! per tick, and [`Systems::destroy`] at shutdown. A group itself
//! implements `System`, so groups nest as run-phase units.
//!
//! ```rust,ignore
//! use strata_ecs::{System, Systems, World};
//!
//! struct Movement;
//!
//! impl System for Movement {
//!     fn run(&mut self, world: &mut World) {
//!         // ...
//!     }
//! }
//!
//! let mut world = World::default();
//! let mut systems = Systems::new("update");
//! systems.add(Movement).one_frame::<DamageEvent>();
//!
//! systems.init(&mut world);
//! loop {
//!     systems.run(&mut world);
//! #   break;
//! }
//! systems.destroy(&mut world);
//! ```
//!
//! `one_frame::<T>()` inserts a cleanup pseudo-system at the current
//! position in the run sequence: each tick it detaches `T` from every
//! entity that has it, which is the idiom for event-like components that
//! must not outlive the frame they were raised in.

use std::marker::PhantomData;

use log::debug;

use crate::ecs::{
    component::Component,
    error::contract,
    filter::{Filter, Mask},
    world::World,
};

/// User logic on the world lifecycle. Implement only the stages you need.
pub trait System {
    /// Before any `init` of the group runs.
    fn pre_init(&mut self, _world: &mut World) {}

    /// One-time setup; filters are typically requested here.
    fn init(&mut self, _world: &mut World) {}

    /// Per-tick logic.
    fn run(&mut self, _world: &mut World) {}

    /// Teardown, in reverse registration order.
    fn destroy(&mut self, _world: &mut World) {}

    /// After every `destroy` of the group has run.
    fn post_destroy(&mut self, _world: &mut World) {}
}

#[derive(Debug, PartialEq, Eq)]
enum GroupState {
    Created,
    Initialized,
    Destroyed,
}

/// A named, ordered group of systems.
pub struct Systems {
    name: &'static str,
    systems: Vec<Box<dyn System>>,
    state: GroupState,
}

impl Systems {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            systems: Vec::new(),
            state: GroupState::Created,
        }
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Number of registered systems (including one-frame cleanups).
    #[inline]
    pub fn len(&self) -> usize {
        self.systems.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.systems.is_empty()
    }

    /// Append a system to the run sequence.
    pub fn add(&mut self, system: impl System + 'static) -> &mut Self {
        contract!(
            self.state == GroupState::Created,
            InvalidState,
            "systems group {:?}: add after init",
            self.name
        );
        self.systems.push(Box::new(system));
        self
    }

    /// Insert the one-frame cleanup for `T` at the current position: every
    /// run it detaches `T` from all entities that have it.
    pub fn one_frame<T: Component>(&mut self) -> &mut Self {
        self.add(OneFrame::<T>::default())
    }

    /// Run the `pre_init` stage, then the `init` stage, in registration
    /// order.
    pub fn init(&mut self, world: &mut World) {
        contract!(
            self.state == GroupState::Created,
            InvalidState,
            "systems group {:?}: init called twice",
            self.name
        );
        debug!("systems group {:?}: init ({} systems)", self.name, self.systems.len());
        for system in &mut self.systems {
            system.pre_init(world);
        }
        for system in &mut self.systems {
            system.init(world);
        }
        self.state = GroupState::Initialized;
    }

    /// Run every system once, in registration order.
    pub fn run(&mut self, world: &mut World) {
        contract!(
            self.state == GroupState::Initialized,
            InvalidState,
            "systems group {:?}: run before init",
            self.name
        );
        for system in &mut self.systems {
            system.run(world);
            let leaked = world.check_for_leaked_entities();
            contract!(
                leaked.is_none(),
                LeakedEntity,
                "group {:?}: entity {:?} was created but never received a component",
                self.name,
                leaked
            );
        }
    }

    /// Run the `destroy` stage, then the `post_destroy` stage, both in
    /// reverse registration order.
    pub fn destroy(&mut self, world: &mut World) {
        contract!(
            self.state == GroupState::Initialized,
            InvalidState,
            "systems group {:?}: destroy without init",
            self.name
        );
        debug!("systems group {:?}: destroy", self.name);
        for system in self.systems.iter_mut().rev() {
            system.destroy(world);
        }
        for system in self.systems.iter_mut().rev() {
            system.post_destroy(world);
        }
        self.state = GroupState::Destroyed;
        world.notify_systems_destroyed(self.name);
    }
}

/// A group nests inside another group as one run-phase unit.
impl System for Systems {
    fn init(&mut self, world: &mut World) {
        Systems::init(self, world);
    }

    fn run(&mut self, world: &mut World) {
        Systems::run(self, world);
    }

    fn destroy(&mut self, world: &mut World) {
        Systems::destroy(self, world);
    }
}

/// Library-provided cleanup: detaches `T` from every entity each run.
struct OneFrame<T: Component> {
    filter: Option<Filter>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Component> Default for OneFrame<T> {
    fn default() -> Self {
        Self {
            filter: None,
            _marker: PhantomData,
        }
    }
}

impl<T: Component> System for OneFrame<T> {
    fn init(&mut self, world: &mut World) {
        self.filter = Some(world.filter(Mask::new().with::<T>()));
    }

    fn run(&mut self, world: &mut World) {
        let filter = self
            .filter
            .as_ref()
            .expect("one-frame cleanup run before init");
        for i in filter.iter() {
            world.del::<T>(filter.entity(i));
        }
    }
}
