//! A minimal host loop: a few bodies orbit a center, collisions raise a
//! one-frame event component that a reporting system consumes.
//!
//! ```bash
//! cargo run -p strata_ecs --example orbit
//! ```

use strata_ecs::{Component, Mask, System, Systems, World};

#[derive(Component, Clone, Default)]
struct Position {
    x: f32,
    y: f32,
}

#[derive(Component, Clone, Default)]
struct Velocity {
    dx: f32,
    dy: f32,
}

#[derive(Component, Clone, Default)]
struct NearCenter;

struct Movement;

impl System for Movement {
    fn run(&mut self, world: &mut World) {
        let moving = world.filter(Mask::new().with::<Position>().with::<Velocity>());
        for i in moving.iter() {
            let entity = moving.entity(i);
            let (dx, dy) = {
                let velocity = world.get::<Velocity>(entity);
                (velocity.dx, velocity.dy)
            };
            let position = world.get::<Position>(entity);
            position.x += dx;
            position.y += dy;

            // Crude centripetal pull.
            let (x, y) = (position.x, position.y);
            let velocity = world.get::<Velocity>(entity);
            velocity.dx -= x * 0.04;
            velocity.dy -= y * 0.04;

            if x * x + y * y < 1.0 {
                world.get::<NearCenter>(entity);
            }
        }
    }
}

struct Report {
    tick: u32,
}

impl System for Report {
    fn run(&mut self, world: &mut World) {
        self.tick += 1;
        let near = world.filter(Mask::new().with::<NearCenter>());
        if !near.is_empty() {
            println!("tick {:3}: {} bodies near the center", self.tick, near.len());
        }
    }
}

fn main() {
    let mut world = World::default();

    for n in 0..4 {
        let body = world.new_entity();
        world.replace(
            body,
            Position {
                x: 2.0 + n as f32,
                y: 0.0,
            },
        );
        world.replace(
            body,
            Velocity {
                dx: 0.0,
                dy: 0.3 + 0.1 * n as f32,
            },
        );
    }

    let mut systems = Systems::new("tick");
    systems.add(Movement);
    systems.add(Report { tick: 0 });
    // NearCenter is event-like: visible to Report above, gone by next tick.
    systems.one_frame::<NearCenter>();

    systems.init(&mut world);
    for _ in 0..100 {
        systems.run(&mut world);
    }
    systems.destroy(&mut world);
    world.destroy();
}
