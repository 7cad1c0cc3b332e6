//! Component types shared by the benchmarks.

use strata_ecs::Component;

#[derive(Component, Clone, Default)]
pub struct Position {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

#[derive(Component, Clone, Default)]
pub struct Velocity {
    pub dx: f32,
    pub dy: f32,
    pub dz: f32,
}

#[derive(Component, Clone, Default)]
pub struct Health {
    pub current: u32,
    pub max: u32,
}

#[derive(Component, Clone, Default)]
pub struct Frozen;
