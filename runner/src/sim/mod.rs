//! Simulated game world for dry runs and tests.

pub mod layouts;
pub mod world;

pub use layouts::{collector_world, furnace_world, serum_world};
pub use world::{ObjectKind, SimWorld, SmeltRule};
