pub mod components;
pub mod constants;
pub mod entity;
pub mod performance;
pub mod physics;
pub mod pool;
pub mod scheduler;
pub mod store;
pub mod systems;
pub mod weapons;
pub mod world;
