//! Keel Engine -- the embedding loop around the ECS core.
//!
//! This crate owns the tick structure: a [`FrameLoop`] wraps a
//! [`World`](keel_ecs::world::World) and a
//! [`Scheduler`](keel_ecs::schedule::Scheduler) and drives
//! `begin_frame -> execute(phase...) -> end_frame` exactly once per tick,
//! collecting per-phase timing diagnostics.
//!
//! # Example
//!
//! ```
//! use keel_engine::{FrameConfig, FrameLoop};
//! use keel_ecs::prelude::*;
//!
//! #[derive(Debug, Clone, Default, PartialEq)]
//! struct Position { x: f32 }
//!
//! let mut world = World::new();
//! world.register_component::<Position>("position");
//! world.spawn_with(Position { x: 0.0 });
//!
//! let mut frame_loop = FrameLoop::new(world, FrameConfig::default());
//! frame_loop.add_system_fn("drift", Phase::Update, |world, ctx| {
//!     let dt = ctx.delta_time;
//!     world.each::<(&mut Position,), _>(|(pos,)| pos.x += dt);
//! });
//!
//! frame_loop.run_frames(10).unwrap();
//! assert_eq!(frame_loop.frame_count(), 10);
//! ```

pub mod frame;

pub use frame::{FrameConfig, FrameDiagnostics, FrameLoop};
