//! Headless simulation demo: a swarm of particles integrated at 60 Hz, with
//! short-lived sparks destroyed through the deferred queue.
//!
//! Run with `RUST_LOG=debug cargo run --example headless_sim` to see the
//! registration and archetype-creation trace.

use keel_ecs::prelude::*;
use keel_engine::{FrameConfig, FrameLoop};

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Position {
    x: f32,
    y: f32,
    z: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Velocity {
    dx: f32,
    dy: f32,
    dz: f32,
}

#[derive(Debug, Clone, Default, PartialEq)]
struct Spark {
    frames_left: u32,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut world = World::new();
    world.register_component::<Position>("position");
    world.register_component::<Velocity>("velocity");
    world.register_component::<Spark>("spark");

    // A grid of drifting particles plus a handful of short-lived sparks.
    for i in 0..10_000u32 {
        let mut bundle = ComponentBundle::new();
        bundle.add(
            world.registry(),
            Position {
                x: (i % 100) as f32,
                y: (i / 100) as f32,
                z: 0.0,
            },
        );
        bundle.add(
            world.registry(),
            Velocity {
                dx: 0.0,
                dy: 0.0,
                dz: 1.0,
            },
        );
        world.spawn_bundle(bundle);
    }
    for _ in 0..100 {
        world.spawn_with(Spark { frames_left: 30 });
    }

    let mut frame_loop = FrameLoop::new(
        world,
        FrameConfig {
            headless: true,
            ..FrameConfig::default()
        },
    );

    frame_loop.add_system_fn("integrate", Phase::Update, |world, ctx| {
        let dt = ctx.delta_time;
        world.each::<(&mut Position, &Velocity), _>(|(pos, vel)| {
            pos.x += vel.dx * dt;
            pos.y += vel.dy * dt;
            pos.z += vel.dz * dt;
        });
    });

    frame_loop.add_system_fn("burn_sparks", Phase::PostUpdate, |world, _ctx| {
        let expired: Vec<Entity> = world
            .query_mut::<(&mut Spark,)>()
            .filter_map(|(entity, (spark,))| {
                spark.frames_left -= 1;
                (spark.frames_left == 0).then_some(entity)
            })
            .collect();
        for entity in expired {
            let _ = world.destroy_entity_deferred(entity);
        }
    });

    frame_loop.initialize();
    frame_loop.run_frames(120)?;
    frame_loop.shutdown();

    let world = frame_loop.world();
    println!(
        "simulated {:.2}s: {} entities alive, {} moving, last frame took {:?}",
        frame_loop.sim_time(),
        world.entity_count(),
        world.count::<(Position, Velocity)>(),
        frame_loop.diagnostics().total_time,
    );
    Ok(())
}
