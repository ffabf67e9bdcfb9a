//! Property tests for world operations.
//!
//! Random sequences of spawn/destroy/add/remove/query operations are run
//! against a model of the alive set, and world invariants are checked after
//! every step.

use keel_ecs::prelude::*;
use proptest::prelude::*;

#[derive(Debug, Clone, Default, PartialEq)]
struct Pos {
    x: f32,
    y: f32,
}

#[derive(Debug, Clone, Default, PartialEq)]
struct Vel {
    dx: f32,
    dy: f32,
}

#[derive(Debug, Clone, Default, PartialEq)]
struct Tag(u32);

/// Operations the property runner can perform.
#[derive(Debug, Clone)]
enum WorldOp {
    SpawnPos(f32, f32),
    SpawnPosVel(f32, f32, f32, f32),
    Destroy(usize),
    DestroyDeferred(usize),
    AddVel(usize, f32, f32),
    RemoveVel(usize),
    RemoveAll(usize),
    EndFrame,
    QueryPos,
    QueryPosVel,
}

/// Finite f32 values only; NaN would break equality checks.
fn finite_f32() -> impl Strategy<Value = f32> {
    (-1_000_000i32..1_000_000i32).prop_map(|v| v as f32 * 0.01)
}

fn world_op_strategy() -> impl Strategy<Value = WorldOp> {
    prop_oneof![
        (finite_f32(), finite_f32()).prop_map(|(x, y)| WorldOp::SpawnPos(x, y)),
        (finite_f32(), finite_f32(), finite_f32(), finite_f32())
            .prop_map(|(x, y, dx, dy)| WorldOp::SpawnPosVel(x, y, dx, dy)),
        (0..100usize).prop_map(WorldOp::Destroy),
        (0..100usize).prop_map(WorldOp::DestroyDeferred),
        (0..100usize, finite_f32(), finite_f32())
            .prop_map(|(i, dx, dy)| WorldOp::AddVel(i, dx, dy)),
        (0..100usize).prop_map(WorldOp::RemoveVel),
        (0..100usize).prop_map(WorldOp::RemoveAll),
        Just(WorldOp::EndFrame),
        Just(WorldOp::QueryPos),
        Just(WorldOp::QueryPosVel),
    ]
}

fn setup_world() -> World {
    let mut world = World::new();
    world.register_component::<Pos>("pos");
    world.register_component::<Vel>("vel");
    world.register_component::<Tag>("tag");
    world
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(2_000))]

    #[test]
    fn random_ops_preserve_invariants(ops in prop::collection::vec(world_op_strategy(), 1..60)) {
        let mut world = setup_world();
        world.begin_frame(1.0 / 60.0);

        // Model: entities we believe are alive, minus those queued for
        // deferred destruction.
        let mut alive: Vec<Entity> = Vec::new();
        let mut queued: Vec<Entity> = Vec::new();

        for op in ops {
            match op {
                WorldOp::SpawnPos(x, y) => {
                    alive.push(world.spawn_with(Pos { x, y }));
                }
                WorldOp::SpawnPosVel(x, y, dx, dy) => {
                    let mut bundle = ComponentBundle::new();
                    bundle.add(world.registry(), Pos { x, y });
                    bundle.add(world.registry(), Vel { dx, dy });
                    alive.push(world.spawn_bundle(bundle));
                }
                WorldOp::Destroy(i) => {
                    if !alive.is_empty() {
                        let e = alive.remove(i % alive.len());
                        queued.retain(|q| *q != e);
                        world.destroy_entity(e).unwrap();
                    }
                }
                WorldOp::DestroyDeferred(i) => {
                    if !alive.is_empty() {
                        let e = alive[i % alive.len()];
                        world.destroy_entity_deferred(e).unwrap();
                        if !queued.contains(&e) {
                            queued.push(e);
                        }
                    }
                }
                WorldOp::AddVel(i, dx, dy) => {
                    if !alive.is_empty() {
                        let e = alive[i % alive.len()];
                        world.add_component(e, Vel { dx, dy }).unwrap();
                    }
                }
                WorldOp::RemoveVel(i) => {
                    if !alive.is_empty() {
                        let e = alive[i % alive.len()];
                        world.remove_component::<Vel>(e).unwrap();
                    }
                }
                WorldOp::RemoveAll(i) => {
                    if !alive.is_empty() {
                        let e = alive[i % alive.len()];
                        world.remove_component::<Vel>(e).unwrap();
                        world.remove_component::<Pos>(e).unwrap();
                        // Entity is still alive, just owns no components.
                        prop_assert!(world.is_valid(e));
                        prop_assert!(!world.has_component::<Pos>(e));
                    }
                }
                WorldOp::EndFrame => {
                    world.end_frame();
                    alive.retain(|e| !queued.contains(e));
                    queued.clear();
                    world.begin_frame(1.0 / 60.0);
                }
                WorldOp::QueryPos => {
                    let count = world.query::<(&Pos,)>().count();
                    prop_assert!(count <= alive.len());
                }
                WorldOp::QueryPosVel => {
                    let count = world.query::<(&Pos, &Vel)>().count();
                    prop_assert!(count <= alive.len());
                }
            }

            // Invariants checked after every operation.
            prop_assert_eq!(world.entity_count() as usize, alive.len());
            for &e in &alive {
                prop_assert!(world.is_valid(e));
            }
            for archetype in world.archetypes().iter() {
                let summed: u32 = archetype.chunks().iter().map(|c| c.count()).sum();
                prop_assert_eq!(summed, archetype.entity_count());
            }
        }
    }

    /// Stale ids stay stale even after their slot is recycled.
    #[test]
    fn stale_ids_survive_recycling(
        spawn_count in 1..20usize,
        destroy_indices in prop::collection::vec(0..20usize, 1..10),
    ) {
        let mut world = setup_world();

        let mut entities: Vec<Entity> = (0..spawn_count)
            .map(|i| world.spawn_with(Pos { x: i as f32, y: 0.0 }))
            .collect();

        let mut stale: Vec<Entity> = Vec::new();
        for &i in &destroy_indices {
            if !entities.is_empty() {
                let e = entities.remove(i % entities.len());
                world.destroy_entity(e).unwrap();
                stale.push(e);
            }
        }

        // Recycle every freed slot.
        for _ in 0..stale.len() {
            entities.push(world.spawn_with(Pos { x: 999.0, y: 999.0 }));
        }

        for &s in &stale {
            prop_assert!(!world.is_valid(s));
            prop_assert_eq!(world.get_component::<Pos>(s), None);
        }
        for &e in &entities {
            prop_assert!(world.is_valid(e));
            prop_assert!(world.get_component::<Pos>(e).is_some());
        }
    }

    /// Migration in either direction preserves component data exactly.
    #[test]
    fn migration_preserves_data(
        x in finite_f32(),
        y in finite_f32(),
        dx in finite_f32(),
        dy in finite_f32(),
        and_back in proptest::bool::ANY,
    ) {
        let mut world = setup_world();
        let e = world.spawn_with(Pos { x, y });

        world.add_component(e, Vel { dx, dy }).unwrap();
        prop_assert_eq!(world.get_component::<Pos>(e), Some(&Pos { x, y }));
        prop_assert_eq!(world.get_component::<Vel>(e), Some(&Vel { dx, dy }));

        if and_back {
            world.remove_component::<Vel>(e).unwrap();
            prop_assert_eq!(world.get_component::<Pos>(e), Some(&Pos { x, y }));
            prop_assert!(!world.has_component::<Vel>(e));
        }
    }

    /// Entities sharing an archetype keep independent data through removal
    /// churn.
    #[test]
    fn entities_keep_independent_data(count in 2..50usize) {
        let mut world = setup_world();

        let mut entities = Vec::new();
        for i in 0..count {
            entities.push(world.spawn_with(Pos { x: i as f32, y: (i * 2) as f32 }));
        }

        for (i, &e) in entities.iter().enumerate() {
            let pos = world.get_component::<Pos>(e).unwrap();
            prop_assert_eq!(pos.x, i as f32);
            prop_assert_eq!(pos.y, (i * 2) as f32);
        }

        // Swap-remove a middle entity; everyone else must be untouched.
        let mid = entities.remove(count / 2);
        let expected: Vec<(Entity, f32)> = entities
            .iter()
            .map(|&e| (e, world.get_component::<Pos>(e).unwrap().x))
            .collect();
        world.destroy_entity(mid).unwrap();

        prop_assert_eq!(world.entity_count() as usize, entities.len());
        for (e, x) in expected {
            prop_assert!(world.is_valid(e));
            prop_assert_eq!(world.get_component::<Pos>(e).unwrap().x, x);
        }
    }
}
