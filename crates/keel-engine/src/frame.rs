//! The fixed-timestep frame loop driving a world and its scheduler.
//!
//! Each frame:
//!
//! 1. `World::begin_frame(dt)` stamps the frame's delta time and counter.
//! 2. Every [`Phase`] executes in order through the [`Scheduler`].
//! 3. `World::end_frame()` drains deferred entity destructions.
//!
//! Simulation time is computed as `frame_count * fixed_dt` (multiplication,
//! not accumulation) so it cannot drift across long runs.

use keel_ecs::prelude::*;

use std::time::{Duration, Instant};

// ---------------------------------------------------------------------------
// FrameConfig
// ---------------------------------------------------------------------------

/// Configuration for the frame loop.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Fixed time step in seconds per frame. Must be positive and finite.
    pub fixed_dt: f32,
    /// Headless mode: no pacing, frames run back to back.
    pub headless: bool,
}

impl Default for FrameConfig {
    /// 60 Hz, headless off.
    fn default() -> Self {
        Self {
            fixed_dt: 1.0 / 60.0,
            headless: false,
        }
    }
}

// ---------------------------------------------------------------------------
// FrameDiagnostics
// ---------------------------------------------------------------------------

/// Wall-clock timings for the last executed frame.
#[derive(Debug, Clone, Default)]
pub struct FrameDiagnostics {
    /// Time spent per phase, in execution order.
    pub phase_times: Vec<(Phase, Duration)>,
    /// Total frame time including begin/end bookkeeping.
    pub total_time: Duration,
}

// ---------------------------------------------------------------------------
// FrameLoop
// ---------------------------------------------------------------------------

/// Owns a [`World`] and a [`Scheduler`] and steps them one frame at a time.
pub struct FrameLoop {
    world: World,
    scheduler: Scheduler,
    config: FrameConfig,
    diagnostics: FrameDiagnostics,
}

impl FrameLoop {
    /// Create a frame loop around `world`.
    ///
    /// # Panics
    ///
    /// Panics if `config.fixed_dt` is not positive and finite.
    pub fn new(world: World, config: FrameConfig) -> Self {
        assert!(
            config.fixed_dt > 0.0 && config.fixed_dt.is_finite(),
            "fixed_dt must be positive and finite, got {}",
            config.fixed_dt
        );
        Self {
            world,
            scheduler: Scheduler::new(),
            config,
            diagnostics: FrameDiagnostics::default(),
        }
    }

    /// Register a system.
    pub fn add_system(&mut self, system: Box<dyn System>) {
        self.scheduler.add(system);
    }

    /// Register a closure system in `phase`.
    pub fn add_system_fn<F>(&mut self, name: impl Into<String>, phase: Phase, func: F)
    where
        F: FnMut(&mut World, &SystemContext) + 'static,
    {
        self.scheduler.add_fn(name, phase, func);
    }

    /// Initialize every registered system. Call once before the first frame.
    pub fn initialize(&mut self) {
        self.scheduler.initialize(&mut self.world);
    }

    /// Run one frame: begin, execute every phase in order, end.
    ///
    /// # Errors
    ///
    /// The frame always runs to completion; if any phase reported a
    /// scheduler ordering error (dependency cycle), the first one is
    /// returned afterwards.
    pub fn frame(&mut self) -> Result<(), EcsError> {
        let frame_start = Instant::now();
        self.world.begin_frame(self.config.fixed_dt);
        let ctx = SystemContext {
            delta_time: self.config.fixed_dt,
            frame_count: self.world.frame_count(),
        };

        let mut first_error = None;
        let mut phase_times = Vec::with_capacity(Phase::ALL.len());
        for phase in Phase::ALL {
            let phase_start = Instant::now();
            if let Err(err) = self.scheduler.execute(phase, &mut self.world, &ctx) {
                tracing::error!(%err, "scheduler reported an ordering error");
                if first_error.is_none() {
                    first_error = Some(err);
                }
            }
            phase_times.push((phase, phase_start.elapsed()));
        }

        self.world.end_frame();
        self.diagnostics = FrameDiagnostics {
            phase_times,
            total_time: frame_start.elapsed(),
        };

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Run `count` frames. Stops early on the first frame error.
    pub fn run_frames(&mut self, count: u64) -> Result<(), EcsError> {
        for _ in 0..count {
            self.frame()?;
        }
        Ok(())
    }

    /// Shut down every system. Call once at teardown.
    pub fn shutdown(&mut self) {
        self.scheduler.shutdown(&mut self.world);
    }

    // -- accessors ----------------------------------------------------------

    /// Frames executed so far.
    pub fn frame_count(&self) -> u64 {
        self.world.frame_count()
    }

    /// Simulation time in seconds (`frame_count * fixed_dt`).
    pub fn sim_time(&self) -> f64 {
        self.world.frame_count() as f64 * f64::from(self.config.fixed_dt)
    }

    /// The fixed time step.
    pub fn fixed_dt(&self) -> f32 {
        self.config.fixed_dt
    }

    /// Whether headless mode is enabled.
    pub fn is_headless(&self) -> bool {
        self.config.headless
    }

    /// Read-only world access.
    pub fn world(&self) -> &World {
        &self.world
    }

    /// Mutable world access, for setup and tests.
    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    /// The scheduler.
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Mutable scheduler access.
    pub fn scheduler_mut(&mut self) -> &mut Scheduler {
        &mut self.scheduler
    }

    /// Timings from the last frame.
    pub fn diagnostics(&self) -> &FrameDiagnostics {
        &self.diagnostics
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, Default, PartialEq)]
    struct Position {
        x: f32,
        y: f32,
    }

    #[derive(Debug, Clone, Copy, Default, PartialEq)]
    struct Velocity {
        dx: f32,
        dy: f32,
    }

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Lifetime(u32);

    fn setup_world() -> World {
        let mut world = World::new();
        world.register_component::<Position>("position");
        world.register_component::<Velocity>("velocity");
        world.register_component::<Lifetime>("lifetime");
        world
    }

    #[test]
    fn new_loop_starts_at_zero() {
        let frame_loop = FrameLoop::new(setup_world(), FrameConfig::default());
        assert_eq!(frame_loop.frame_count(), 0);
        assert_eq!(frame_loop.sim_time(), 0.0);
    }

    #[test]
    #[should_panic(expected = "fixed_dt must be positive")]
    fn zero_dt_panics() {
        let _ = FrameLoop::new(
            World::new(),
            FrameConfig {
                fixed_dt: 0.0,
                ..FrameConfig::default()
            },
        );
    }

    #[test]
    #[should_panic(expected = "fixed_dt must be positive")]
    fn infinite_dt_panics() {
        let _ = FrameLoop::new(
            World::new(),
            FrameConfig {
                fixed_dt: f32::INFINITY,
                ..FrameConfig::default()
            },
        );
    }

    #[test]
    fn frames_advance_counters_and_sim_time() {
        let mut frame_loop = FrameLoop::new(
            setup_world(),
            FrameConfig {
                fixed_dt: 0.25,
                ..FrameConfig::default()
            },
        );
        frame_loop.run_frames(4).unwrap();
        assert_eq!(frame_loop.frame_count(), 4);
        assert_eq!(frame_loop.sim_time(), 1.0);
        assert_eq!(frame_loop.diagnostics().phase_times.len(), Phase::ALL.len());
    }

    #[test]
    fn systems_run_inside_begin_end_frame() {
        let mut frame_loop = FrameLoop::new(setup_world(), FrameConfig::default());
        let e = {
            let world = frame_loop.world_mut();
            let mut bundle = ComponentBundle::new();
            bundle.add(world.registry(), Position { x: 0.0, y: 0.0 });
            bundle.add(world.registry(), Velocity { dx: 60.0, dy: 0.0 });
            world.spawn_bundle(bundle)
        };

        frame_loop.add_system_fn("movement", Phase::Update, |world, ctx| {
            let dt = ctx.delta_time;
            world.each::<(&mut Position, &Velocity), _>(|(pos, vel)| {
                pos.x += vel.dx * dt;
                pos.y += vel.dy * dt;
            });
        });

        frame_loop.run_frames(60).unwrap();
        let pos = frame_loop.world().get_component::<Position>(e).unwrap();
        assert!((pos.x - 60.0).abs() < 1e-3);
    }

    #[test]
    fn deferred_destruction_resolves_within_the_frame() {
        let mut frame_loop = FrameLoop::new(setup_world(), FrameConfig::default());
        let world = frame_loop.world_mut();
        for ttl in [1u32, 3, 3] {
            world.spawn_with(Lifetime(ttl));
        }

        // Tick lifetimes down in Update; queue expired entities in PostUpdate.
        frame_loop.add_system_fn("age", Phase::Update, |world, _ctx| {
            world.each::<(&mut Lifetime,), _>(|(lifetime,)| {
                lifetime.0 -= 1;
            });
        });
        frame_loop.add_system_fn("reap", Phase::PostUpdate, |world, _ctx| {
            let expired: Vec<Entity> = world
                .query::<(&Lifetime,)>()
                .filter(|(_, (lifetime,))| lifetime.0 == 0)
                .map(|(entity, _)| entity)
                .collect();
            for entity in expired {
                world.destroy_entity_deferred(entity).unwrap();
            }
        });

        frame_loop.frame().unwrap();
        assert_eq!(frame_loop.world().entity_count(), 2);
        frame_loop.run_frames(2).unwrap();
        assert_eq!(frame_loop.world().entity_count(), 0);
    }

    #[test]
    fn cycle_error_propagates_but_frame_completes() {
        let mut frame_loop = FrameLoop::new(setup_world(), FrameConfig::default());
        frame_loop.add_system_fn("a", Phase::Update, |_, _| {});
        frame_loop
            .scheduler_mut()
            .add(Box::new(FnSystem::new("b", Phase::Update, |_, _| {}).after("c")));
        frame_loop
            .scheduler_mut()
            .add(Box::new(FnSystem::new("c", Phase::Update, |_, _| {}).after("b")));

        let err = frame_loop.frame().unwrap_err();
        assert!(matches!(err, EcsError::DependencyCycle { .. }));
        // The frame still ran: counters advanced.
        assert_eq!(frame_loop.frame_count(), 1);
    }

    #[test]
    fn lifecycle_initialize_and_shutdown() {
        use std::cell::RefCell;
        use std::rc::Rc;

        struct Tracker {
            log: Rc<RefCell<Vec<&'static str>>>,
        }

        impl System for Tracker {
            fn name(&self) -> &str {
                "tracker"
            }

            fn initialize(&mut self, _world: &mut World) {
                self.log.borrow_mut().push("init");
            }

            fn update(&mut self, _world: &mut World, _ctx: &SystemContext) {
                self.log.borrow_mut().push("update");
            }

            fn shutdown(&mut self, _world: &mut World) {
                self.log.borrow_mut().push("shutdown");
            }
        }

        let log = Rc::new(RefCell::new(Vec::new()));
        let mut frame_loop = FrameLoop::new(setup_world(), FrameConfig::default());
        frame_loop.add_system(Box::new(Tracker {
            log: Rc::clone(&log),
        }));

        frame_loop.initialize();
        frame_loop.frame().unwrap();
        frame_loop.shutdown();
        assert_eq!(*log.borrow(), vec!["init", "update", "shutdown"]);
    }
}
